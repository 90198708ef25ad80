//! The single persisted token-pair record.

use crate::{SecureStorage, StorageKeys, StorageResult, TokenPair};
use tracing::{debug, warn};

/// Durable holder of the current [`TokenPair`].
///
/// No validation and no network access: it reads, writes and clears one
/// record. The pair is serialized as a single value, so a save can never
/// leave half of it behind.
pub struct TokenStore {
    storage: Box<dyn SecureStorage>,
}

impl TokenStore {
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Store backed by [`crate::MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Box::new(crate::MemoryStorage::new()))
    }

    /// The persisted pair, or `None` when nothing is stored.
    pub fn load(&self) -> StorageResult<Option<TokenPair>> {
        let Some(raw) = self.storage.get(StorageKeys::TOKEN_PAIR)? else {
            return Ok(None);
        };
        match serde_json::from_str::<TokenPair>(&raw) {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => {
                warn!(error = %e, "stored token pair is unreadable");
                Err(e.into())
            }
        }
    }

    /// Replace the persisted pair.
    pub fn save(&self, pair: &TokenPair) -> StorageResult<()> {
        let raw = serde_json::to_string(pair)?;
        self.storage.set(StorageKeys::TOKEN_PAIR, &raw)?;
        debug!(obtained_at = %pair.obtained_at, "token pair saved");
        Ok(())
    }

    /// Remove the persisted pair. Clearing an empty store succeeds.
    pub fn clear(&self) -> StorageResult<()> {
        let removed = self.storage.delete(StorageKeys::TOKEN_PAIR)?;
        debug!(removed, "token pair cleared");
        Ok(())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
