//! Durable storage for the client's token pair.
//!
//! Backends implement [`SecureStorage`], a small string key/value interface:
//! - [`FileStorage`]: a JSON document on disk, rewritten atomically
//! - [`MemoryStorage`]: process-local map, for tests and ephemeral sessions
//!
//! [`TokenStore`] sits on top and persists exactly one [`TokenPair`] record.

mod file;
mod keys;
mod memory;
mod store;
mod token_pair;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use store::TokenStore;
pub use token_pair::TokenPair;
pub use traits::SecureStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the default file-backed token store under `paths`.
pub fn open_token_store(paths: &session_config::Paths) -> StorageResult<TokenStore> {
    let storage = FileStorage::new(paths.session_file())?;
    Ok(TokenStore::new(Box::new(storage)))
}
