//! Storage key constants.

/// Keys written by tokensync clients.
pub struct StorageKeys;

impl StorageKeys {
    /// The persisted token pair (JSON).
    pub const TOKEN_PAIR: &'static str = "token_pair";
}
