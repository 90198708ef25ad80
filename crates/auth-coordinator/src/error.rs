//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
///
/// `Clone` so that one refresh outcome can be handed to every waiter; causes
/// from lower layers are kept as strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login rejected by the server
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Connection-level failure or timeout (transient)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Unexpected HTTP status from the auth API
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// The refresh token itself was rejected; the session is over
    #[error("Refresh token expired: {0}")]
    RefreshTokenExpired(String),

    /// Access token rejected by the server
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No session to take a token from
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Token store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkError(_) => true,
            AuthError::ServerError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if the caller has to re-authenticate before going on.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated
                | AuthError::RefreshTokenExpired(_)
                | AuthError::InvalidCredentials(_)
        )
    }
}

impl From<token_storage::StorageError> for AuthError {
    fn from(err: token_storage::StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<session_config::CoreError> for AuthError {
    fn from(err: session_config::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
