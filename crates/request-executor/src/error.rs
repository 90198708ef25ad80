//! Error types for request execution.

use auth_coordinator::AuthError;
use thiserror::Error;

pub type RequestResult<T> = Result<T, RequestError>;

/// Terminal outcome of an operation. Every variant reports how many network
/// attempts were made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// No response on the last attempt (connection failure or timeout).
    #[error("network error after {attempts} attempt(s): {message}")]
    Network { message: String, attempts: u32 },

    /// 5xx on the last attempt.
    #[error("server error {status} after {attempts} attempt(s)")]
    Server {
        status: u16,
        body: String,
        attempts: u32,
    },

    /// 404 with no fallback left.
    #[error("endpoint {path} not found after {attempts} attempt(s)")]
    NotFound { path: String, attempts: u32 },

    /// 401 again after the token was refreshed.
    #[error("request unauthorized after token refresh ({attempts} attempt(s))")]
    Auth { attempts: u32 },

    /// Any other non-success status.
    #[error("request rejected with {status} after {attempts} attempt(s)")]
    Client {
        status: u16,
        body: String,
        attempts: u32,
    },

    /// No usable session, or the session ended while the call was running.
    #[error("session unavailable: {source}")]
    Session {
        #[source]
        source: AuthError,
        attempts: u32,
    },

    /// The operation was rejected before anything was sent.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RequestError {
    pub fn attempts(&self) -> u32 {
        match self {
            RequestError::Network { attempts, .. }
            | RequestError::Server { attempts, .. }
            | RequestError::NotFound { attempts, .. }
            | RequestError::Auth { attempts }
            | RequestError::Client { attempts, .. }
            | RequestError::Session { attempts, .. } => *attempts,
            RequestError::Invalid(_) => 0,
        }
    }

    /// Whether trying the whole operation again later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RequestError::Network { .. } | RequestError::Server { .. } => true,
            RequestError::Client { status, .. } => matches!(status, 408 | 429),
            RequestError::Session { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether the caller should prompt for a new login.
    pub fn requires_login(&self) -> bool {
        match self {
            RequestError::Session { source, .. } => source.requires_login(),
            RequestError::Auth { .. } => true,
            _ => false,
        }
    }
}
