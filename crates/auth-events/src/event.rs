use serde::{Deserialize, Serialize};
use std::fmt;
use token_storage::TokenPair;

/// Session state as seen by consumers. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    LoggedOut,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticating => "authenticating",
            AuthState::Authenticated => "authenticated",
            AuthState::Refreshing => "refreshing",
            AuthState::LoggedOut => "logged_out",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoginSuccess { tokens: TokenPair },
    Logout,
    TokenRefreshed { tokens: TokenPair },
    StateChanged { from: AuthState, to: AuthState },
    AuthError { reason: String },
}

/// Discriminant of [`AuthEvent`], used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEventType {
    LoginSuccess,
    Logout,
    TokenRefreshed,
    StateChanged,
    AuthError,
}

impl AuthEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventType::LoginSuccess => "LOGIN_SUCCESS",
            AuthEventType::Logout => "LOGOUT",
            AuthEventType::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEventType::StateChanged => "STATE_CHANGED",
            AuthEventType::AuthError => "AUTH_ERROR",
        }
    }
}

impl fmt::Display for AuthEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthEvent {
    pub fn event_type(&self) -> AuthEventType {
        match self {
            AuthEvent::LoginSuccess { .. } => AuthEventType::LoginSuccess,
            AuthEvent::Logout => AuthEventType::Logout,
            AuthEvent::TokenRefreshed { .. } => AuthEventType::TokenRefreshed,
            AuthEvent::StateChanged { .. } => AuthEventType::StateChanged,
            AuthEvent::AuthError { .. } => AuthEventType::AuthError,
        }
    }

    /// The token pair carried by this event, if any.
    pub fn tokens(&self) -> Option<&TokenPair> {
        match self {
            AuthEvent::LoginSuccess { tokens } | AuthEvent::TokenRefreshed { tokens } => {
                Some(tokens)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_variant() {
        let pair = TokenPair::new("a", "r");
        assert_eq!(
            AuthEvent::LoginSuccess { tokens: pair.clone() }.event_type(),
            AuthEventType::LoginSuccess
        );
        assert_eq!(AuthEvent::Logout.event_type(), AuthEventType::Logout);
        assert_eq!(
            AuthEvent::StateChanged {
                from: AuthState::Authenticated,
                to: AuthState::Refreshing,
            }
            .event_type()
            .as_str(),
            "STATE_CHANGED"
        );
        assert_eq!(
            AuthEvent::TokenRefreshed { tokens: pair }.tokens().unwrap().access_token,
            "a"
        );
        assert!(AuthEvent::Logout.tokens().is_none());
    }
}
