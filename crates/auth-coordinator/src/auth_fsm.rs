//! Authentication state machine using rust-fsm.
//!
//! ```text
//! Unauthenticated ── LoginAttempt ──► Authenticating ── LoginSucceeded ──► Authenticated
//!       ▲    │                             │                               │      ▲
//!       │    └──── RestoreSession ─────────┼──────────────────────────────►│      │
//!       │                                  │ LoginFailed    RefreshRequested│      │ RefreshSucceeded
//!       ◄──────────────────────────────────┘                               ▼      │ RefreshInterrupted
//!       ◄──────────── RefreshExpired ─────────────────────────────── Refreshing ──┘
//!
//! any state ── LogoutRequested ──► LoggedOut ── LoginAttempt ──► Authenticating
//! ```

use auth_events::AuthState;
use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Unauthenticated)

    Unauthenticated => {
        LoginAttempt => Authenticating,
        RestoreSession => Authenticated,
        LogoutRequested => LoggedOut
    },
    Authenticating => {
        LoginSucceeded => Authenticated,
        LoginFailed => Unauthenticated,
        LogoutRequested => LoggedOut
    },
    Authenticated => {
        LoginAttempt => Authenticating,
        RefreshRequested => Refreshing,
        // Server rejected the session outside of a refresh
        SessionRejected => Unauthenticated,
        LogoutRequested => LoggedOut
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        // Refresh token rejected: the session is over
        RefreshExpired => Unauthenticated,
        // Transient failure: keep the previous pair
        RefreshInterrupted => Authenticated,
        LogoutRequested => LoggedOut
    },
    LoggedOut => {
        LoginAttempt => Authenticating,
        RestoreSession => Authenticated,
        LogoutRequested => LoggedOut
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Consumer-facing view of a machine state.
pub fn public_state(state: &AuthMachineState) -> AuthState {
    match state {
        AuthMachineState::Unauthenticated => AuthState::Unauthenticated,
        AuthMachineState::Authenticating => AuthState::Authenticating,
        AuthMachineState::Authenticated => AuthState::Authenticated,
        AuthMachineState::Refreshing => AuthState::Refreshing,
        AuthMachineState::LoggedOut => AuthState::LoggedOut,
    }
}
