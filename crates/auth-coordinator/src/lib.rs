//! Session ownership for tokensync clients.
//!
//! This crate provides:
//! - An explicit FSM for the authentication lifecycle
//! - [`AuthCoordinator`]: login, logout, restore/verify and single-flight refresh
//! - [`AuthApi`] with a reqwest-backed implementation of the auth endpoints
//! - Optional mirroring of credentials to an external tool

mod api;
mod auth_fsm;
mod coordinator;
pub mod credential_sync;
mod error;

pub use api::{AccountInfo, AuthApi, Credentials, HttpAuthApi, LoginOutcome};
pub use auth_fsm::auth_machine;
pub use auth_fsm::{public_state, AuthMachine, AuthMachineInput, AuthMachineState};
pub use coordinator::{AuthCoordinator, AuthSnapshot, RefreshMode};
pub use error::{AuthError, AuthResult};
