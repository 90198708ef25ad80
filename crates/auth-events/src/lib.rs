//! Authentication lifecycle events and the bus that carries them.
//!
//! The coordinator publishes; UI indicators, credential mirrors and anything
//! else subscribe. Nothing here knows about transports.

mod bus;
mod event;

pub use bus::{AuthEventBus, HandlerResult, SubscriptionHandle, DEFAULT_STREAM_CAPACITY};
pub use event::{AuthEvent, AuthEventType, AuthState};
