//! Authenticated request execution for tokensync clients.
//!
//! [`RetryingRequestExecutor`] runs one logical operation to completion:
//! - exponential backoff with jitter on transient failures
//! - one forced token refresh on the first 401
//! - endpoint fallback on 404
//!
//! Tokens are always read through the [`auth_coordinator::AuthCoordinator`].

mod endpoint;
mod error;
mod executor;
mod policy;
mod transport;
mod usage;

pub use endpoint::EndpointSpec;
pub use error::{RequestError, RequestResult};
pub use executor::{ExecuteOutcome, Operation, RetryingRequestExecutor};
pub use policy::RetryPolicy;
pub use transport::{
    HttpMethod, HttpTransport, OutboundRequest, ReqwestTransport, TransportError,
    TransportResponse,
};
pub use usage::{TokenUsage, UsageClient};
