//! Configuration, filesystem layout and logging bootstrap for tokensync clients.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    ClientCredentials, Config, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_REFRESH_DEBOUNCE_SECS, DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
