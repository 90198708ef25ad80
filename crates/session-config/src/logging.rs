//! Logging initialization for tokensync clients.
//!
//! Thin wrapper over the observability crate. Every client writes structured
//! JSONL to `~/.tokensync/logs/client.jsonl`.

use crate::Paths;

const DEFAULT_SERVICE_NAME: &str = "tokensync-client";
const ENV_LOG_STDERR: &str = "TOKENSYNC_LOG_STDERR";

/// Initialize the logging system for the default client service.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("client started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service(DEFAULT_SERVICE_NAME, level);
}

/// Initialize logging with a custom service name.
///
/// Use this when several tools share the central log file and need to be
/// told apart.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let also_stderr = std::env::var(ENV_LOG_STDERR)
        .map(|raw| matches!(raw.trim(), "1" | "true"))
        .unwrap_or(false);

    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path: Paths::new().ok().map(|paths| paths.log_file()),
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
