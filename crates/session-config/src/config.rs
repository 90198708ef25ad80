//! Client configuration: JSON file first, then environment overrides.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Base URL used when neither the config file nor the environment sets one.
pub const DEFAULT_API_BASE_URL: &str = "https://api.tokensync.dev/api";

/// Minimum interval between two non-forced token refreshes.
pub const DEFAULT_REFRESH_DEBOUNCE_SECS: u64 = 10;

/// Per-attempt network timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_API_URL: &str = "TOKENSYNC_API_URL";
const ENV_CLIENT_ID: &str = "TOKENSYNC_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "TOKENSYNC_CLIENT_SECRET";
const ENV_REFRESH_DEBOUNCE_SECS: &str = "TOKENSYNC_REFRESH_DEBOUNCE_SECS";
const ENV_REQUEST_TIMEOUT_MS: &str = "TOKENSYNC_REQUEST_TIMEOUT_MS";
const ENV_CREDENTIAL_SYNC: &str = "TOKENSYNC_CREDENTIAL_SYNC";
const ENV_LOG_LEVEL: &str = "TOKENSYNC_LOG_LEVEL";

/// Client identifier/secret pair for non-interactive authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base API URL, e.g. `https://api.tokensync.dev/api`.
    pub api_base_url: String,
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Refresh debounce window in seconds.
    pub refresh_debounce_secs: u64,
    pub request_timeout_ms: u64,
    /// Mirror credentials to an external tool on login/refresh/logout.
    pub credential_sync_enabled: bool,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
            refresh_debounce_secs: DEFAULT_REFRESH_DEBOUNCE_SECS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            credential_sync_enabled: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load `config.json` under `paths` (defaults if missing), then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `config.json` under `paths`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored and
    /// unparsable numbers leave the current value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = get(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(id) = get(ENV_CLIENT_ID) {
            self.client_id = Some(id);
        }
        if let Some(secret) = get(ENV_CLIENT_SECRET) {
            self.client_secret = Some(secret);
        }
        if let Some(secs) = get(ENV_REFRESH_DEBOUNCE_SECS).and_then(|v| v.parse().ok()) {
            self.refresh_debounce_secs = secs;
        }
        if let Some(ms) = get(ENV_REQUEST_TIMEOUT_MS).and_then(|v| v.parse().ok()) {
            self.request_timeout_ms = ms;
        }
        if let Some(flag) = get(ENV_CREDENTIAL_SYNC) {
            self.credential_sync_enabled = matches!(
                flag.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    /// Reject configurations that cannot work at all.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.client_id.is_some() != self.client_secret.is_some() {
            tracing::warn!("only one of client_id/client_secret is set, ignoring both");
        }
        Ok(())
    }

    /// Base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn api_base(&self) -> String {
        self.api_base_url.trim_end_matches('/').to_string()
    }

    /// Both halves of the client credentials, or none.
    pub fn client_credentials(&self) -> Option<ClientCredentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => None,
        }
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_secs(self.refresh_debounce_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
