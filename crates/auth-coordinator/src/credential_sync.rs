//! Mirroring credentials to an external tool.
//!
//! A [`CredentialSink`] is driven entirely by bus events: LOGIN_SUCCESS and
//! TOKEN_REFRESHED write the pair, LOGOUT removes it. Whatever the sink does
//! is its own business; failures are logged by the bus and never reach the
//! coordinator.

use auth_events::{AuthEvent, AuthEventBus, AuthEventType, HandlerResult, SubscriptionHandle};
use serde::Serialize;
use session_config::{Config, Paths};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use token_storage::TokenPair;
use tracing::{debug, info};

/// Receiver of credential changes.
pub trait CredentialSink: Send + Sync {
    fn store(&self, tokens: &TokenPair) -> HandlerResult;
    fn remove(&self) -> HandlerResult;
}

/// Subscribe `sink` to the events it mirrors.
pub fn attach(bus: &AuthEventBus, sink: Arc<dyn CredentialSink>) -> Vec<SubscriptionHandle> {
    let handles = vec![
        bus.subscribe(AuthEventType::LoginSuccess, store_tokens(Arc::clone(&sink))),
        bus.subscribe(AuthEventType::TokenRefreshed, store_tokens(Arc::clone(&sink))),
        bus.subscribe(AuthEventType::Logout, move |_| sink.remove()),
    ];
    debug!(subscriptions = handles.len(), "credential sink attached");
    handles
}

fn store_tokens(
    sink: Arc<dyn CredentialSink>,
) -> impl Fn(&AuthEvent) -> HandlerResult + Send + Sync + 'static {
    move |event: &AuthEvent| match event.tokens() {
        Some(tokens) => sink.store(tokens),
        None => Ok(()),
    }
}

/// [`attach`] when `credential_sync_enabled` is set; otherwise nothing.
pub fn attach_if_enabled(
    config: &Config,
    bus: &AuthEventBus,
    sink: Arc<dyn CredentialSink>,
) -> Vec<SubscriptionHandle> {
    if !config.credential_sync_enabled {
        return Vec::new();
    }
    info!("credential sync enabled");
    attach(bus, sink)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MirroredCredentials<'a> {
    access_token: &'a str,
    refresh_token: &'a str,
    obtained_at: String,
}

/// Writes the current pair as JSON to a fixed path and deletes it on logout.
#[derive(Debug, Clone)]
pub struct FileCredentialMirror {
    path: PathBuf,
}

impl FileCredentialMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Mirror at the default location under `paths`.
    pub fn from_paths(paths: &Paths) -> Self {
        Self::new(paths.credential_mirror_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSink for FileCredentialMirror {
    fn store(&self, tokens: &TokenPair) -> HandlerResult {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(
            &mut tmp,
            &MirroredCredentials {
                access_token: &tokens.access_token,
                refresh_token: &tokens.refresh_token,
                obtained_at: tokens.obtained_at.to_rfc3339(),
            },
        )?;
        tmp.flush()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), "credentials mirrored");
        Ok(())
    }

    fn remove(&self) -> HandlerResult {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "mirrored credentials removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
