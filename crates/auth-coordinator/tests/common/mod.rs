//! Scripted auth API and coordinator fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_coordinator::{
    AccountInfo, AuthApi, AuthCoordinator, AuthError, AuthResult, Credentials, LoginOutcome,
};
use auth_events::{AuthEvent, AuthEventBus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use token_storage::{FileStorage, TokenPair, TokenStore};

/// Auth API answering from queues, falling back to success when a queue is
/// empty. Every call is counted.
#[derive(Default)]
pub struct MockAuthApi {
    login_replies: Mutex<VecDeque<AuthResult<LoginOutcome>>>,
    refresh_replies: Mutex<VecDeque<AuthResult<TokenPair>>>,
    logout_replies: Mutex<VecDeque<AuthResult<()>>>,
    verify_replies: Mutex<VecDeque<AuthResult<AccountInfo>>>,
    refresh_delay: Mutex<Duration>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    pub verified_tokens: Mutex<Vec<String>>,
}

impl MockAuthApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_login(&self, reply: AuthResult<LoginOutcome>) {
        self.login_replies.lock().push_back(reply);
    }

    pub fn queue_refresh(&self, reply: AuthResult<TokenPair>) {
        self.refresh_replies.lock().push_back(reply);
    }

    pub fn queue_logout(&self, reply: AuthResult<()>) {
        self.logout_replies.lock().push_back(reply);
    }

    pub fn queue_verify(&self, reply: AuthResult<AccountInfo>) {
        self.verify_replies.lock().push_back(reply);
    }

    /// How long each refresh call takes.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, _credentials: &Credentials) -> AuthResult<LoginOutcome> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_replies.lock().pop_front().unwrap_or_else(|| {
            Ok(LoginOutcome {
                tokens: TokenPair::new("access-login", "refresh-login"),
                user: Some(account()),
            })
        })
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens_seen.lock().push(refresh_token.to_string());

        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.refresh_replies.lock().pop_front().unwrap_or_else(|| {
            Ok(TokenPair::new(
                format!("access-{}", n),
                format!("refresh-{}", n),
            ))
        })
    }

    async fn logout(&self, _refresh_token: &str) -> AuthResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_replies.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn verify(&self, access_token: &str) -> AuthResult<AccountInfo> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verified_tokens.lock().push(access_token.to_string());
        self.verify_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(account()))
    }
}

pub fn account() -> AccountInfo {
    AccountInfo {
        id: "user-1".to_string(),
        email: Some("dev@tokensync.dev".to_string()),
    }
}

pub fn credentials() -> Credentials {
    Credentials::password("dev@tokensync.dev", "correct horse")
}

pub fn rejected_refresh() -> AuthError {
    AuthError::RefreshTokenExpired("HTTP 401: refresh token revoked".to_string())
}

/// Every event published on the bus, in order.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<AuthEvent>>>);

impl EventLog {
    pub fn attach(bus: &AuthEventBus) -> Self {
        let log = Self::default();
        let sink = log.0.clone();
        bus.subscribe_all(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        log
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Coordinator over a file-backed store in a temp dir.
pub struct Fixture {
    pub coordinator: Arc<AuthCoordinator>,
    pub api: Arc<MockAuthApi>,
    pub bus: Arc<AuthEventBus>,
    pub events: EventLog,
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_api(MockAuthApi::new())
    }

    pub fn with_api(api: Arc<MockAuthApi>) -> Self {
        let dir = TempDir::new().unwrap();
        Self::in_dir(dir, api)
    }

    pub fn in_dir(dir: TempDir, api: Arc<MockAuthApi>) -> Self {
        let bus = Arc::new(AuthEventBus::new());
        let events = EventLog::attach(&bus);
        let store = open_store(&dir.path().join("session.json"));
        let coordinator = Arc::new(AuthCoordinator::new(
            store,
            api.clone(),
            bus.clone(),
        ));
        Self {
            coordinator,
            api,
            bus,
            events,
            dir,
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.path().join("session.json")
    }

    /// Independent view of what is persisted.
    pub fn persisted(&self) -> Option<TokenPair> {
        open_store(&self.session_path()).load().unwrap()
    }

    pub fn into_dir(self) -> TempDir {
        self.dir
    }

    pub async fn logged_in(self) -> Self {
        self.coordinator.login(&credentials()).await.unwrap();
        self.events.clear();
        self
    }
}

pub fn open_store(path: &std::path::Path) -> TokenStore {
    TokenStore::new(Box::new(FileStorage::new(path.to_path_buf()).unwrap()))
}
