//! Scripted transport, auth API and executor fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_coordinator::{
    AccountInfo, AuthApi, AuthCoordinator, AuthResult, Credentials, LoginOutcome,
};
use auth_events::{AuthEvent, AuthEventBus};
use parking_lot::Mutex;
use request_executor::{
    HttpTransport, OutboundRequest, RetryingRequestExecutor, TransportError, TransportResponse,
};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use token_storage::{TokenPair, TokenStore};
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

pub const API_BASE: &str = "http://api.test/api";

/// What the transport does for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Fail(TransportError),
    /// Never answers within any reasonable attempt timeout.
    Stall,
}

/// Transport answering from a queue, 201 once the queue is empty.
///
/// A token set with [`MockTransport::reject_token`] gets a 401 before the
/// queue is consulted.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    rejected_token: Mutex<Option<String>>,
    latency: Mutex<Duration>,
    requests: Mutex<Vec<(Instant, OutboundRequest)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let transport = Self::new();
        transport.replies.lock().extend(replies);
        transport
    }

    pub fn reject_token(&self, token: &str) {
        *self.rejected_token.lock() = Some(token.to_string());
    }

    /// How long every request takes before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.bearer_token).collect()
    }

    /// Time between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        let requests = self.requests.lock();
        requests
            .windows(2)
            .map(|pair| pair[1].0.duration_since(pair[0].0))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let rejected = self.rejected_token.lock().clone();
        let rejects_token = rejected.as_deref() == Some(request.bearer_token.as_str());
        self.requests.lock().push((Instant::now(), request));

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if rejects_token {
            return Ok(TransportResponse::new(401, "token expired"));
        }

        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or(Reply::Status(201));
        match reply {
            Reply::Status(status) => Ok(TransportResponse::new(status, "{}")),
            Reply::Fail(error) => Err(error),
            Reply::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TransportResponse::new(201, "{}"))
            }
        }
    }
}

/// Auth API that always logs in; refresh `n` yields `access-n`.
#[derive(Default)]
pub struct MockAuthApi {
    refresh_replies: Mutex<VecDeque<AuthResult<TokenPair>>>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
}

impl MockAuthApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_refresh(&self, reply: AuthResult<TokenPair>) {
        self.refresh_replies.lock().push_back(reply);
    }

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
        Ok(LoginOutcome {
            tokens: TokenPair::new("access-login", "refresh-login"),
            user: None,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenPair> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.refresh_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(TokenPair::new(format!("access-{}", n), format!("refresh-{}", n))))
    }

    async fn logout(&self, _refresh_token: &str) -> AuthResult<()> {
        Ok(())
    }

    async fn verify(&self, _access_token: &str) -> AuthResult<AccountInfo> {
        Ok(AccountInfo {
            id: "user-1".to_string(),
            email: None,
        })
    }
}

pub struct Harness {
    pub executor: Arc<RetryingRequestExecutor>,
    pub coordinator: Arc<AuthCoordinator>,
    pub transport: Arc<MockTransport>,
    pub api: Arc<MockAuthApi>,
    pub events: Arc<Mutex<Vec<AuthEvent>>>,
}

impl Harness {
    /// Executor over `transport` with a coordinator that has not logged in.
    pub fn new(transport: Arc<MockTransport>) -> Self {
        let api = MockAuthApi::new();
        let bus = Arc::new(AuthEventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_all(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });

        let coordinator = Arc::new(AuthCoordinator::new(
            TokenStore::in_memory(),
            api.clone(),
            bus,
        ));
        let executor = Arc::new(RetryingRequestExecutor::new(
            coordinator.clone(),
            transport.clone(),
            API_BASE,
        ));

        Self {
            executor,
            coordinator,
            transport,
            api,
            events,
        }
    }

    pub async fn logged_in(transport: Arc<MockTransport>) -> Self {
        let harness = Self::new(transport);
        harness
            .coordinator
            .login(&Credentials::password("dev@tokensync.dev", "correct horse"))
            .await
            .unwrap();
        harness.events.lock().clear();
        harness
    }

    /// Same collaborators, new executor with a different attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.executor = Arc::new(
            RetryingRequestExecutor::new(
                self.coordinator.clone(),
                self.transport.clone(),
                API_BASE,
            )
            .with_attempt_timeout(timeout),
        );
        self
    }

    pub fn auth_errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                AuthEvent::AuthError { reason } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Paused-clock gaps land on whole milliseconds; allow one tick of slack.
pub fn assert_gap(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(1),
        "gap {:?}, expected {:?}",
        actual,
        expected
    );
}

pub fn url(path: &str) -> String {
    format!("{}{}", API_BASE, path)
}

// =========================================================================
// Log capture
// =========================================================================

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Records every tracing event emitted on the current thread while its guard
/// is alive.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<CapturedEvent>>>);

impl LogCapture {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.0
            .lock()
            .iter()
            .filter(|event| event.message == message)
            .cloned()
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        self.0.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: recorder.message,
            fields: recorder.fields,
        });
    }
}

#[derive(Default)]
struct FieldRecorder {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}
