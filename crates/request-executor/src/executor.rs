//! The retry loop.

use crate::endpoint::EndpointSpec;
use crate::error::{RequestError, RequestResult};
use crate::policy::RetryPolicy;
use crate::transport::{
    HttpMethod, HttpTransport, OutboundRequest, ReqwestTransport, TransportError,
    TransportResponse,
};
use auth_coordinator::AuthCoordinator;
use serde::de::DeserializeOwned;
use serde_json::Value;
use session_config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// A logical operation: what to send, independent of which path serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Used in logs only.
    pub name: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
}

impl Operation {
    pub fn new(name: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            name: name.into(),
            method,
            body: None,
        }
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Get)
    }

    pub fn post(name: impl Into<String>, body: Value) -> Self {
        Self::new(name, HttpMethod::Post).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub status: u16,
    pub body: String,
    /// Network attempts made, the successful one included.
    pub attempts: u32,
    /// Path that answered.
    pub endpoint: String,
    /// Whether the token was refreshed along the way.
    pub refreshed: bool,
}

impl ExecuteOutcome {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

enum Failure {
    Status(TransportResponse),
    Transport(TransportError),
}

/// Runs authenticated operations to completion.
///
/// Per call:
/// - transient failures (listed statuses, connection errors, timeouts) are
///   retried against the same path after a backoff delay
/// - the first 404 moves to the next path in the [`EndpointSpec`] without
///   waiting; a later 404 ends the call with [`RequestError::NotFound`]
/// - the first 401 forces one token refresh (or picks up one another call
///   already made) and retries at once; a second 401 ends the call with
///   [`RequestError::Auth`]
///
/// No more than `max_attempts` requests are sent. The token is only ever
/// obtained from the coordinator.
pub struct RetryingRequestExecutor {
    coordinator: Arc<AuthCoordinator>,
    transport: Arc<dyn HttpTransport>,
    api_base: String,
    attempt_timeout: Duration,
}

impl RetryingRequestExecutor {
    pub fn new(
        coordinator: Arc<AuthCoordinator>,
        transport: Arc<dyn HttpTransport>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            transport,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Executor over reqwest, using the configured base URL and per-attempt
    /// timeout. Connecting is bounded by the same timeout.
    pub fn from_config(config: &Config, coordinator: Arc<AuthCoordinator>) -> RequestResult<Self> {
        config
            .api_base_url()
            .map_err(|e| RequestError::Invalid(e.to_string()))?;
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| RequestError::Invalid(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::new(
            coordinator,
            Arc::new(ReqwestTransport::with_client(http_client)),
            config.api_base(),
        )
        .with_attempt_timeout(config.request_timeout()))
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn coordinator(&self) -> &Arc<AuthCoordinator> {
        &self.coordinator
    }

    pub async fn execute(
        &self,
        operation: &Operation,
        policy: &RetryPolicy,
        endpoints: &EndpointSpec,
    ) -> RequestResult<ExecuteOutcome> {
        let mut token = self
            .coordinator
            .get_valid_token()
            .await
            .map_err(|source| RequestError::Session {
                source,
                attempts: 0,
            })?;

        let max_attempts = policy.max_attempts.max(1);
        let mut endpoint_index = 0;
        let mut attempts = 0;
        let mut backoff_slot = 0;
        let mut refreshed = false;
        let mut fell_back = false;

        loop {
            let path = endpoints
                .get(endpoint_index)
                .unwrap_or_else(|| endpoints.primary());
            attempts += 1;
            debug!(
                operation = %operation.name,
                attempt = attempts,
                path,
                "sending request"
            );

            let request = OutboundRequest {
                method: operation.method,
                url: format!("{}{}", self.api_base, path),
                bearer_token: token.clone(),
                body: operation.body.clone(),
            };
            let failure =
                match tokio::time::timeout(self.attempt_timeout, self.transport.send(request))
                    .await
                {
                    Ok(Ok(response)) if response.is_success() => {
                        debug!(
                            operation = %operation.name,
                            status = response.status,
                            attempts,
                            "request succeeded"
                        );
                        return Ok(ExecuteOutcome {
                            status: response.status,
                            body: response.body,
                            attempts,
                            endpoint: path.to_string(),
                            refreshed,
                        });
                    }
                    Ok(Ok(response)) => Failure::Status(response),
                    Ok(Err(e)) => Failure::Transport(e),
                    Err(_) => Failure::Transport(TransportError::Timeout),
                };

            let attempts_left = attempts < max_attempts;

            match failure {
                Failure::Status(TransportResponse { status: 401, .. }) => {
                    if refreshed {
                        self.coordinator.report_rejected_token(format!(
                            "{} rejected the refreshed access token",
                            operation.name
                        ));
                        return Err(RequestError::Auth { attempts });
                    }
                    if !attempts_left {
                        return Err(RequestError::Auth { attempts });
                    }
                    info!(operation = %operation.name, "access token rejected, refreshing");
                    let current = self
                        .coordinator
                        .get_valid_token()
                        .await
                        .map_err(|source| RequestError::Session { source, attempts })?;
                    token = if current != token {
                        // Another call already replaced the rejected token.
                        debug!(operation = %operation.name, "using token refreshed by another call");
                        current
                    } else {
                        self.coordinator
                            .force_refresh()
                            .await
                            .map_err(|source| RequestError::Session { source, attempts })?
                    };
                    refreshed = true;
                    continue;
                }
                Failure::Status(TransportResponse { status: 404, .. }) => {
                    // At most one fallback per call.
                    let next = if fell_back || !attempts_left {
                        None
                    } else {
                        endpoints.get(endpoint_index + 1)
                    };
                    let Some(next) = next else {
                        return Err(RequestError::NotFound {
                            path: path.to_string(),
                            attempts,
                        });
                    };
                    info!(
                        operation = %operation.name,
                        from = path,
                        to = next,
                        "endpoint not found, falling back"
                    );
                    endpoint_index += 1;
                    fell_back = true;
                    continue;
                }
                Failure::Status(response) if policy.is_retryable(response.status) => {
                    if !attempts_left {
                        return Err(terminal_status(response, attempts));
                    }
                    warn!(
                        operation = %operation.name,
                        status = response.status,
                        attempt = attempts,
                        "retryable status"
                    );
                }
                Failure::Status(response) => return Err(terminal_status(response, attempts)),
                Failure::Transport(e) => {
                    if !attempts_left {
                        return Err(RequestError::Network {
                            message: e.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        operation = %operation.name,
                        error = %e,
                        attempt = attempts,
                        "request failed"
                    );
                }
            }

            backoff_slot += 1;
            let delay = policy.delay_for(backoff_slot);
            debug!(
                operation = %operation.name,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn terminal_status(response: TransportResponse, attempts: u32) -> RequestError {
    if response.status >= 500 {
        RequestError::Server {
            status: response.status,
            body: response.body,
            attempts,
        }
    } else {
        RequestError::Client {
            status: response.status,
            body: response.body,
            attempts,
        }
    }
}

impl std::fmt::Debug for RetryingRequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingRequestExecutor")
            .field("api_base", &self.api_base)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}
