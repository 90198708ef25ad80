//! Token usage reporting.

use crate::endpoint::EndpointSpec;
use crate::error::{RequestError, RequestResult};
use crate::executor::{ExecuteOutcome, Operation, RetryingRequestExecutor};
use crate::policy::RetryPolicy;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const USAGE_PATH: &str = "/usage/tokens";
const LEGACY_USAGE_PATH: &str = "/tokens/usage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub model: String,
    pub tokens: u64,
}

/// Records model token usage against the API.
#[derive(Debug, Clone)]
pub struct UsageClient {
    executor: Arc<RetryingRequestExecutor>,
    policy: RetryPolicy,
    endpoints: EndpointSpec,
}

impl UsageClient {
    pub fn new(executor: Arc<RetryingRequestExecutor>) -> Self {
        Self {
            executor,
            policy: RetryPolicy::default(),
            endpoints: EndpointSpec::new(USAGE_PATH).with_fallback(LEGACY_USAGE_PATH),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn record_token_usage(&self, model: &str, tokens: u64) -> RequestResult<ExecuteOutcome> {
        let model = model.trim();
        if model.is_empty() {
            return Err(RequestError::Invalid("model must not be empty".to_string()));
        }

        let usage = TokenUsage {
            model: model.to_string(),
            tokens,
        };
        let body = serde_json::to_value(&usage)
            .map_err(|e| RequestError::Invalid(format!("unencodable usage record: {}", e)))?;

        let outcome = self
            .executor
            .execute(
                &Operation::post("record_token_usage", body),
                &self.policy,
                &self.endpoints,
            )
            .await?;
        debug!(model, tokens, attempts = outcome.attempts, "token usage recorded");
        Ok(outcome)
    }
}
