//! Auth endpoints of the tokensync API.
//!
//! [`AuthApi`] is the seam the coordinator talks through; [`HttpAuthApi`] is
//! the reqwest implementation. Tests script their own.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use session_config::Config;
use std::fmt;
use std::time::Duration;
use token_storage::TokenPair;
use tracing::{debug, warn};

/// How the client authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Interactive user login.
    Password { email: String, password: String },
    /// Non-interactive client login.
    ClientSecret {
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Client credentials from config, when both halves are set.
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .client_credentials()
            .map(|creds| Credentials::ClientSecret {
                client_id: creds.client_id,
                client_secret: creds.client_secret,
            })
    }

    fn kind(&self) -> &'static str {
        match self {
            Credentials::Password { .. } => "password",
            Credentials::ClientSecret { .. } => "client_secret",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"[redacted]")
                .finish(),
            Credentials::ClientSecret { client_id, .. } => f
                .debug_struct("ClientSecret")
                .field("client_id", client_id)
                .field("client_secret", &"[redacted]")
                .finish(),
        }
    }
}

/// Account the session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: Option<AccountInfo>,
}

/// Remote auth operations used by the coordinator.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token pair.
    async fn login(&self, credentials: &Credentials) -> AuthResult<LoginOutcome>;

    /// Exchange a refresh token for a new pair.
    ///
    /// A rejected refresh token must surface as
    /// [`AuthError::RefreshTokenExpired`].
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair>;

    /// Revoke the refresh token server-side.
    async fn logout(&self, refresh_token: &str) -> AuthResult<()>;

    /// Check an access token. A rejected token is [`AuthError::Unauthorized`].
    async fn verify(&self, access_token: &str) -> AuthResult<AccountInfo>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordLoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user: Option<AccountInfo>,
}

/// What went wrong with a single HTTP exchange, before endpoint-specific
/// classification.
enum Failure {
    Status { status: u16, body: String },
    Other(AuthError),
}

fn transport_error(err: reqwest::Error) -> AuthError {
    if err.is_decode() {
        AuthError::ServerError {
            status: err.status().map(|s| s.as_u16()).unwrap_or(200),
            message: format!("malformed response: {}", err),
        }
    } else {
        AuthError::NetworkError(err.to_string())
    }
}

fn summarize(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// reqwest implementation of [`AuthApi`].
#[derive(Clone)]
pub struct HttpAuthApi {
    http_client: reqwest::Client,
    api_base: String,
}

impl HttpAuthApi {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        config.api_base_url()?;
        Self::new(config.api_base(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<R, Failure> {
        let response = request
            .send()
            .await
            .map_err(|e| Failure::Other(transport_error(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(path, status = status.as_u16(), "auth request rejected");
            return Err(Failure::Status {
                status: status.as_u16(),
                body: summarize(&body),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| Failure::Other(transport_error(e)))
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, Failure> {
        let request = self.http_client.post(self.url(path)).json(body);
        self.send(request, path).await
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> AuthResult<LoginOutcome> {
        debug!(kind = credentials.kind(), "attempting login");

        let result: Result<TokenResponse, Failure> = match credentials {
            Credentials::Password { email, password } => {
                self.post("/auth/login", &PasswordLoginRequest { email, password })
                    .await
            }
            Credentials::ClientSecret {
                client_id,
                client_secret,
            } => {
                self.post(
                    "/auth/client-token",
                    &ClientTokenRequest {
                        client_id,
                        client_secret,
                    },
                )
                .await
            }
        };

        match result {
            Ok(data) => Ok(LoginOutcome {
                tokens: TokenPair::new(data.access_token, data.refresh_token),
                user: data.user,
            }),
            Err(Failure::Status { status, body }) if matches!(status, 400 | 401 | 403 | 422) => {
                warn!(status, "login rejected");
                Err(AuthError::InvalidCredentials(format!("HTTP {}: {}", status, body)))
            }
            Err(Failure::Status { status, body }) => Err(AuthError::ServerError {
                status,
                message: body,
            }),
            Err(Failure::Other(e)) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let result: Result<TokenResponse, Failure> = self
            .post("/auth/refresh-token", &RefreshTokenRequest { refresh_token })
            .await;

        match result {
            Ok(data) => Ok(TokenPair::new(data.access_token, data.refresh_token)),
            Err(Failure::Status { status, body }) if matches!(status, 400 | 401 | 403) => {
                Err(AuthError::RefreshTokenExpired(format!("HTTP {}: {}", status, body)))
            }
            Err(Failure::Status { status, body }) => Err(AuthError::ServerError {
                status,
                message: body,
            }),
            Err(Failure::Other(e)) => Err(e),
        }
    }

    async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let result: Result<serde_json::Value, Failure> = self
            .post("/auth/logout", &RefreshTokenRequest { refresh_token })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(Failure::Status { status, body }) => Err(AuthError::ServerError {
                status,
                message: body,
            }),
            Err(Failure::Other(e)) => Err(e),
        }
    }

    async fn verify(&self, access_token: &str) -> AuthResult<AccountInfo> {
        let request = self
            .http_client
            .get(self.url("/auth/me"))
            .bearer_auth(access_token);

        match self.send::<AccountInfo>(request, "/auth/me").await {
            Ok(user) => Ok(user),
            Err(Failure::Status { status: 401, body }) => Err(AuthError::Unauthorized(body)),
            Err(Failure::Status { status, body }) => Err(AuthError::ServerError {
                status,
                message: body,
            }),
            Err(Failure::Other(e)) => Err(e),
        }
    }
}
