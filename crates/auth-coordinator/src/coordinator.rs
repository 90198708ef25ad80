//! Session coordination with single-flight token refresh.
//!
//! [`AuthCoordinator`] is the only writer of the [`TokenStore`] and the only
//! publisher of lifecycle events. All state lives behind one mutex; network
//! calls happen outside it. Every operation follows the same shape:
//!
//! 1. under the lock, apply an FSM transition and decide what to do
//! 2. release the lock, talk to the server
//! 3. under the lock again, apply the outcome and collect events
//! 4. publish the events, then resume anyone waiting on the outcome
//!
//! Steps 1 and 3 hold the emit lock through publication, so subscribers see
//! events in the same order the transitions were applied.

use crate::api::{AccountInfo, AuthApi, Credentials, HttpAuthApi};
use crate::auth_fsm::{public_state, AuthMachine, AuthMachineInput};
use crate::{AuthError, AuthResult};
use auth_events::{AuthEvent, AuthEventBus, AuthState};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use session_config::{Config, Paths, DEFAULT_REFRESH_DEBOUNCE_SECS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use token_storage::{StorageError, TokenPair, TokenStore};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type RefreshWaiter = oneshot::Sender<AuthResult<String>>;

/// Whether a refresh may be served from the debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Reuse the current token if the last refresh is recent enough.
    IfStale,
    /// Always hit the server (e.g. after a 401). Still joins an in-flight
    /// refresh instead of starting a second one.
    Force,
}

/// Point-in-time view for status indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub authenticated: bool,
    pub user: Option<AccountInfo>,
    /// When the current pair was obtained.
    pub obtained_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

struct Inner {
    machine: AuthMachine,
    tokens: Option<TokenPair>,
    user: Option<AccountInfo>,
    /// Callers parked on the in-flight refresh.
    waiters: VecDeque<RefreshWaiter>,
    /// Bumped by logout so late network results can be recognized and dropped.
    epoch: u64,
    last_refresh: Option<(Instant, DateTime<Utc>)>,
}

impl Inner {
    fn state(&self) -> AuthState {
        public_state(self.machine.state())
    }

    /// Apply `input`, recording a STATE_CHANGED event if the state moved.
    fn transition(
        &mut self,
        input: AuthMachineInput,
        events: &mut Vec<AuthEvent>,
    ) -> AuthResult<()> {
        let from = self.state();
        self.machine.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!("Cannot apply {:?} in state {}", input, from))
        })?;
        let to = self.state();

        if from != to {
            debug!(old_state = %from, new_state = %to, "Auth state transition");
            events.push(AuthEvent::StateChanged { from, to });
        }
        Ok(())
    }
}

enum RefreshPlan {
    Cached(String),
    Join(oneshot::Receiver<AuthResult<String>>),
    Lead { refresh_token: String, epoch: u64 },
}

#[derive(Clone, Copy)]
enum FlightKind {
    Login,
    Refresh,
}

/// Settles an in-flight login or refresh if its future is dropped before
/// the network call returns.
struct FlightGuard<'a> {
    coordinator: &'a AuthCoordinator,
    kind: FlightKind,
    epoch: u64,
    armed: bool,
}

impl<'a> FlightGuard<'a> {
    fn new(coordinator: &'a AuthCoordinator, kind: FlightKind, epoch: u64) -> Self {
        Self {
            coordinator,
            kind,
            epoch,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("auth request cancelled before completion");
        let interrupted = AuthError::NetworkError("request cancelled".to_string());
        match self.kind {
            FlightKind::Login => {
                let _ = self.coordinator.settle_login(self.epoch, Err(interrupted));
            }
            FlightKind::Refresh => {
                let _ = self.coordinator.settle_refresh(self.epoch, Err(interrupted));
            }
        }
    }
}

/// Owner of the client session.
///
/// Construct one per process at the composition root and share it by `Arc`.
pub struct AuthCoordinator {
    store: TokenStore,
    api: Arc<dyn AuthApi>,
    bus: Arc<AuthEventBus>,
    refresh_debounce: Duration,
    inner: Mutex<Inner>,
    /// Held from a transition until its events are published. Reentrant so a
    /// handler may call [`AuthCoordinator::report_rejected_token`].
    emit: ReentrantMutex<()>,
}

impl AuthCoordinator {
    pub fn new(store: TokenStore, api: Arc<dyn AuthApi>, bus: Arc<AuthEventBus>) -> Self {
        Self {
            store,
            api,
            bus,
            refresh_debounce: Duration::from_secs(DEFAULT_REFRESH_DEBOUNCE_SECS),
            inner: Mutex::new(Inner {
                machine: AuthMachine::new(),
                tokens: None,
                user: None,
                waiters: VecDeque::new(),
                epoch: 0,
                last_refresh: None,
            }),
            emit: ReentrantMutex::new(()),
        }
    }

    /// Minimum interval between two non-forced refreshes.
    pub fn with_refresh_debounce(mut self, debounce: Duration) -> Self {
        self.refresh_debounce = debounce;
        self
    }

    /// File-backed store under `paths` and the HTTP API from `config`.
    pub fn from_config(config: &Config, paths: &Paths, bus: Arc<AuthEventBus>) -> AuthResult<Self> {
        let store = token_storage::open_token_store(paths)?;
        let api = HttpAuthApi::from_config(config)?;
        Ok(Self::new(store, Arc::new(api), bus).with_refresh_debounce(config.refresh_debounce()))
    }

    pub fn bus(&self) -> &Arc<AuthEventBus> {
        &self.bus
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().state()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let inner = self.inner.lock();
        let state = inner.state();
        AuthSnapshot {
            state,
            authenticated: state == AuthState::Authenticated,
            user: inner.user.clone(),
            obtained_at: inner.tokens.as_ref().map(|t| t.obtained_at),
            last_refresh_at: inner.last_refresh.map(|(_, at)| at),
        }
    }

    /// Run `f` under the state lock, then publish whatever it recorded.
    fn apply<T>(&self, f: impl FnOnce(&mut Inner, &mut Vec<AuthEvent>) -> T) -> T {
        let _emit = self.emit.lock();
        let mut events = Vec::new();
        let out = {
            let mut inner = self.inner.lock();
            f(&mut inner, &mut events)
        };
        for event in events {
            self.bus.publish(event);
        }
        out
    }

    fn persist(&self, tokens: &TokenPair) {
        if let Err(e) = self.store.save(tokens) {
            error!(error = %e, "failed to persist token pair, keeping in-memory session");
        }
    }

    fn forget(&self) {
        if let Err(e) = self.store.clear() {
            error!(error = %e, "failed to clear persisted token pair");
        }
    }

    /// Authenticate and replace any current session.
    pub async fn login(&self, credentials: &Credentials) -> AuthResult<()> {
        let epoch = self.apply(|inner, events| {
            inner.transition(AuthMachineInput::LoginAttempt, events)?;
            Ok::<_, AuthError>(inner.epoch)
        })?;

        let guard = FlightGuard::new(self, FlightKind::Login, epoch);
        let result = self.api.login(credentials).await;
        guard.disarm();

        self.settle_login(epoch, result.map(|outcome| (outcome.tokens, outcome.user)))
    }

    fn settle_login(
        &self,
        epoch: u64,
        result: AuthResult<(TokenPair, Option<AccountInfo>)>,
    ) -> AuthResult<()> {
        self.apply(|inner, events| {
            if inner.epoch != epoch {
                warn!("login finished after logout, discarding result");
                return Err(AuthError::NotAuthenticated);
            }

            match result {
                Ok((tokens, user)) => {
                    self.persist(&tokens);
                    inner.tokens = Some(tokens.clone());
                    inner.user = user;
                    inner.last_refresh = None;
                    events.push(AuthEvent::LoginSuccess { tokens });
                    inner.transition(AuthMachineInput::LoginSucceeded, events)?;
                    info!(user_id = ?inner.user.as_ref().map(|u| u.id.as_str()), "Login successful");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Login failed");
                    if inner.tokens.take().is_some() {
                        self.forget();
                    }
                    inner.user = None;
                    events.push(AuthEvent::AuthError {
                        reason: e.to_string(),
                    });
                    inner.transition(AuthMachineInput::LoginFailed, events)?;
                    Err(e)
                }
            }
        })
    }

    /// Adopt a persisted pair without network I/O.
    ///
    /// Returns whether a session is now available. Does nothing if one is
    /// already active.
    pub fn restore(&self) -> AuthResult<bool> {
        self.apply(|inner, events| {
            match inner.state() {
                AuthState::Authenticated | AuthState::Refreshing => return Ok(true),
                AuthState::Authenticating => return Ok(false),
                AuthState::Unauthenticated | AuthState::LoggedOut => {}
            }

            let tokens = match self.store.load() {
                Ok(Some(tokens)) => tokens,
                Ok(None) => return Ok(false),
                Err(StorageError::Encoding(reason)) => {
                    warn!(%reason, "discarding unreadable persisted session");
                    self.forget();
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };

            inner.transition(AuthMachineInput::RestoreSession, events)?;
            inner.tokens = Some(tokens);
            info!("Restored persisted session");
            Ok(true)
        })
    }

    /// Current access token, waiting for an in-flight refresh if there is one.
    pub async fn get_valid_token(&self) -> AuthResult<String> {
        let waiter = {
            let mut inner = self.inner.lock();
            match inner.state() {
                AuthState::Authenticated => {
                    return inner
                        .tokens
                        .as_ref()
                        .map(|tokens| tokens.access_token.clone())
                        .ok_or(AuthError::NotAuthenticated);
                }
                AuthState::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    rx
                }
                _ => return Err(AuthError::NotAuthenticated),
            }
        };
        await_refresh(waiter).await
    }

    /// Refresh, serving recent results from cache unless forced.
    pub async fn refresh(&self, mode: RefreshMode) -> AuthResult<String> {
        let plan = self.apply(|inner, events| -> AuthResult<RefreshPlan> {
            match inner.state() {
                AuthState::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    debug!(waiters = inner.waiters.len(), "joining in-flight refresh");
                    return Ok(RefreshPlan::Join(rx));
                }
                AuthState::Authenticated => {}
                _ => return Err(AuthError::NotAuthenticated),
            }

            let tokens = inner.tokens.clone().ok_or(AuthError::NotAuthenticated)?;

            if mode == RefreshMode::IfStale {
                if let Some((at, _)) = inner.last_refresh {
                    if at.elapsed() < self.refresh_debounce {
                        debug!("refresh debounced, serving cached token");
                        return Ok(RefreshPlan::Cached(tokens.access_token));
                    }
                }
            }

            inner.transition(AuthMachineInput::RefreshRequested, events)?;
            Ok(RefreshPlan::Lead {
                refresh_token: tokens.refresh_token,
                epoch: inner.epoch,
            })
        })?;

        match plan {
            RefreshPlan::Cached(token) => Ok(token),
            RefreshPlan::Join(rx) => await_refresh(rx).await,
            RefreshPlan::Lead {
                refresh_token,
                epoch,
            } => {
                let guard = FlightGuard::new(self, FlightKind::Refresh, epoch);
                let result = self.api.refresh(&refresh_token).await;
                guard.disarm();
                self.settle_refresh(epoch, result)
            }
        }
    }

    /// Shorthand for `refresh(RefreshMode::Force)`.
    pub async fn force_refresh(&self) -> AuthResult<String> {
        self.refresh(RefreshMode::Force).await
    }

    fn settle_refresh(&self, epoch: u64, result: AuthResult<TokenPair>) -> AuthResult<String> {
        let (outcome, waiters) = self.apply(|inner, events| {
            // Logout already rejected this flight's waiters; any queued now
            // belong to a newer flight.
            if inner.epoch != epoch || inner.state() != AuthState::Refreshing {
                debug!("refresh finished after logout, discarding result");
                return (Err(AuthError::NotAuthenticated), Vec::new());
            }

            let outcome = match result {
                Ok(tokens) => {
                    self.persist(&tokens);
                    let access = tokens.access_token.clone();
                    inner.tokens = Some(tokens.clone());
                    inner.last_refresh = Some((Instant::now(), Utc::now()));
                    events.push(AuthEvent::TokenRefreshed { tokens });
                    info!("Token refreshed successfully");
                    inner
                        .transition(AuthMachineInput::RefreshSucceeded, events)
                        .map(|_| access)
                }
                Err(e @ AuthError::RefreshTokenExpired(_)) => {
                    warn!(error = %e, "Refresh token rejected, ending session");
                    inner.tokens = None;
                    inner.user = None;
                    inner.last_refresh = None;
                    self.forget();
                    events.push(AuthEvent::AuthError {
                        reason: e.to_string(),
                    });
                    events.push(AuthEvent::Logout);
                    inner
                        .transition(AuthMachineInput::RefreshExpired, events)
                        .and(Err(e))
                }
                Err(e) => {
                    warn!(error = %e, "Refresh failed, keeping current session");
                    inner
                        .transition(AuthMachineInput::RefreshInterrupted, events)
                        .and(Err(e))
                }
            };

            let waiters: Vec<_> = inner.waiters.drain(..).collect();
            (outcome, waiters)
        });

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "resolving refresh waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }

    /// End the session locally, then revoke it server-side on a best-effort
    /// basis. Always ends in `LoggedOut`.
    pub async fn logout(&self) -> AuthResult<()> {
        let (refresh_token, waiters) = self.apply(|inner, events| {
            let had_session = inner.tokens.is_some() || inner.state() != AuthState::LoggedOut;
            inner.epoch += 1;
            let tokens = inner.tokens.take();
            inner.user = None;
            inner.last_refresh = None;
            let waiters: Vec<_> = inner.waiters.drain(..).collect();
            self.forget();

            if had_session {
                events.push(AuthEvent::Logout);
            }
            inner.transition(AuthMachineInput::LogoutRequested, events)?;
            Ok::<_, AuthError>((tokens.map(|t| t.refresh_token), waiters))
        })?;

        for waiter in waiters {
            let _ = waiter.send(Err(AuthError::NotAuthenticated));
        }

        if let Some(refresh_token) = refresh_token {
            if let Err(e) = self.api.logout(&refresh_token).await {
                warn!(error = %e, "remote logout failed, local session already cleared");
            }
        }

        info!("Logged out");
        Ok(())
    }

    /// Confirm the session with the server, refreshing once if the access
    /// token is rejected.
    pub async fn verify(&self) -> AuthResult<AccountInfo> {
        self.restore()?;
        let token = self.get_valid_token().await?;

        let user = match self.api.verify(&token).await {
            Ok(user) => user,
            Err(AuthError::Unauthorized(_)) => {
                debug!("access token rejected during verify, forcing refresh");
                let token = self.force_refresh().await?;
                match self.api.verify(&token).await {
                    Ok(user) => user,
                    Err(e @ AuthError::Unauthorized(_)) => {
                        self.reject_session(&e);
                        return Err(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        self.inner.lock().user = Some(user.clone());
        Ok(user)
    }

    /// Access token refused even after a fresh refresh; nothing left to try.
    fn reject_session(&self, cause: &AuthError) {
        let _ = self.apply(|inner, events| {
            if inner.state() != AuthState::Authenticated {
                return Ok(());
            }
            inner.tokens = None;
            inner.user = None;
            inner.last_refresh = None;
            self.forget();
            events.push(AuthEvent::AuthError {
                reason: cause.to_string(),
            });
            inner.transition(AuthMachineInput::SessionRejected, events)
        });
    }

    /// Publish AUTH_ERROR for a token the server kept refusing after a refresh.
    ///
    /// Session state is left alone; callers decide whether to log out.
    pub fn report_rejected_token(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "access token rejected after refresh");
        self.apply(|_, events| {
            events.push(AuthEvent::AuthError { reason });
        });
    }
}

async fn await_refresh(rx: oneshot::Receiver<AuthResult<String>>) -> AuthResult<String> {
    rx.await
        .unwrap_or_else(|_| Err(AuthError::NetworkError("refresh abandoned".to_string())))
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCoordinator")
            .field("state", &self.state())
            .field("refresh_debounce", &self.refresh_debounce)
            .finish_non_exhaustive()
    }
}
