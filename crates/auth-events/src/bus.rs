//! Synchronous publish/subscribe for [`AuthEvent`]s.
//!
//! Handlers run on the publisher's task, in subscription order. The handler
//! list is snapshotted before dispatch, so a handler may subscribe or
//! unsubscribe without deadlocking; such changes apply from the next publish.

use crate::{AuthEvent, AuthEventType};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffer size of the async event stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

/// What a handler returns. Errors are logged by the bus, never propagated.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&AuthEvent) -> HandlerResult + Send + Sync>;

/// Opaque token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    id: u64,
    /// `None` matches every event type.
    filter: Option<AuthEventType>,
    handler: Handler,
}

/// Process-wide event channel, constructed once and shared by `Arc`.
pub struct AuthEventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
    stream: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEventBus {
    pub fn new() -> Self {
        Self::with_stream_capacity(DEFAULT_STREAM_CAPACITY)
    }

    pub fn with_stream_capacity(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity.max(1));
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(Vec::new()),
            stream,
        }
    }

    /// Register `handler` for one event type.
    pub fn subscribe<F>(&self, event_type: AuthEventType, handler: F) -> SubscriptionHandle
    where
        F: Fn(&AuthEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert(Some(event_type), Arc::new(handler))
    }

    /// Register `handler` for every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&AuthEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    fn insert(&self, filter: Option<AuthEventType>, handler: Handler) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.write().push(Subscription {
            id,
            filter,
            handler,
        });
        debug!(subscription = id, filter = ?filter, "auth event subscription added");
        SubscriptionHandle(id)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != handle.0);
        before != subscriptions.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Receiver for consumers that live on their own task.
    ///
    /// Receivers that fall behind by more than the stream capacity observe
    /// `RecvError::Lagged` and lose the oldest events.
    pub fn stream(&self) -> broadcast::Receiver<AuthEvent> {
        self.stream.subscribe()
    }

    /// Deliver `event` to every matching handler, then to stream receivers.
    pub fn publish(&self, event: AuthEvent) {
        let event_type = event.event_type();
        let handlers: Vec<(u64, Handler)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.filter.map_or(true, |f| f == event_type))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        debug!(event = %event_type, handlers = handlers.len(), "publishing auth event");

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| (*handler)(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(subscription = id, event = %event_type, error = %e, "auth event handler failed");
                }
                Err(_) => {
                    warn!(subscription = id, event = %event_type, "auth event handler panicked");
                }
            }
        }

        // No receivers is not an error.
        let _ = self.stream.send(event);
    }
}

impl std::fmt::Debug for AuthEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthState;
    use parking_lot::Mutex;
    use token_storage::TokenPair;

    type BoxedHandler = Box<dyn Fn(&AuthEvent) -> HandlerResult + Send + Sync>;

    /// Shared log plus a factory of handlers that append `name:EVENT` to it.
    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> BoxedHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |name: &str| -> BoxedHandler {
            let sink = Arc::clone(&sink);
            let name = name.to_string();
            Box::new(move |event: &AuthEvent| {
                sink.lock().push(format!("{}:{}", name, event.event_type()));
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = AuthEventBus::new();
        let (log, make) = recorder();

        bus.subscribe_all(make("first"));
        bus.subscribe(AuthEventType::Logout, make("second"));
        bus.subscribe_all(make("third"));

        bus.publish(AuthEvent::Logout);

        assert_eq!(
            *log.lock(),
            vec!["first:LOGOUT", "second:LOGOUT", "third:LOGOUT"]
        );
    }

    #[test]
    fn test_handlers_only_receive_their_event_type() {
        let bus = AuthEventBus::new();
        let (log, make) = recorder();

        bus.subscribe(AuthEventType::TokenRefreshed, make("refresh"));
        bus.publish(AuthEvent::Logout);
        bus.publish(AuthEvent::TokenRefreshed {
            tokens: TokenPair::new("a", "r"),
        });

        assert_eq!(*log.lock(), vec!["refresh:TOKEN_REFRESHED"]);
    }

    #[test]
    fn test_failing_and_panicking_handlers_do_not_stop_delivery() {
        let bus = AuthEventBus::new();
        let (log, make) = recorder();

        bus.subscribe_all(|_| Err("mirror unavailable".into()));
        bus.subscribe_all(|_| panic!("handler bug"));
        bus.subscribe_all(make("survivor"));

        bus.publish(AuthEvent::AuthError {
            reason: "refresh token expired".to_string(),
        });

        assert_eq!(*log.lock(), vec!["survivor:AUTH_ERROR"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = AuthEventBus::new();
        let (log, make) = recorder();

        let handle = bus.subscribe_all(make("gone"));
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));

        bus.publish(AuthEvent::Logout);
        assert!(log.lock().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself_during_publish() {
        let bus = Arc::new(AuthEventBus::new());
        let calls = Arc::new(Mutex::new(0u32));
        let handle_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let handle = {
            let bus_in_handler = Arc::clone(&bus);
            let calls = Arc::clone(&calls);
            let handle_slot = Arc::clone(&handle_slot);
            bus.subscribe_all(move |_| {
                *calls.lock() += 1;
                if let Some(handle) = *handle_slot.lock() {
                    bus_in_handler.unsubscribe(handle);
                }
                Ok(())
            })
        };
        *handle_slot.lock() = Some(handle);

        bus.publish(AuthEvent::Logout);
        bus.publish(AuthEvent::Logout);

        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_handlers_run_on_publishing_thread() {
        let bus = AuthEventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        bus.subscribe_all(move |_| {
            *sink.lock() = Some(std::thread::current().id());
            Ok(())
        });
        bus.publish(AuthEvent::Logout);

        assert_eq!(*seen.lock(), Some(std::thread::current().id()));
    }

    #[tokio::test]
    async fn test_stream_receives_published_events() {
        let bus = AuthEventBus::new();
        let mut rx = bus.stream();

        bus.publish(AuthEvent::StateChanged {
            from: AuthState::Authenticated,
            to: AuthState::Refreshing,
        });
        bus.publish(AuthEvent::Logout);

        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::StateChanged {
                from: AuthState::Authenticated,
                to: AuthState::Refreshing,
            }
        );
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::Logout);
    }

    #[test]
    fn test_publish_without_any_subscriber_is_fine() {
        AuthEventBus::new().publish(AuthEvent::Logout);
    }
}
