//! # Event Bus
//!
//! In-memory publish/subscribe registry keyed by [`EventType`].
//!
//! Delivery is best-effort fan-out: handlers run in subscription order and a
//! failing handler never stops delivery to the ones after it.

use crate::events::{Event, EventType};
use crate::subscriber::{EventHandler, HandlerKind, HandlerRef, HandlerResult};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Process-wide event bus.
///
/// Shared as `Arc<EventBus>`; all methods take `&self`.
#[derive(Default)]
pub struct EventBus {
    /// Ordered handler lists per event type.
    subscribers: RwLock<HashMap<EventType, Vec<HandlerRef>>>,

    /// Total events published.
    events_published: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the subscriber list of `event_type`.
    ///
    /// Subscribing the same handler twice delivers it twice.
    pub fn subscribe(&self, event_type: EventType, handler: HandlerRef) {
        debug!(event_type = %event_type, handler = handler.name(), "Handler subscribed");
        self.subscribers
            .write()
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Convenience for subscribing a synchronous closure.
    ///
    /// Returns the handler so it can be unsubscribed later.
    pub fn subscribe_fn<F>(&self, event_type: EventType, name: &str, handler: F) -> HandlerRef
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let handler = EventHandler::sync(name, handler);
        self.subscribe(event_type, Arc::clone(&handler));
        handler
    }

    /// Remove the first subscription of `handler` for `event_type`.
    ///
    /// Returns `false` (and does nothing) if it was not subscribed.
    pub fn unsubscribe(&self, event_type: EventType, handler: &HandlerRef) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(handlers) = subscribers.get_mut(&event_type) else {
            return false;
        };
        let Some(index) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };

        handlers.remove(index);
        if handlers.is_empty() {
            subscribers.remove(&event_type);
        }
        debug!(event_type = %event_type, handler = handler.name(), "Handler unsubscribed");
        true
    }

    /// Publish an event to every subscriber of its type.
    ///
    /// Synchronous handlers run on the calling thread. Async handlers are
    /// spawned onto the current tokio runtime when there is one, otherwise
    /// they are driven to completion before this returns.
    ///
    /// # Returns
    ///
    /// The value of the last synchronous handler that returned `Ok`, not an
    /// aggregate. `None` when nobody is subscribed.
    pub fn publish(&self, event: Event) -> Option<Value> {
        let event_type = event.event_type();
        let handlers = self.snapshot(event_type);
        if handlers.is_empty() {
            debug!(event_type = %event_type, "Event dropped (no subscribers)");
            return None;
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);
        debug!(event_type = %event_type, receivers = handlers.len(), "Event published");

        let mut result = None;
        for handler in &handlers {
            match &handler.kind {
                HandlerKind::Sync(f) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&event)));
                    if let Some(value) = settle(event_type, handler, outcome) {
                        result = value;
                    }
                }
                HandlerKind::Async(f) => schedule(event_type, handler, f(event.clone())),
            }
        }
        result
    }

    /// Build the typed event for `event_type` from raw data and publish it.
    ///
    /// Data that does not fit the payload shape is still delivered, wrapped
    /// as an untyped payload.
    pub fn publish_raw(&self, event_type: EventType, data: Map<String, Value>) -> Option<Value> {
        let event = match Event::from_data(event_type, data.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!(event_type = %event_type, error = %e, "Failed to build typed event, delivering raw data");
                Event::untyped(event_type, data)
            }
        };
        self.publish(event)
    }

    /// Publish and await every handler, async ones included.
    ///
    /// Unlike [`publish`](Self::publish), async handlers also contribute to
    /// the returned value.
    pub async fn publish_async(&self, event: Event) -> Option<Value> {
        let event_type = event.event_type();
        let handlers = self.snapshot(event_type);
        if handlers.is_empty() {
            return None;
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let mut result = None;
        for handler in &handlers {
            let outcome = match &handler.kind {
                HandlerKind::Sync(f) => panic::catch_unwind(AssertUnwindSafe(|| f(&event))),
                HandlerKind::Async(f) => AssertUnwindSafe(f(event.clone())).catch_unwind().await,
            };
            if let Some(value) = settle(event_type, handler, outcome) {
                result = value;
            }
        }
        result
    }

    #[must_use]
    pub fn has_subscribers(&self, event_type: EventType) -> bool {
        self.get_subscribers_count(event_type) > 0
    }

    #[must_use]
    pub fn get_subscribers_count(&self, event_type: EventType) -> usize {
        self.subscribers.read().get(&event_type).map_or(0, Vec::len)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscribers.write().clear();
        info!("All event subscriptions cleared");
    }

    /// Number of events delivered to at least one subscriber. A publish
    /// nobody listens to leaves it untouched.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Copy of the handler list so handlers may (un)subscribe while running.
    fn snapshot(&self, event_type: EventType) -> Vec<HandlerRef> {
        self.subscribers
            .read()
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Log a failed handler; `Some` carries the value of a successful one.
fn settle(
    event_type: EventType,
    handler: &EventHandler,
    outcome: Result<HandlerResult, Box<dyn Any + Send>>,
) -> Option<Option<Value>> {
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!(event_type = %event_type, handler = handler.name(), error = %e, "Event handler failed");
            None
        }
        Err(payload) => {
            error!(
                event_type = %event_type,
                handler = handler.name(),
                panic = %panic_message(payload.as_ref()),
                "Event handler panicked"
            );
            None
        }
    }
}

fn schedule(
    event_type: EventType,
    handler: &EventHandler,
    future: futures::future::BoxFuture<'static, HandlerResult>,
) {
    let name = handler.name().to_string();

    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(async move {
            if let Err(e) = future.await {
                error!(event_type = %event_type, handler = %name, error = %e, "Async event handler failed");
            }
        });
        return;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(event_type = %event_type, handler = %name, error = %e, "No runtime available for async handler");
            return;
        }
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(future)));
    settle(event_type, handler, outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_handler(name: &str, counter: Arc<AtomicUsize>) -> HandlerRef {
        EventHandler::sync(name, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
    }

    #[test]
    fn test_publish_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(Event::alert("nobody")), None);
        assert_eq!(bus.events_published(), 0);
        assert!(!bus.has_subscribers(EventType::Alert));

        bus.subscribe_fn(EventType::Alert, "listener", |_| Ok(None));
        bus.publish(Event::alert("someone"));
        bus.publish(Event::calc_result("1", None));
        assert_eq!(bus.events_published(), 1);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe_fn(EventType::Alert, label, move |_| {
                seen.lock().push(label);
                Ok(None)
            });
        }

        bus.publish(Event::alert("go"));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_handler_does_not_stop_delivery() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventType::Alert, counting_handler("a", Arc::clone(&counter)));
        bus.subscribe_fn(EventType::Alert, "broken", |_| Err(anyhow::anyhow!("boom")));
        bus.subscribe_fn(EventType::Alert, "panicky", |_| panic!("handler panic"));
        bus.subscribe(EventType::Alert, counting_handler("b", Arc::clone(&counter)));

        bus.publish(Event::alert("go"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_returns_last_handler_value() {
        let bus = EventBus::new();
        bus.subscribe_fn(EventType::JsQuery, "one", |_| Ok(Some(json!(1))));
        bus.subscribe_fn(EventType::JsQuery, "two", |_| Ok(Some(json!(2))));

        let result = bus.publish(Event::js_query(None, 1, 0, "ping"));
        assert_eq!(result, Some(json!(2)));
    }

    #[test]
    fn test_failed_last_handler_keeps_previous_value() {
        let bus = EventBus::new();
        bus.subscribe_fn(EventType::JsQuery, "answer", |_| Ok(Some(json!("OK"))));
        bus.subscribe_fn(EventType::JsQuery, "broken", |_| Err(anyhow::anyhow!("nope")));

        let result = bus.publish(Event::js_query(None, 1, 0, "ping"));
        assert_eq!(result, Some(json!("OK")));
    }

    #[test]
    fn test_duplicate_subscription_and_unsubscribe() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler("dup", Arc::clone(&counter));

        bus.subscribe(EventType::Alert, Arc::clone(&handler));
        bus.subscribe(EventType::Alert, Arc::clone(&handler));
        assert_eq!(bus.get_subscribers_count(EventType::Alert), 2);

        bus.publish(Event::alert("x"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        assert!(bus.unsubscribe(EventType::Alert, &handler));
        assert_eq!(bus.get_subscribers_count(EventType::Alert), 1);
        assert!(bus.unsubscribe(EventType::Alert, &handler));
        assert!(!bus.unsubscribe(EventType::Alert, &handler));
        assert!(!bus.has_subscribers(EventType::Alert));
    }

    #[test]
    fn test_unsubscribe_unknown_handler_is_noop() {
        let bus = EventBus::new();
        let handler = EventHandler::sync("stranger", |_| Ok(None));
        assert!(!bus.unsubscribe(EventType::Navigation, &handler));
    }

    #[test]
    fn test_clear() {
        let bus = EventBus::new();
        bus.subscribe_fn(EventType::Alert, "a", |_| Ok(None));
        bus.subscribe_fn(EventType::FadeOut, "b", |_| Ok(None));
        bus.clear();
        assert_eq!(bus.get_subscribers_count(EventType::Alert), 0);
        assert_eq!(bus.get_subscribers_count(EventType::FadeOut), 0);
    }

    #[test]
    fn test_handler_may_subscribe_while_running() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = Arc::clone(&bus);
        bus.subscribe_fn(EventType::Alert, "recruiter", move |_| {
            inner_bus.subscribe_fn(EventType::Alert, "recruit", |_| Ok(None));
            Ok(None)
        });

        bus.publish(Event::alert("x"));
        assert_eq!(bus.get_subscribers_count(EventType::Alert), 2);
    }

    #[test]
    fn test_publish_raw_builds_typed_event() {
        let bus = EventBus::new();
        bus.subscribe_fn(EventType::Navigation, "nav", |event| {
            let nav = event.as_navigation().ok_or_else(|| anyhow::anyhow!("untyped"))?;
            Ok(Some(json!(nav.url)))
        });

        let data = json!({"navigation_type": 0, "url": "app://index"});
        let Value::Object(data) = data else { unreachable!() };
        assert_eq!(bus.publish_raw(EventType::Navigation, data), Some(json!("app://index")));
    }

    #[test]
    fn test_publish_raw_falls_back_to_untyped() {
        let bus = EventBus::new();
        bus.subscribe_fn(EventType::Navigation, "nav", |event| Ok(event.get("where")));

        let Value::Object(data) = json!({"where": "nowhere"}) else { unreachable!() };
        assert_eq!(bus.publish_raw(EventType::Navigation, data), Some(json!("nowhere")));
    }

    #[test]
    fn test_async_handler_without_runtime_completes_before_return() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe(
            EventType::FadeOut,
            EventHandler::asynchronous("fade", move |_| {
                let c = Arc::clone(&c);
                async move {
                    tokio::task::yield_now().await;
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(json!("ignored")))
                }
            }),
        );

        // Async handlers never supply the return value of `publish`.
        assert_eq!(bus.publish(Event::fade_out(100)), None);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_handler_with_runtime_is_spawned() {
        let bus = EventBus::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = parking_lot::Mutex::new(Some(tx));
        bus.subscribe(
            EventType::Alert,
            EventHandler::asynchronous("notify", move |event| {
                let tx = tx.lock().take();
                async move {
                    if let Some(tx) = tx {
                        let _ = tx.send(event.as_alert().map(|a| a.message.clone()));
                    }
                    Ok(None)
                }
            }),
        );

        bus.publish(Event::alert("later"));
        let received = tokio::time::timeout(Duration::from_millis(500), rx)
            .await
            .expect("timeout")
            .expect("sender dropped");
        assert_eq!(received.as_deref(), Some("later"));
    }

    #[tokio::test]
    async fn test_publish_async_awaits_async_handlers() {
        let bus = EventBus::new();
        bus.subscribe_fn(EventType::CalcResult, "sync", |_| Ok(Some(json!("sync"))));
        bus.subscribe(
            EventType::CalcResult,
            EventHandler::asynchronous("async", |event| async move {
                Ok(event.as_calc_result().map(|c| json!(c.result.clone())))
            }),
        );

        let result = bus.publish_async(Event::calc_result("10", None)).await;
        assert_eq!(result, Some(json!("10")));
    }
}
