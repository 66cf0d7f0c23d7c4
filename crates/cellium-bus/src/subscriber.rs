//! # Event Handlers
//!
//! Defines the subscribing side of the bus: handler references that can be
//! registered for an event type.

use crate::events::Event;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a handler hands back to the publisher.
///
/// `Ok(Some(value))` is a reply, `Ok(None)` means "handled, nothing to say".
pub type HandlerResult = anyhow::Result<Option<Value>>;

type SyncFn = dyn Fn(&Event) -> HandlerResult + Send + Sync;
type AsyncFn = dyn Fn(Event) -> BoxFuture<'static, HandlerResult> + Send + Sync;

pub(crate) enum HandlerKind {
    Sync(Box<SyncFn>),
    Async(Box<AsyncFn>),
}

/// A named event handler.
///
/// Handlers are compared by identity (`Arc::ptr_eq`), so keep the
/// [`HandlerRef`] returned at construction to unsubscribe later.
pub struct EventHandler {
    name: String,
    pub(crate) kind: HandlerKind,
}

/// Shared reference to a handler, as stored by the bus.
pub type HandlerRef = Arc<EventHandler>;

impl EventHandler {
    /// Create a handler that runs on the publishing thread.
    pub fn sync<F>(name: impl Into<String>, handler: F) -> HandlerRef
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            kind: HandlerKind::Sync(Box::new(handler)),
        })
    }

    /// Create a handler that is scheduled onto the async runtime.
    pub fn asynchronous<F, Fut>(name: impl Into<String>, handler: F) -> HandlerRef
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            kind: HandlerKind::Async(Box::new(move |event| handler(event).boxed())),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.kind, HandlerKind::Async(_))
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}
