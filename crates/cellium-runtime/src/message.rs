//! # Message Handler
//!
//! Glue between bridge events and the router. The native side publishes
//! `Alert`, `JsQuery` and `ButtonClick` events; this handler turns the ones
//! that carry a `cell:command:args` string into router dispatches.
//!
//! ```text
//! JsQuery "calc:eval:1+1"  ──→ router ──→ "2" (returned to the publisher)
//! JsQuery "syscmd:close"   ──→ SystemCommand + FadeOut, returns "OK"
//! Alert   "greeter:greet:" ──→ router, result logged
//! ButtonClick "ok-btn"     ──→ registered callback
//! ```

use crate::router::CommandRouter;
use cellium_bus::{
    ButtonClickEvent, Event, EventBus, EventType, HandlerRef, HandlerResult, SystemCommandEvent,
    DEFAULT_FADE_OUT_MS,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Prefix marking a JS query as a window-level command.
pub const SYSCMD_PREFIX: &str = "syscmd:";

/// Reply sent back for accepted system commands.
pub const SYSCMD_ACK: &str = "OK";

/// Callback invoked for clicks on one button id.
pub type ButtonCallback = Arc<dyn Fn(&ButtonClickEvent) -> anyhow::Result<()> + Send + Sync>;

type CallbackMap = Arc<RwLock<HashMap<String, ButtonCallback>>>;

pub struct MessageHandler {
    bus: Arc<EventBus>,
    router: CommandRouter,
    callbacks: CallbackMap,
    subscriptions: Mutex<Vec<(EventType, HandlerRef)>>,
}

impl MessageHandler {
    /// Subscribe to `Alert`, `JsQuery` and `ButtonClick` on `bus`.
    pub fn attach(bus: Arc<EventBus>, router: CommandRouter) -> Self {
        let callbacks: CallbackMap = Arc::default();
        let mut subscriptions = Vec::with_capacity(3);

        let alert_router = router.clone();
        subscriptions.push((
            EventType::Alert,
            bus.subscribe_fn(EventType::Alert, "message.alert", move |event| {
                on_alert(&alert_router, event)
            }),
        ));

        let query_router = router.clone();
        let weak_bus = Arc::downgrade(&bus);
        subscriptions.push((
            EventType::JsQuery,
            bus.subscribe_fn(EventType::JsQuery, "message.js_query", move |event| {
                on_js_query(&weak_bus, &query_router, event)
            }),
        ));

        let click_callbacks = Arc::clone(&callbacks);
        subscriptions.push((
            EventType::ButtonClick,
            bus.subscribe_fn(EventType::ButtonClick, "message.button_click", move |event| {
                on_button_click(&click_callbacks, event)
            }),
        ));

        info!("[Message] Handler attached to event bus");
        Self {
            bus,
            router,
            callbacks,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    #[must_use]
    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Dispatch a command string directly, bypassing the bus.
    pub fn handle_command(&self, message: &str) -> Value {
        self.router.dispatch(message)
    }

    /// Run `callback` for every click on `button_id`. A later registration
    /// for the same id replaces the earlier one.
    pub fn register_button_callback<F>(&self, button_id: impl Into<String>, callback: F)
    where
        F: Fn(&ButtonClickEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let button_id = button_id.into();
        debug!(button = %button_id, "[Message] Button callback registered");
        self.callbacks.write().insert(button_id, Arc::new(callback));
    }

    pub fn unregister_button_callback(&self, button_id: &str) -> bool {
        self.callbacks.write().remove(button_id).is_some()
    }

    /// Remove all bus subscriptions. Idempotent.
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        if subscriptions.is_empty() {
            return;
        }
        for (event_type, handler) in &subscriptions {
            self.bus.unsubscribe(*event_type, handler);
        }
        info!("[Message] Handler detached from event bus");
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler")
            .field("router", &self.router)
            .field("buttons", &self.callbacks.read().len())
            .field("attached", &!self.subscriptions.lock().is_empty())
            .finish()
    }
}

/// Messages of the form `a:b...` are command strings; anything else is
/// ordinary alert text.
fn is_command(message: &str) -> bool {
    message.contains(':')
}

fn on_alert(router: &CommandRouter, event: &Event) -> HandlerResult {
    let Some(alert) = event.as_alert() else {
        return Ok(None);
    };
    if !is_command(&alert.message) {
        debug!("[Message] Plain alert ignored");
        return Ok(None);
    }
    let result = router.dispatch_to_string(&alert.message);
    info!(command = %alert.message, result = %result, "[Message] Alert command handled");
    Ok(None)
}

fn on_js_query(bus: &Weak<EventBus>, router: &CommandRouter, event: &Event) -> HandlerResult {
    let Some(query) = event.as_js_query() else {
        return Ok(None);
    };

    if let Some(command) = query.message.strip_prefix(SYSCMD_PREFIX) {
        let Some(bus) = bus.upgrade() else {
            warn!("[Message] System command after bus shutdown");
            return Ok(None);
        };
        info!(command, query_id = query.query_id, "[Message] System command");
        bus.publish(Event::new(SystemCommandEvent {
            command: command.to_string(),
            webview: query.webview,
            query_id: Some(query.query_id),
            custom_msg: Some(query.custom_msg),
        }));
        if command == "close" {
            bus.publish(Event::fade_out(DEFAULT_FADE_OUT_MS));
        }
        return Ok(Some(Value::String(SYSCMD_ACK.to_string())));
    }

    if is_command(&query.message) {
        return Ok(Some(router.dispatch(&query.message)));
    }

    debug!(query_id = query.query_id, "[Message] Query without command ignored");
    Ok(None)
}

fn on_button_click(callbacks: &CallbackMap, event: &Event) -> HandlerResult {
    let Some(click) = event.as_button_click() else {
        return Ok(None);
    };
    let callback = callbacks.read().get(&click.button_id).cloned();
    match callback {
        Some(callback) => {
            debug!(button = %click.button_id, "[Message] Button clicked");
            callback(click)?;
        }
        None => debug!(button = %click.button_id, "[Message] Click on unregistered button"),
    }
    Ok(None)
}
