//! # Cellium Bus - Process-Wide Event Bus
//!
//! Decouples event producers from consumers. Any component may publish, any
//! component may subscribe; the bus knows nothing about cells, the router or
//! the worker pool.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Bridge /   │    publish()       │    Cell /    │
//! │    Cell      │ ──────┐            │   Handler    │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery Rules
//!
//! - Handlers for one event run in subscription order, on the publishing thread
//! - Async handlers are scheduled on the running tokio runtime (if any)
//! - A failing handler is logged and skipped; delivery continues
//! - `publish` returns the last synchronous handler's value, not an aggregate

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{
    AlertEvent, BusError, ButtonClickEvent, CalcResultEvent, Event, EventPayload, EventType,
    FadeOutEvent, JsQueryEvent, NavigationEvent, SystemCommandEvent, WindowMoveEvent,
    WindowResizeEvent, DEFAULT_FADE_OUT_MS,
};
pub use publisher::EventBus;
pub use subscriber::{EventHandler, HandlerRef, HandlerResult};
