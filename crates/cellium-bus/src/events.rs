//! # Events
//!
//! Defines every event type that flows through the bus. The set of event
//! types is closed; each one carries a strongly typed payload.
//!
//! The bridge layer translates native callbacks into these events, cells
//! publish them (e.g. `calc_result`) and subscribe to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default fade-out animation length in milliseconds.
pub const DEFAULT_FADE_OUT_MS: u64 = 300;

/// Errors raised while building events.
#[derive(Debug, Error)]
pub enum BusError {
    /// The event type name is not part of the enumeration.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The raw data does not fit the payload shape of the event type.
    #[error("Malformed {event_type} payload: {source}")]
    MalformedPayload {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
}

/// All event types known to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "navigation")]
    Navigation,
    #[serde(rename = "alert")]
    Alert,
    #[serde(rename = "jsquery")]
    JsQuery,
    #[serde(rename = "fade_out")]
    FadeOut,
    #[serde(rename = "window_resize")]
    WindowResize,
    #[serde(rename = "window_move")]
    WindowMove,
    #[serde(rename = "button_click")]
    ButtonClick,
    #[serde(rename = "calc_result")]
    CalcResult,
    #[serde(rename = "system_command")]
    SystemCommand,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Alert => "alert",
            Self::JsQuery => "jsquery",
            Self::FadeOut => "fade_out",
            Self::WindowResize => "window_resize",
            Self::WindowMove => "window_move",
            Self::ButtonClick => "button_click",
            Self::CalcResult => "calc_result",
            Self::SystemCommand => "system_command",
        }
    }

    /// Get all event types.
    #[must_use]
    pub fn all() -> [EventType; 9] {
        [
            Self::Navigation,
            Self::Alert,
            Self::JsQuery,
            Self::FadeOut,
            Self::WindowResize,
            Self::WindowMove,
            Self::ButtonClick,
            Self::CalcResult,
            Self::SystemCommand,
        ]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BusError::UnknownEventType(s.to_string()))
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// The embedded browser navigated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub navigation_type: i64,
    pub url: String,
}

/// A JavaScript `alert()` reached the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub message: String,
}

/// A JavaScript query expecting a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsQueryEvent {
    /// Opaque native webview handle.
    #[serde(default)]
    pub webview: Option<u64>,
    pub query_id: i64,
    pub custom_msg: i64,
    pub message: String,
}

/// Window fade-out requested (usually right before close).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadeOutEvent {
    #[serde(default = "default_fade_out")]
    pub duration: u64,
}

impl Default for FadeOutEvent {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FADE_OUT_MS,
        }
    }
}

fn default_fade_out() -> u64 {
    DEFAULT_FADE_OUT_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowResizeEvent {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMoveEvent {
    pub x: i32,
    pub y: i32,
}

/// A native or HTML button was clicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonClickEvent {
    pub button_id: String,
    /// Native window handle the button belongs to.
    #[serde(default)]
    pub hwnd: Option<u64>,
    #[serde(default = "default_click_kind")]
    pub kind: String,
}

fn default_click_kind() -> String {
    "click".to_string()
}

/// A calculation finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcResultEvent {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// A window-level command (`minimize`, `maximize`, `close`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemCommandEvent {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webview: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_msg: Option<i64>,
}

/// Typed payload, one variant per event type.
///
/// `Untyped` is only produced when raw data could not be shaped into the
/// typed variant; handlers still receive it so delivery is never lost.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Navigation(NavigationEvent),
    Alert(AlertEvent),
    JsQuery(JsQueryEvent),
    FadeOut(FadeOutEvent),
    WindowResize(WindowResizeEvent),
    WindowMove(WindowMoveEvent),
    ButtonClick(ButtonClickEvent),
    CalcResult(CalcResultEvent),
    SystemCommand(SystemCommandEvent),
    Untyped {
        event_type: EventType,
        data: Map<String, Value>,
    },
}

impl Serialize for EventPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Navigation(e) => e.serialize(serializer),
            Self::Alert(e) => e.serialize(serializer),
            Self::JsQuery(e) => e.serialize(serializer),
            Self::FadeOut(e) => e.serialize(serializer),
            Self::WindowResize(e) => e.serialize(serializer),
            Self::WindowMove(e) => e.serialize(serializer),
            Self::ButtonClick(e) => e.serialize(serializer),
            Self::CalcResult(e) => e.serialize(serializer),
            Self::SystemCommand(e) => e.serialize(serializer),
            Self::Untyped { data, .. } => data.serialize(serializer),
        }
    }
}

impl EventPayload {
    /// Get the event type this payload belongs to.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Navigation(_) => EventType::Navigation,
            Self::Alert(_) => EventType::Alert,
            Self::JsQuery(_) => EventType::JsQuery,
            Self::FadeOut(_) => EventType::FadeOut,
            Self::WindowResize(_) => EventType::WindowResize,
            Self::WindowMove(_) => EventType::WindowMove,
            Self::ButtonClick(_) => EventType::ButtonClick,
            Self::CalcResult(_) => EventType::CalcResult,
            Self::SystemCommand(_) => EventType::SystemCommand,
            Self::Untyped { event_type, .. } => *event_type,
        }
    }

    /// Shape a raw data map into the typed payload for `event_type`.
    pub fn from_data(event_type: EventType, data: Map<String, Value>) -> Result<Self, BusError> {
        let value = Value::Object(data);
        let malformed = |source| BusError::MalformedPayload { event_type, source };

        let payload = match event_type {
            EventType::Navigation => Self::Navigation(serde_json::from_value(value).map_err(malformed)?),
            EventType::Alert => Self::Alert(serde_json::from_value(value).map_err(malformed)?),
            EventType::JsQuery => Self::JsQuery(serde_json::from_value(value).map_err(malformed)?),
            EventType::FadeOut => Self::FadeOut(serde_json::from_value(value).map_err(malformed)?),
            EventType::WindowResize => {
                Self::WindowResize(serde_json::from_value(value).map_err(malformed)?)
            }
            EventType::WindowMove => Self::WindowMove(serde_json::from_value(value).map_err(malformed)?),
            EventType::ButtonClick => {
                Self::ButtonClick(serde_json::from_value(value).map_err(malformed)?)
            }
            EventType::CalcResult => Self::CalcResult(serde_json::from_value(value).map_err(malformed)?),
            EventType::SystemCommand => {
                Self::SystemCommand(serde_json::from_value(value).map_err(malformed)?)
            }
        };
        Ok(payload)
    }
}

macro_rules! impl_from_payload {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for EventPayload {
                fn from(payload: $ty) -> Self {
                    Self::$variant(payload)
                }
            }
        )*
    };
}

impl_from_payload!(
    Navigation(NavigationEvent),
    Alert(AlertEvent),
    JsQuery(JsQueryEvent),
    FadeOut(FadeOutEvent),
    WindowResize(WindowResizeEvent),
    WindowMove(WindowMoveEvent),
    ButtonClick(ButtonClickEvent),
    CalcResult(CalcResultEvent),
    SystemCommand(SystemCommandEvent),
);

// =============================================================================
// EVENT
// =============================================================================

/// An immutable, timestamped event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    event_type: EventType,
    timestamp: DateTime<Utc>,
    #[serde(rename = "data")]
    payload: EventPayload,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(payload: impl Into<EventPayload>) -> Self {
        let payload = payload.into();
        Self {
            event_type: payload.event_type(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Build an event from a raw data map.
    pub fn from_data(event_type: EventType, data: Map<String, Value>) -> Result<Self, BusError> {
        EventPayload::from_data(event_type, data).map(Self::new)
    }

    /// Wrap a raw data map without shaping it.
    #[must_use]
    pub fn untyped(event_type: EventType, data: Map<String, Value>) -> Self {
        Self::new(EventPayload::Untyped { event_type, data })
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::new(AlertEvent {
            message: message.into(),
        })
    }

    pub fn navigation(navigation_type: i64, url: impl Into<String>) -> Self {
        Self::new(NavigationEvent {
            navigation_type,
            url: url.into(),
        })
    }

    pub fn js_query(webview: Option<u64>, query_id: i64, custom_msg: i64, message: impl Into<String>) -> Self {
        Self::new(JsQueryEvent {
            webview,
            query_id,
            custom_msg,
            message: message.into(),
        })
    }

    pub fn fade_out(duration: u64) -> Self {
        Self::new(FadeOutEvent { duration })
    }

    pub fn calc_result(result: impl Into<String>, expression: Option<String>) -> Self {
        Self::new(CalcResultEvent {
            result: result.into(),
            expression,
        })
    }

    pub fn system_command(command: impl Into<String>) -> Self {
        Self::new(SystemCommandEvent {
            command: command.into(),
            webview: None,
            query_id: None,
            custom_msg: None,
        })
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Payload as a string-keyed map.
    #[must_use]
    pub fn data(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.payload) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Read a single payload field by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data().remove(key)
    }

    #[must_use]
    pub fn as_alert(&self) -> Option<&AlertEvent> {
        match &self.payload {
            EventPayload::Alert(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_navigation(&self) -> Option<&NavigationEvent> {
        match &self.payload {
            EventPayload::Navigation(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_js_query(&self) -> Option<&JsQueryEvent> {
        match &self.payload {
            EventPayload::JsQuery(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_fade_out(&self) -> Option<&FadeOutEvent> {
        match &self.payload {
            EventPayload::FadeOut(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_button_click(&self) -> Option<&ButtonClickEvent> {
        match &self.payload {
            EventPayload::ButtonClick(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_calc_result(&self) -> Option<&CalcResultEvent> {
        match &self.payload {
            EventPayload::CalcResult(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_system_command(&self) -> Option<&SystemCommandEvent> {
        match &self.payload {
            EventPayload::SystemCommand(e) => Some(e),
            _ => None,
        }
    }
}
