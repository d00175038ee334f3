// src/channel/events.rs

//! Push-channel wire format and alias normalization.
//!
//! The backend emits the same semantic events under several names and field
//! spellings. Everything is mapped to one [`ChannelEvent`] here, before any
//! handler looks at it; unknown or malformed frames become `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::LifecycleState;
use crate::models::exam_window::{Inscription, count_active};

pub const STATUS_EVENTS: &[&str] = &["su", "statusUpdate", "status_update"];
pub const ENROLLMENT_EVENTS: &[&str] = &[
    "inscriptions_changed",
    "inscription_update",
    "inscriptions_update",
    "iu",
    "enrollment_update",
    "inscripciones_actualizadas",
];
pub const TOGGLE_EVENT: &str = "window_toggle";
pub const PING_EVENT: &str = "latency_ping";
pub const PONG_EVENT: &str = "pong";
pub const JOIN_EVENT: &str = "join_professor_room";

/// 9999-12-31T23:59:59.999Z; anything later is not a real emission time.
const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

const WINDOW_ID_KEYS: &[&str] = &["windowId", "examWindowId", "ventanaId", "i", "id"];
const COUNT_KEYS: &[&str] = &["inscritosCount", "enrolledCount", "count", "n"];
const DELTA_KEYS: &[&str] = &["delta", "d"];
const LIST_KEYS: &[&str] = &["inscripciones", "enrollments"];
const STATE_KEYS: &[&str] = &["estado", "lifecycleState", "state", "newState", "s"];
const ACTIVE_KEYS: &[&str] = &["a", "activa", "active", "isActive"];

/// One text frame on the push channel: `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub window_id: i64,
    pub state: LifecycleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentCount {
    /// Server-computed total (explicit counter or counted list).
    Absolute(u32),
    /// Relative change to apply on top of the cached value.
    Delta(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StatusChange {
        /// Server emit time, milliseconds since the Unix epoch.
        emitted_at_ms: Option<i64>,
        changes: Vec<StateChange>,
    },
    EnrollmentChange {
        window_id: i64,
        count: Option<EnrollmentCount>,
        state: Option<LifecycleState>,
    },
    WindowToggle {
        window_id: i64,
        active: bool,
    },
    /// Echoed back verbatim as `pong`.
    LatencyPing(Value),
}

/// Maps a named event and its payload to a canonical [`ChannelEvent`].
pub fn normalize(event: &str, data: &Value) -> Option<ChannelEvent> {
    if STATUS_EVENTS.contains(&event) {
        normalize_status(data)
    } else if ENROLLMENT_EVENTS.contains(&event) {
        normalize_enrollment(data)
    } else if event == TOGGLE_EVENT {
        normalize_toggle(data)
    } else if event == PING_EVENT {
        Some(ChannelEvent::LatencyPing(data.clone()))
    } else {
        None
    }
}

fn normalize_status(data: &Value) -> Option<ChannelEvent> {
    let body = unwrap_envelope(data, &["c", "changes"]);

    if let Some(kind) = first_str(body, &["t", "type"]) {
        if !matches!(kind, "sc" | "statusChange" | "status_change") {
            tracing::debug!("Ignoring status event of type {}", kind);
            return None;
        }
    }

    let emitted_at_ms = first(body, &["ts", "timestamp"]).and_then(as_millis);
    let raw_changes = first(body, &["c", "changes"])?.as_array()?;

    let changes: Vec<StateChange> = raw_changes
        .iter()
        .filter_map(|item| {
            let window_id = first(item, WINDOW_ID_KEYS).and_then(as_id);
            let state = first_str(item, STATE_KEYS).and_then(LifecycleState::parse);
            match (window_id, state) {
                (Some(window_id), Some(state)) => Some(StateChange { window_id, state }),
                _ => {
                    tracing::debug!("Dropping malformed status change: {}", item);
                    None
                }
            }
        })
        .collect();

    if changes.is_empty() {
        return None;
    }

    Some(ChannelEvent::StatusChange {
        emitted_at_ms,
        changes,
    })
}

fn normalize_enrollment(data: &Value) -> Option<ChannelEvent> {
    let body = unwrap_envelope(data, WINDOW_ID_KEYS);
    let window_id = first(body, WINDOW_ID_KEYS).and_then(as_id)?;

    let count = if let Some(n) = first(body, COUNT_KEYS).and_then(Value::as_u64) {
        Some(EnrollmentCount::Absolute(u32::try_from(n).unwrap_or(u32::MAX)))
    } else if let Some(list) = first(body, LIST_KEYS).and_then(Value::as_array) {
        let records: Vec<Inscription> = list
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        Some(EnrollmentCount::Absolute(count_active(&records)))
    } else {
        first(body, DELTA_KEYS)
            .and_then(Value::as_i64)
            .map(EnrollmentCount::Delta)
    };

    let state = first_str(body, STATE_KEYS).and_then(LifecycleState::parse);

    Some(ChannelEvent::EnrollmentChange {
        window_id,
        count,
        state,
    })
}

fn normalize_toggle(data: &Value) -> Option<ChannelEvent> {
    let body = unwrap_envelope(data, WINDOW_ID_KEYS);
    let window_id = first(body, WINDOW_ID_KEYS).and_then(as_id)?;
    let active = first(body, ACTIVE_KEYS).and_then(Value::as_bool)?;
    Some(ChannelEvent::WindowToggle { window_id, active })
}

/// Some emitters wrap the payload in `{ "data": { ... } }`.
fn unwrap_envelope<'a>(data: &'a Value, expected: &[&str]) -> &'a Value {
    match data.get("data") {
        Some(inner) if inner.is_object() && first(data, expected).is_none() => inner,
        _ => data,
    }
}

fn first<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find(|v| !v.is_null())
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    first(value, keys).and_then(Value::as_str)
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_millis(value: &Value) -> Option<i64> {
    let ms = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (1..=MAX_TIMESTAMP_MS).contains(&ms).then_some(ms)
}
