//! Event types carried by the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic per-bus event identifier. Also the arrival order.
pub type EventId = u64;

/// Urgency of an event. Ordered so that `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Whether events of this priority are queued for the scheduler.
    pub fn is_urgent(&self) -> bool {
        *self >= Priority::High
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed payloads for the event types producers are known to publish.
///
/// Anything else arrives as [`EventPayload::Unknown`] with its raw JSON intact,
/// so newer producers keep working against an older core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    ErrorOnScreen { text: String },
    BatteryLow { percent: f32 },
    CpuHigh { percent: f32 },
    RamHigh { percent: f32 },
    StatsUpdate {
        cpu: f32,
        ram: f32,
        #[serde(default)]
        battery: Option<f32>,
    },
    InternetLost,
    InternetRestored,
    TextCopied { text: String },
    VoiceCommand { text: String },
    DeviceConnected { name: String },
    UserSeen { faces: u32 },
    MediaPlaying { title: String },
    UserActive,
    UserIdle { seconds: u64 },
    FileCreated { path: String },
    Unknown {
        type_name: String,
        payload: serde_json::Value,
    },
}

impl EventPayload {
    /// The wire name of this event type, e.g. `"BATTERY_LOW"`.
    pub fn type_name(&self) -> &str {
        match self {
            Self::ErrorOnScreen { .. } => "ERROR_ON_SCREEN",
            Self::BatteryLow { .. } => "BATTERY_LOW",
            Self::CpuHigh { .. } => "CPU_HIGH",
            Self::RamHigh { .. } => "RAM_HIGH",
            Self::StatsUpdate { .. } => "STATS_UPDATE",
            Self::InternetLost => "INTERNET_LOST",
            Self::InternetRestored => "INTERNET_RESTORED",
            Self::TextCopied { .. } => "TEXT_COPIED",
            Self::VoiceCommand { .. } => "VOICE_COMMAND",
            Self::DeviceConnected { .. } => "DEVICE_CONNECTED",
            Self::UserSeen { .. } => "USER_SEEN",
            Self::MediaPlaying { .. } => "MEDIA_PLAYING",
            Self::UserActive => "USER_ACTIVE",
            Self::UserIdle { .. } => "USER_IDLE",
            Self::FileCreated { .. } => "FILE_CREATED",
            Self::Unknown { type_name, .. } => type_name,
        }
    }

    /// Parse a producer's `(type, map)` pair into a typed payload.
    ///
    /// Falls back to `Unknown` when the type is not recognised or the map is
    /// missing a required field.
    pub fn parse(type_name: &str, payload: serde_json::Value) -> Self {
        let mut tagged = match &payload {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            _ => return Self::unknown(type_name, payload),
        };
        tagged.insert("type".into(), serde_json::Value::String(type_name.into()));

        match serde_json::from_value::<EventPayload>(serde_json::Value::Object(tagged)) {
            Ok(Self::Unknown { .. }) | Err(_) => Self::unknown(type_name, payload),
            Ok(parsed) => parsed,
        }
    }

    fn unknown(type_name: &str, payload: serde_json::Value) -> Self {
        Self::Unknown {
            type_name: type_name.to_string(),
            payload,
        }
    }
}

/// A published event. Immutable once it leaves `EventBus::publish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub channel: String,
    pub payload: EventPayload,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    /// Set on the copies handed out by `drain_high_priority`.
    pub consumed: bool,
}

impl Event {
    pub fn event_type(&self) -> &str {
        self.payload.type_name()
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.timestamp.format("%H:%M:%S"),
            self.event_type(),
            self.priority
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::High.is_urgent());
        assert!(Priority::Critical.is_urgent());
        assert!(!Priority::Normal.is_urgent());
    }

    #[test]
    fn parse_known_type() {
        let payload = EventPayload::parse("BATTERY_LOW", json!({ "percent": 12.0 }));
        assert_eq!(payload, EventPayload::BatteryLow { percent: 12.0 });
        assert_eq!(payload.type_name(), "BATTERY_LOW");
    }

    #[test]
    fn parse_unit_type_ignores_extra_fields() {
        let payload = EventPayload::parse("USER_ACTIVE", json!({}));
        assert_eq!(payload, EventPayload::UserActive);
        let payload = EventPayload::parse("INTERNET_LOST", json!({ "connected": false }));
        assert_eq!(payload, EventPayload::InternetLost);
    }

    #[test]
    fn parse_falls_back_to_unknown() {
        let payload = EventPayload::parse("DYNAMIC_EVENT", json!({ "msg": "hi" }));
        assert_eq!(payload.type_name(), "DYNAMIC_EVENT");
        assert!(matches!(payload, EventPayload::Unknown { .. }));

        // Known type, missing field.
        let payload = EventPayload::parse("DEVICE_CONNECTED", json!({ "vendor": "x" }));
        match payload {
            EventPayload::Unknown { type_name, payload } => {
                assert_eq!(type_name, "DEVICE_CONNECTED");
                assert_eq!(payload["vendor"], "x");
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn parse_non_object_is_unknown() {
        let payload = EventPayload::parse("ERROR_ON_SCREEN", json!("just text"));
        assert!(matches!(payload, EventPayload::Unknown { .. }));
    }
}
