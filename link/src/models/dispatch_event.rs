use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Routing details shared by every dispatch event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEventDetails {
    /// Channel the event belongs to. Blank for direct messages.
    #[serde(rename = "c", default, deserialize_with = "crate::models::de::null_as_default")]
    pub channel_id: String,

    /// Whether the event was delivered by unicast.
    #[serde(rename = "u", default, deserialize_with = "crate::models::de::null_as_default")]
    pub unicast: bool,
}

/// Body of an opcode 0 frame, before it is decoded into a typed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
    /// Routing details.
    #[serde(flatten)]
    pub details: DispatchEventDetails,

    /// Discriminator selecting the typed event (`INIT`, `MESSAGE`, ...).
    #[serde(rename = "e")]
    pub event_code: String,

    /// Event specific body.
    #[serde(rename = "d", default, skip_serializing_if = "JsonValue::is_null")]
    pub data: JsonValue,
}

impl DispatchEvent {
    /// A client originated dispatch with no body, e.g. `SUBSCRIBE`.
    pub fn request(channel_id: &str, event_code: &str) -> Self {
        Self {
            details: DispatchEventDetails {
                channel_id: channel_id.to_string(),
                unicast: false,
            },
            event_code: event_code.to_string(),
            data: JsonValue::Null,
        }
    }
}
