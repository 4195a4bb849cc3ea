use serde::{Deserialize, Serialize};

/// Live state of a Pipe room.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    /// A stream is being ingested.
    Live,
    /// Nothing is streaming.
    #[default]
    Offline,
    /// A state this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// A Pipe streaming room, as pushed by PIPE_ROOM_AVAILABLE and
/// PIPE_ROOM_UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeRoom {
    /// Room id.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub id: String,

    /// Display name.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub name: String,

    /// Creation timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Protocol used to push the stream, e.g. `rtmp`.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub ingest_protocol: String,

    /// Protocols viewers can use, e.g. `hls`, `webrtc`.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub delivery_protocols: Vec<String>,

    /// Token a viewer uses to join the room.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub join_token: String,

    /// Region the ingest endpoint lives in.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub ingest_region: String,

    /// Current room state.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub state: RoomState,
}
