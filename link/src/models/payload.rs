use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::dispatch_event::DispatchEvent;

/// Protocol opcodes carried in the `op` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Server push event (or client subscribe request).
    Dispatch = 0,
    /// First frame sent by the server, carries the heartbeat interval.
    Hello = 1,
    /// Client authentication frame.
    Identify = 2,
    /// Keepalive, sent by either side.
    Heartbeat = 3,
    /// Server acknowledgement of a heartbeat.
    HeartbeatAck = 4,
}

impl Opcode {
    /// Map a raw opcode to a known one. Unknown opcodes return `None`.
    pub fn from_raw(op: i64) -> Option<Self> {
        match op {
            0 => Some(Opcode::Dispatch),
            1 => Some(Opcode::Hello),
            2 => Some(Opcode::Identify),
            3 => Some(Opcode::Heartbeat),
            4 => Some(Opcode::HeartbeatAck),
            _ => None,
        }
    }

    /// Raw wire value.
    pub fn as_raw(self) -> i64 {
        self as i64
    }
}

/// Frame envelope: `{"op": <int>, "d": <json>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Raw opcode.
    pub op: i64,

    /// Opcode specific body.
    #[serde(default)]
    pub d: JsonValue,
}

impl Payload {
    /// Build a payload for a known opcode.
    pub fn new(op: Opcode, d: JsonValue) -> Self {
        Self { op: op.as_raw(), d }
    }

    /// The decoded opcode, `None` when the server sent something unknown.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_raw(self.op)
    }

    /// Identify frame sent right after the hello.
    pub fn identify(token: &str, project_id: &str) -> serde_json::Result<Self> {
        let body = Identify {
            token: token.to_string(),
            project_id: project_id.to_string(),
        };
        Ok(Self::new(Opcode::Identify, serde_json::to_value(body)?))
    }

    /// Client heartbeat. The body is an arbitrary echo payload.
    pub fn heartbeat() -> Self {
        Self::new(Opcode::Heartbeat, serde_json::json!({ "tag": "" }))
    }

    /// Subscribe request: a dispatch frame with event code `SUBSCRIBE`.
    pub fn subscribe(channel_id: &str) -> serde_json::Result<Self> {
        let body = DispatchEvent::request(channel_id, "SUBSCRIBE");
        Ok(Self::new(Opcode::Dispatch, serde_json::to_value(body)?))
    }
}

/// Body of the hello frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Interval in milliseconds at which the client must send heartbeats.
    pub heartbeat_interval: u64,
}

/// Body of the identify frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    /// Leap token.
    pub token: String,

    /// Project the token belongs to.
    pub project_id: String,
}
