//! Typed Leap events.
//!
//! Every opcode 0 frame carries a [`DispatchEvent`] whose `e` field selects
//! one of the event types below. Decoding goes through a static table keyed
//! by that code; unknown codes decode to `None` and are ignored by the
//! connection.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::channel_info::ChannelInfo;
use super::dispatch_event::{DispatchEvent, DispatchEventDetails};
use super::pipe_room::PipeRoom;

/// What the Leap token is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Connected with a project token.
    #[default]
    Project,
    /// Connected with a Leap token.
    Token,
    /// A scope this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Sent once per connection, confirms the identify.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// Server side connection id.
    #[serde(rename = "cid", default, deserialize_with = "crate::models::de::null_as_default")]
    pub connection_id: String,

    /// Token metadata, if any.
    #[serde(default)]
    pub metadata: Option<HashMap<String, JsonValue>>,

    /// Connection scope.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub scope: Scope,

    /// Channels the connection is already subscribed to.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub channels: Vec<ChannelInfo>,
}

/// A channel became available (subscribe succeeded).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AvailableEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// The channel.
    pub channel: ChannelInfo,
}

/// A channel became unavailable (subscribe rejected or channel removed).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnavailableEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// Whether the channel went away gracefully.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub graceful: bool,

    /// Server error code.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub error_code: String,
}

/// A user message published to a channel or sent directly to this
/// connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// User supplied event name.
    #[serde(rename = "e", default, deserialize_with = "crate::models::de::null_as_default")]
    pub event_name: String,

    /// User supplied data.
    #[serde(rename = "d", default)]
    pub data: JsonValue,
}

impl MessageEvent {
    /// Channel the message was published to. Empty for direct messages.
    pub fn channel_id(&self) -> &str {
        &self.details.channel_id
    }

    /// Direct messages carry no channel id.
    pub fn is_direct_message(&self) -> bool {
        self.details.channel_id.is_empty()
    }
}

/// The state map of a channel changed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelStateUpdateEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// New channel state.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub state: HashMap<String, JsonValue>,
}

/// A Pipe room became available to this connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipeRoomAvailableEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// The room.
    pub room: PipeRoom,
}

/// A Pipe room changed (went live, went offline, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipeRoomUpdateEvent {
    #[serde(skip)]
    pub details: DispatchEventDetails,

    /// The room after the change.
    pub room: PipeRoom,
}

trait WithDetails: DeserializeOwned {
    fn set_details(&mut self, details: DispatchEventDetails);
}

macro_rules! impl_with_details {
    ($($ty:ty),* $(,)?) => {
        $(impl WithDetails for $ty {
            fn set_details(&mut self, details: DispatchEventDetails) {
                self.details = details;
            }
        })*
    };
}

impl_with_details!(
    InitEvent,
    AvailableEvent,
    UnavailableEvent,
    MessageEvent,
    ChannelStateUpdateEvent,
    PipeRoomAvailableEvent,
    PipeRoomUpdateEvent,
);

/// Decode the event body and attach the routing details from the envelope.
fn typed<T: WithDetails>(event: DispatchEvent) -> serde_json::Result<T> {
    // Some events are sent without a body.
    let data = match event.data {
        JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
        data => data,
    };
    let mut decoded: T = serde_json::from_value(data)?;
    decoded.set_details(event.details);
    Ok(decoded)
}

type Decoder = fn(DispatchEvent) -> serde_json::Result<LeapEvent>;

fn decode_init(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::Init)
}

fn decode_available(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::Available)
}

fn decode_unavailable(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::Unavailable)
}

fn decode_message(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::Message)
}

fn decode_state_update(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::StateUpdate)
}

fn decode_pipe_room_available(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::PipeRoomAvailable)
}

fn decode_pipe_room_update(event: DispatchEvent) -> serde_json::Result<LeapEvent> {
    typed(event).map(LeapEvent::PipeRoomUpdate)
}

// MESSAGE and DIRECT_MESSAGE share one body.
static DECODERS: &[(&str, Decoder)] = &[
    ("INIT", decode_init),
    ("AVAILABLE", decode_available),
    ("UNAVAILABLE", decode_unavailable),
    ("MESSAGE", decode_message),
    ("DIRECT_MESSAGE", decode_message),
    ("STATE_UPDATE", decode_state_update),
    ("PIPE_ROOM_AVAILABLE", decode_pipe_room_available),
    ("PIPE_ROOM_UPDATE", decode_pipe_room_update),
];

/// Any event the server can dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum LeapEvent {
    Init(InitEvent),
    Available(AvailableEvent),
    Unavailable(UnavailableEvent),
    Message(MessageEvent),
    StateUpdate(ChannelStateUpdateEvent),
    PipeRoomAvailable(PipeRoomAvailableEvent),
    PipeRoomUpdate(PipeRoomUpdateEvent),
}

impl LeapEvent {
    /// Whether `code` names an event this client can decode.
    pub fn is_known_code(code: &str) -> bool {
        DECODERS.iter().any(|(known, _)| *known == code)
    }

    /// Decode a dispatch event into its typed form.
    ///
    /// Returns `None` for an unknown event code and `Some(Err(_))` when the
    /// code is known but the body does not match.
    pub fn decode(event: DispatchEvent) -> Option<serde_json::Result<LeapEvent>> {
        let decoder = DECODERS
            .iter()
            .find(|(code, _)| *code == event.event_code)
            .map(|(_, decoder)| *decoder)?;
        Some(decoder(event))
    }
}

/// Events delivered on [`LeapClient::channel_event_channel`](crate::LeapClient::channel_event_channel).
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// AVAILABLE that no `subscribe` call was waiting for.
    Available(AvailableEvent),
    /// UNAVAILABLE that no `subscribe` call was waiting for.
    Unavailable(UnavailableEvent),
    StateUpdate(ChannelStateUpdateEvent),
    PipeRoomAvailable(PipeRoomAvailableEvent),
    PipeRoomUpdate(PipeRoomUpdateEvent),
}

impl ChannelEvent {
    /// Channel the event belongs to.
    pub fn channel_id(&self) -> &str {
        match self {
            ChannelEvent::Available(e) => &e.channel.id,
            ChannelEvent::Unavailable(e) => &e.details.channel_id,
            ChannelEvent::StateUpdate(e) => &e.details.channel_id,
            ChannelEvent::PipeRoomAvailable(e) => &e.details.channel_id,
            ChannelEvent::PipeRoomUpdate(e) => &e.details.channel_id,
        }
    }
}
