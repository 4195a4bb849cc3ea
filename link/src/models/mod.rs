//! Data models for the Leap client.
//!
//! Wire envelopes, dispatch events and their typed forms, plus the
//! connection state and options exposed to callers.

pub mod channel_info;
pub mod connection_options;
pub mod connection_state;
mod de;
pub mod dispatch_event;
pub mod events;
pub mod payload;
pub mod pipe_room;


pub use channel_info::{ChannelInfo, ChannelType};
pub use connection_options::{ConnectionOptions, DEFAULT_LEAP_URL};
pub use connection_state::{ConnectionState, StateInfo};
pub use dispatch_event::{DispatchEvent, DispatchEventDetails};
pub use events::{
    AvailableEvent, ChannelEvent, ChannelStateUpdateEvent, InitEvent, LeapEvent, MessageEvent,
    PipeRoomAvailableEvent, PipeRoomUpdateEvent, Scope, UnavailableEvent,
};
pub use payload::{Hello, Identify, Opcode, Payload};
pub use pipe_room::{PipeRoom, RoomState};
