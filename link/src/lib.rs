//! # hop-leap
//!
//! Realtime client for Hop Leap: one authenticated, compressed WebSocket
//! connection to the Leap push service, kept alive and transparently
//! re-established, with events fanned out to any number of independent
//! consumers.
//!
//! ## Features
//!
//! - hello / identify handshake and server paced heartbeats
//! - zlib compressed binary frames
//! - automatic reconnection with a fixed delay; close code 4001 stops it,
//!   4006 moves the connection to the URL the server names
//! - `subscribe` that waits for the channel's AVAILABLE / UNAVAILABLE reply
//! - ordered broadcast streams for messages and channel events, one per call
//!
//! ## Example
//!
//! ```rust,no_run
//! use hop_leap::{ChannelEvent, LeapClient};
//!
//! #[tokio::main]
//! async fn main() -> hop_leap::Result<()> {
//!     let client = LeapClient::new("project_123", "leap_token_abc")?;
//!     client.add_state_listener(|info| println!("leap: {}", info));
//!     client.connect().await?;
//!
//!     let mut channel_events = client.channel_event_channel();
//!     tokio::spawn(async move {
//!         while let Some(event) = channel_events.recv().await {
//!             if let ChannelEvent::StateUpdate(update) = event {
//!                 println!("{} -> {:?}", update.details.channel_id, update.state);
//!             }
//!         }
//!     });
//!
//!     let mut messages = client.message_event_channel();
//!     client.subscribe("chat").await?;
//!     while let Some(message) = messages.recv().await {
//!         println!("{}: {}", message.event_name, message.data);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod compression;
mod connection;
pub mod error;
pub mod event_waiter;
pub mod models;
pub mod queue_dispatcher;
pub mod state_cell;
pub mod timeouts;
pub mod transport;

pub use client::{LeapClient, LeapClientBuilder};
pub use error::{LeapError, Result, CLOSE_CODE_RECONNECT, CLOSE_CODE_UNAUTHORIZED};
pub use event_waiter::{EventWaiter, Waiter};
pub use models::{
    AvailableEvent, ChannelEvent, ChannelInfo, ChannelStateUpdateEvent, ChannelType,
    ConnectionOptions, ConnectionState, DispatchEvent, DispatchEventDetails, InitEvent,
    LeapEvent, MessageEvent, Opcode, Payload, PipeRoom, PipeRoomAvailableEvent,
    PipeRoomUpdateEvent, RoomState, Scope, StateInfo, UnavailableEvent, DEFAULT_LEAP_URL,
};
pub use queue_dispatcher::QueueDispatcher;
pub use state_cell::StateCell;
pub use timeouts::{LeapTimeouts, LeapTimeoutsBuilder};
pub use transport::{Connector, Frame, FrameTransport, WebSocketConnector, WebSocketTransport};
