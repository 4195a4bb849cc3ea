//! Frame transport abstraction.
//!
//! The protocol engine only ever talks to a [`FrameTransport`] obtained from a
//! [`Connector`]. The production implementation lives in [`websocket`]; tests
//! swap in an in-memory double.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

#[cfg(test)]
pub(crate) mod mock;
pub mod websocket;

pub use websocket::{WebSocketConnector, WebSocketTransport};

/// Maximum sleep duration that won't overflow `Instant + Duration`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// A single data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Uncompressed JSON.
    Text(String),
    /// zlib compressed JSON.
    Binary(Bytes),
}

/// A bidirectional, message based socket.
///
/// Implementations must serialize concurrent `send_frame` calls themselves;
/// the engine sends from the heartbeat loop, the read loop and `subscribe`
/// at the same time.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Wait for the next data frame.
    ///
    /// A zero `read_timeout` waits forever. Errors:
    /// - [`LeapError::ServerClosed`](crate::LeapError::ServerClosed) when the
    ///   peer sent a close frame,
    /// - [`LeapError::ConnectionClosed`](crate::LeapError::ConnectionClosed)
    ///   after a local [`close`](FrameTransport::close),
    /// - [`LeapError::TimeoutError`](crate::LeapError::TimeoutError) when the
    ///   deadline passes,
    /// - [`LeapError::WebSocketError`](crate::LeapError::WebSocketError) for
    ///   anything else.
    async fn next_frame(&self, read_timeout: Duration) -> Result<Frame>;

    /// Write one frame.
    async fn send_frame(&self, frame: Frame) -> Result<()>;

    /// Close the socket. Pending and later reads fail with `ConnectionClosed`.
    async fn close(&self) -> Result<()>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn FrameTransport>>;
}

/// Deadline for a read that may be unbounded.
pub(crate) fn read_deadline(read_timeout: Duration) -> tokio::time::Instant {
    let wait = if read_timeout.is_zero() { FAR_FUTURE } else { read_timeout };
    tokio::time::Instant::now() + wait
}
