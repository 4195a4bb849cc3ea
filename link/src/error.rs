//! Error types for the Leap client.
//!
//! Every error is `Clone`: a single connection failure is handed to every
//! pending [`subscribe`](crate::LeapClient::subscribe) caller and recorded in
//! the connection [`StateInfo`](crate::StateInfo) at the same time.

use thiserror::Error;

/// Close code sent by the server when it deliberately terminates the session
/// (bad token, revoked project). No reconnect is attempted.
pub const CLOSE_CODE_UNAUTHORIZED: u16 = 4001;

/// Close code sent by the server when the client must reconnect elsewhere.
/// The close reason carries the new URL.
pub const CLOSE_CODE_RECONNECT: u16 = 4006;

/// Result type for Leap client operations.
pub type Result<T> = std::result::Result<T, LeapError>;

/// Errors that can occur in the Leap client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeapError {
    /// The transport could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The first frame after connecting was not a hello (opcode 1).
    #[error("expected hello packet after connection")]
    ExpectedHello,

    /// The hello frame could not be understood.
    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    /// The server rejected the session with close code 4001.
    #[error("Authorization failed: {0}")]
    AuthorizationError(String),

    /// The server closed the WebSocket with a close frame.
    #[error("Connection closed by server (code {code}): {reason}")]
    ServerClosed {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },

    /// Network or protocol level WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// A deadline expired (read deadline, init wait, subscribe wait).
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// A payload could not be encoded or decoded as JSON.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A binary frame could not be inflated.
    #[error("Decompression failed: {0}")]
    DecompressionError(String),

    /// The server answered a subscribe request with UNAVAILABLE.
    #[error("Channel {channel_id} unavailable: {error_code}")]
    ChannelUnavailable {
        /// Channel the subscribe targeted.
        channel_id: String,
        /// Server supplied error code.
        error_code: String,
        /// Whether the server marked the unavailability as graceful.
        graceful: bool,
    },

    /// The connection was closed locally, or there is no live connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LeapError {
    /// Whether this failure ends the client for good (no reconnect).
    pub fn is_permanent(&self) -> bool {
        matches!(self, LeapError::AuthorizationError(_))
    }

    /// WebSocket close code carried by this error, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            LeapError::ServerClosed { code, .. } => Some(*code),
            LeapError::AuthorizationError(_) => Some(CLOSE_CODE_UNAUTHORIZED),
            _ => None,
        }
    }

    /// Turn a server close into its protocol meaning.
    ///
    /// Code 4001 becomes [`LeapError::AuthorizationError`]; everything else is
    /// returned unchanged.
    pub(crate) fn classify_close(self) -> Self {
        match self {
            LeapError::ServerClosed { code, reason } if code == CLOSE_CODE_UNAUTHORIZED => {
                LeapError::AuthorizationError(reason)
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for LeapError {
    fn from(err: serde_json::Error) -> Self {
        LeapError::SerializationError(err.to_string())
    }
}
