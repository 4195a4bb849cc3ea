use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LeapError;

/// Lifecycle state of the Leap connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Nothing has been attempted yet, or the client was closed.
    #[default]
    Idle,
    /// Opening the transport and waiting for the hello frame.
    Connecting,
    /// Identify sent, waiting for INIT.
    Authenticating,
    /// INIT received.
    Connected,
    /// The last attempt failed. See [`StateInfo::will_reconnect`].
    Errored,
}

impl ConnectionState {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection state together with the error that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateInfo {
    /// Current state.
    pub state: ConnectionState,

    /// Set only when `state` is [`ConnectionState::Errored`].
    pub error: Option<LeapError>,

    /// Whether a background reconnect will follow this error.
    pub will_reconnect: bool,
}

impl StateInfo {
    /// A state without error.
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            error: None,
            will_reconnect: false,
        }
    }

    /// An errored state.
    pub fn errored(error: LeapError, will_reconnect: bool) -> Self {
        Self {
            state: ConnectionState::Errored,
            error: Some(error),
            will_reconnect,
        }
    }

    /// True once INIT has been received on the current connection.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True when the connection failed and nothing will retry it.
    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::Errored && !self.will_reconnect
    }
}

impl fmt::Display for StateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(err) if self.will_reconnect => {
                write!(f, "{} ({}), reconnecting", self.state, err)
            },
            Some(err) => write!(f, "{} ({})", self.state, err),
            None => write!(f, "{}", self.state),
        }
    }
}
