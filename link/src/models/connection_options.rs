use serde::{Deserialize, Serialize};

/// Default Leap endpoint: JSON encoding with zlib compressed binary frames.
pub const DEFAULT_LEAP_URL: &str = "wss://leap.hop.io/ws?encoding=json&compression=zlib";

/// Connection-level options for the Leap client.
///
/// These options control where the client connects and how it recovers
/// from connection loss. Timing of individual handshake steps lives in
/// [`LeapTimeouts`](crate::LeapTimeouts).
///
/// # Example
///
/// ```rust
/// use hop_leap::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_url("ws://127.0.0.1:9000/ws")
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000);
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// WebSocket URL of the Leap service.
    /// A close with code 4006 replaces it at runtime.
    #[serde(default = "default_url")]
    pub url: String,

    /// Enable automatic reconnection on connection loss
    /// Default: true - retries forever unless the server rejects the token
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Fixed delay in milliseconds between reconnection attempts
    /// Default: 1000ms (1 second)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_url() -> String {
    DEFAULT_LEAP_URL.to_string()
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: default_url(),
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WebSocket URL to connect to
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay between reconnection attempts (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }
}
