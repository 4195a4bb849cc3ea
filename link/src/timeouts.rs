//! Timeout configuration for the Leap client.
//!
//! Centralizes every deadline the client applies: opening the transport,
//! waiting for the server hello, the read deadline derived from the server
//! heartbeat interval, and the two blocking facade calls.

use std::time::Duration;

/// Timeout configuration for Leap client operations.
///
/// A zero duration means "no timeout" everywhere.
///
/// # Examples
///
/// ```rust
/// use hop_leap::LeapTimeouts;
/// use std::time::Duration;
///
/// let timeouts = LeapTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .subscribe_timeout_secs(15)
///     .build();
///
/// let fast = LeapTimeouts::fast();
/// # let _ = (timeouts, fast);
/// ```
#[derive(Debug, Clone)]
pub struct LeapTimeouts {
    /// Timeout for opening the WebSocket (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// How long to wait for the hello frame after the socket opens.
    /// Default: 10 seconds
    pub hello_timeout: Duration,

    /// Grace period added to the server heartbeat interval to form the read
    /// deadline. A connection that stays silent longer is treated as dead.
    /// Zero disables the read deadline altogether.
    /// Default: 5 seconds
    pub heartbeat_grace: Duration,

    /// How long [`connect`](crate::LeapClient::connect) waits for the INIT
    /// event that confirms the session.
    /// Default: 10 seconds
    pub init_timeout: Duration,

    /// How long [`subscribe`](crate::LeapClient::subscribe) waits for the
    /// AVAILABLE/UNAVAILABLE reply. Zero bounds the wait only by the
    /// connection lifetime.
    /// Default: 0
    pub subscribe_timeout: Duration,
}

impl Default for LeapTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(10),
            heartbeat_grace: Duration::from_secs(5),
            init_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::ZERO,
        }
    }
}

impl LeapTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> LeapTimeoutsBuilder {
        LeapTimeoutsBuilder::new()
    }

    /// Short timeouts for local development servers.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            hello_timeout: Duration::from_secs(2),
            heartbeat_grace: Duration::from_secs(2),
            init_timeout: Duration::from_secs(3),
            subscribe_timeout: Duration::from_secs(5),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for creating custom [`LeapTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct LeapTimeoutsBuilder {
    timeouts: LeapTimeouts,
}

impl LeapTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LeapTimeouts::default(),
        }
    }

    /// Set the transport open timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the transport open timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the hello wait timeout.
    pub fn hello_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.hello_timeout = timeout;
        self
    }

    /// Set the grace period added to the heartbeat interval for reads.
    pub fn heartbeat_grace(mut self, grace: Duration) -> Self {
        self.timeouts.heartbeat_grace = grace;
        self
    }

    /// Set how long `connect` waits for the INIT event.
    /// Set to 0 to wait indefinitely.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.init_timeout = timeout;
        self
    }

    /// Set how long `subscribe` waits for its reply.
    /// Set to 0 to wait for as long as the connection lives.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the subscribe reply timeout in seconds.
    pub fn subscribe_timeout_secs(self, secs: u64) -> Self {
        self.subscribe_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LeapTimeouts {
        self.timeouts
    }
}
