//! Leap client with builder pattern.
//!
//! [`LeapClient`] is the public face of the protocol engine: connect,
//! subscribe, observe state, and consume broadcast event streams.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::{
    connection::LeapConnection,
    error::{LeapError, Result},
    models::{ChannelEvent, ChannelInfo, ConnectionOptions, InitEvent, MessageEvent, StateInfo},
    timeouts::LeapTimeouts,
    transport::{Connector, WebSocketConnector},
};


type StateListener = Box<dyn Fn(StateInfo) + Send + Sync>;

/// Realtime Leap client.
///
/// Use [`LeapClientBuilder`] to construct instances with custom configuration.
/// Clones share one connection; dropping the last clone stops every
/// background task.
///
/// # Examples
///
/// ```rust,no_run
/// use hop_leap::LeapClient;
///
/// # async fn example() -> hop_leap::Result<()> {
/// let client = LeapClient::builder()
///     .project_id("project_123")
///     .token("leap_token_abc")
///     .build()?;
///
/// client.connect().await?;
/// let mut messages = client.message_event_channel();
/// let channel = client.subscribe("chat").await?;
/// println!("subscribed to {}", channel.id);
///
/// while let Some(message) = messages.recv().await {
///     println!("{}: {}", message.event_name, message.data);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LeapClient {
    inner: Arc<LeapConnection>,
    _shutdown_guard: Arc<DropGuard>,
}

impl LeapClient {
    /// Create a client for the default Leap endpoint.
    pub fn new(project_id: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::builder().project_id(project_id).token(token).build()
    }

    /// Create a new builder for configuring the client
    pub fn builder() -> LeapClientBuilder {
        LeapClientBuilder::new()
    }

    /// Connect and wait for the session to be confirmed.
    ///
    /// Returns once INIT arrives, or with the error of an attempt that will
    /// not be retried. A failure of the first attempt is returned as is; no
    /// background retry follows it. Calling this while connected is a no-op.
    pub async fn connect(&self) -> Result<()> {
        let mut states = self.inner.watch_state();
        self.inner.connect(false).await?;

        let inner = &self.inner;
        let wait_for_init = async move {
            loop {
                {
                    let info = states.borrow_and_update();
                    if info.is_connected() {
                        return Ok(());
                    }
                    if info.is_terminal() {
                        return Err(info.error.clone().unwrap_or(LeapError::ConnectionClosed));
                    }
                }
                if inner.is_closed() || states.changed().await.is_err() {
                    return Err(LeapError::ConnectionClosed);
                }
            }
        };

        let init_timeout = self.inner.timeouts().init_timeout;
        if LeapTimeouts::is_no_timeout(init_timeout) {
            wait_for_init.await
        } else {
            tokio::time::timeout(init_timeout, wait_for_init)
                .await
                .map_err(|_| {
                    LeapError::TimeoutError(format!("no INIT event within {:?}", init_timeout))
                })?
        }
    }

    /// Subscribe to a channel and wait for the server's answer.
    ///
    /// Fails with [`LeapError::ChannelUnavailable`] when the server refuses,
    /// or with the connection error if the connection drops first.
    pub async fn subscribe(&self, channel_id: &str) -> Result<ChannelInfo> {
        let timeout = self.inner.timeouts().subscribe_timeout;
        if LeapTimeouts::is_no_timeout(timeout) {
            return self.inner.subscribe(channel_id).await;
        }
        tokio::time::timeout(timeout, self.inner.subscribe(channel_id))
            .await
            .map_err(|_| {
                LeapError::TimeoutError(format!(
                    "no reply to subscribe {} within {:?}",
                    channel_id, timeout
                ))
            })?
    }

    /// Close the connection and end every event stream.
    ///
    /// Pending [`subscribe`](Self::subscribe) calls fail with
    /// [`LeapError::ConnectionClosed`]. The client can't be reconnected
    /// afterwards.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    /// Current connection state.
    pub fn state(&self) -> StateInfo {
        self.inner.state()
    }

    /// Call `f` for every future state change, in order, off the engine's
    /// task.
    pub fn add_state_listener<F>(&self, f: F)
    where
        F: Fn(StateInfo) + Send + Sync + 'static,
    {
        self.inner.add_state_listener(f);
    }

    /// INIT event of the current (or last) session.
    pub fn init_event(&self) -> Option<Arc<InitEvent>> {
        self.inner.init_event()
    }

    /// URL the next connection attempt will use.
    pub fn url(&self) -> String {
        self.inner.url()
    }

    /// A new stream of MESSAGE and DIRECT_MESSAGE events.
    ///
    /// Every call returns an independent stream receiving every message.
    /// The stream ends when the client is closed or the server permanently
    /// rejects the session.
    pub fn message_event_channel(&self) -> mpsc::Receiver<MessageEvent> {
        self.inner.message_event_channel()
    }

    /// A new stream of channel events (availability nobody waited for,
    /// state updates, Pipe rooms). Same lifetime rules as
    /// [`message_event_channel`](Self::message_event_channel).
    pub fn channel_event_channel(&self) -> mpsc::Receiver<ChannelEvent> {
        self.inner.channel_event_channel()
    }

    /// Timeouts this client was built with.
    pub fn timeouts(&self) -> &LeapTimeouts {
        self.inner.timeouts()
    }
}

/// Builder for configuring [`LeapClient`] instances.
pub struct LeapClientBuilder {
    project_id: String,
    token: Option<String>,
    timeouts: LeapTimeouts,
    connection_options: ConnectionOptions,
    connector: Option<Arc<dyn Connector>>,
    state_listeners: Vec<StateListener>,
}

impl LeapClientBuilder {
    fn new() -> Self {
        Self {
            project_id: String::new(),
            token: None,
            timeouts: LeapTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            connector: None,
            state_listeners: Vec::new(),
        }
    }

    /// Project the token belongs to. May stay empty for project tokens.
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Leap or project token (required)
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the WebSocket URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.connection_options.url = url.into();
        self
    }

    /// Set comprehensive timeout configuration for all operations
    ///
    /// # Example
    ///
    /// ```rust
    /// use hop_leap::{LeapClient, LeapTimeouts};
    ///
    /// # fn example() -> hop_leap::Result<()> {
    /// let client = LeapClient::builder()
    ///     .token("leap_token_abc")
    ///     .timeouts(LeapTimeouts::fast())
    ///     .build()?;
    /// # let _ = client;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: LeapTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set connection options (URL, reconnect behavior).
    ///
    /// Replaces a URL given earlier through [`url`](Self::url).
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Delay between reconnect attempts. Saturates at `u64::MAX` milliseconds.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.connection_options.reconnect_delay_ms =
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replace the transport, e.g. with an in-process test double.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Register a state listener before the client exists, so the very
    /// first transition is observed too.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(StateInfo) + Send + Sync + 'static,
    {
        self.state_listeners.push(Box::new(f));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<LeapClient> {
        let token = self
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| LeapError::ConfigurationError("token is required".into()))?;

        validate_ws_url(&self.connection_options.url)?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new(self.timeouts.connection_timeout)));

        let inner = Arc::new(LeapConnection::new(
            self.project_id,
            token,
            self.timeouts,
            self.connection_options,
            connector,
        ));
        for listener in self.state_listeners {
            inner.add_state_listener(listener);
        }

        let guard = inner.shutdown_token().drop_guard();
        Ok(LeapClient {
            inner,
            _shutdown_guard: Arc::new(guard),
        })
    }
}

fn validate_ws_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| LeapError::ConfigurationError(format!("invalid url {}: {}", raw, e)))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(LeapError::ConfigurationError(format!(
            "unsupported url scheme {} (expected ws or wss)",
            other
        ))),
    }
}
