//! Leap protocol engine.
//!
//! Owns the single live transport and drives the connection state machine:
//!
//! - hello / identify handshake, INIT confirms the session
//! - heartbeat loop at the server advertised interval
//! - read loop decoding frames and routing dispatch events to either the
//!   subscribe correlator or the broadcast queues
//! - close code handling (4001 permanent, 4006 URL swap) and the fixed
//!   delay reconnect loop

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::codec::{decode_frame, encode_payload};
use crate::error::{LeapError, Result, CLOSE_CODE_RECONNECT};
use crate::event_waiter::EventWaiter;
use crate::models::{
    ChannelEvent, ChannelInfo, ConnectionOptions, ConnectionState, DispatchEvent, Hello,
    InitEvent, LeapEvent, MessageEvent, Opcode, Payload, StateInfo,
};
use crate::queue_dispatcher::QueueDispatcher;
use crate::state_cell::StateCell;
use crate::timeouts::LeapTimeouts;
use crate::transport::{Connector, FrameTransport};

/// The transport currently owned by the engine, tagged with the generation
/// that opened it. Loops of an older generation never tear down a newer
/// connection.
#[derive(Clone)]
struct ActiveConnection {
    generation: u64,
    transport: Arc<dyn FrameTransport>,
}

pub(crate) struct LeapConnection {
    project_id: String,
    token: String,
    url: RwLock<String>,
    timeouts: LeapTimeouts,
    options: ConnectionOptions,
    connector: Arc<dyn Connector>,

    transport: tokio::sync::RwLock<Option<ActiveConnection>>,
    generation: AtomicU64,

    state: StateCell<StateInfo>,
    init_event: StateCell<Option<Arc<InitEvent>>>,
    channel_waiter: EventWaiter<ChannelInfo>,

    message_queues: RwLock<Vec<QueueDispatcher<MessageEvent>>>,
    channel_queues: RwLock<Vec<QueueDispatcher<ChannelEvent>>>,
    queues_closed: AtomicBool,

    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl LeapConnection {
    pub(crate) fn new(
        project_id: String,
        token: String,
        timeouts: LeapTimeouts,
        options: ConnectionOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            project_id,
            token,
            url: RwLock::new(options.url.clone()),
            timeouts,
            options,
            connector,
            transport: tokio::sync::RwLock::new(None),
            generation: AtomicU64::new(0),
            state: StateCell::new(StateInfo::default()),
            init_event: StateCell::new(None),
            channel_waiter: EventWaiter::new(),
            message_queues: RwLock::new(Vec::new()),
            channel_queues: RwLock::new(Vec::new()),
            queues_closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn url(&self) -> String {
        self.url.read().clone()
    }

    pub(crate) fn timeouts(&self) -> &LeapTimeouts {
        &self.timeouts
    }

    // ---------------------------------------------------------------------
    // State
    // ---------------------------------------------------------------------

    pub(crate) fn state(&self) -> StateInfo {
        self.state.get()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<StateInfo> {
        self.state.subscribe()
    }

    pub(crate) fn add_state_listener<F>(&self, f: F)
    where
        F: Fn(StateInfo) + Send + Sync + 'static,
    {
        self.state.add_listener(f);
    }

    pub(crate) fn init_event(&self) -> Option<Arc<InitEvent>> {
        self.init_event.get()
    }

    // ---------------------------------------------------------------------
    // Handshake
    // ---------------------------------------------------------------------

    /// Open a transport and run the handshake.
    ///
    /// Returns once identify has been sent; INIT arrives later through the
    /// read loop. `reconnect` only decides the `will_reconnect` flag recorded
    /// on failure.
    pub(crate) async fn connect(self: &Arc<Self>, reconnect: bool) -> Result<()> {
        let mut slot = self.transport.write().await;
        if self.shutdown.is_cancelled() {
            return Err(LeapError::ConnectionClosed);
        }
        if slot.is_some() {
            return Ok(());
        }

        self.state.set(StateInfo::new(ConnectionState::Connecting));
        let url = self.url();

        let handshake = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(LeapError::ConnectionClosed),
            result = self.handshake(&url) => result,
        };

        let (transport, hello) = match handshake {
            Ok(opened) => opened,
            Err(LeapError::ConnectionClosed) if self.shutdown.is_cancelled() => {
                return Err(LeapError::ConnectionClosed);
            },
            Err(err) => return Err(self.fail_handshake(err, reconnect)),
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(ActiveConnection {
            generation,
            transport: Arc::clone(&transport),
        });
        drop(slot);

        let interval = Duration::from_millis(hello.heartbeat_interval);
        let read_timeout = if LeapTimeouts::is_no_timeout(self.timeouts.heartbeat_grace) {
            Duration::ZERO
        } else {
            interval + self.timeouts.heartbeat_grace
        };

        spawn_heartbeat_loop(Arc::clone(&transport), interval, self.shutdown.clone());
        spawn_read_loop(Arc::clone(self), generation, transport, read_timeout);

        log::debug!("[leap] Identify sent on connection generation {}", generation);
        Ok(())
    }

    async fn handshake(&self, url: &str) -> Result<(Arc<dyn FrameTransport>, Hello)> {
        log::debug!("[leap] Connecting to {}", url);
        let transport = self.connector.connect(url).await?;

        match self.hello_and_identify(transport.as_ref()).await {
            Ok(hello) => Ok((transport, hello)),
            Err(e) => {
                let _ = transport.close().await;
                Err(e)
            },
        }
    }

    async fn hello_and_identify(&self, transport: &dyn FrameTransport) -> Result<Hello> {
        let frame = transport.next_frame(self.timeouts.hello_timeout).await?;
        let payload = decode_frame(&frame)
            .map_err(|e| LeapError::HandshakeError(format!("unreadable hello frame: {}", e)))?;
        if payload.opcode() != Some(Opcode::Hello) {
            return Err(LeapError::ExpectedHello);
        }

        let hello: Hello = serde_json::from_value(payload.d)
            .map_err(|e| LeapError::HandshakeError(format!("invalid hello body: {}", e)))?;
        if hello.heartbeat_interval == 0 {
            return Err(LeapError::HandshakeError(
                "server advertised a zero heartbeat interval".to_string(),
            ));
        }
        log::debug!("[leap] Hello received (heartbeat_interval={}ms)", hello.heartbeat_interval);

        self.state.set(StateInfo::new(ConnectionState::Authenticating));
        let identify = encode_payload(&Payload::identify(&self.token, &self.project_id)?)?;
        transport.send_frame(identify).await?;
        Ok(hello)
    }

    fn fail_handshake(&self, err: LeapError, reconnect: bool) -> LeapError {
        let err = err.classify_close();
        self.apply_reconnect_url(&err);

        let will_reconnect = reconnect && !err.is_permanent() && !self.shutdown.is_cancelled();
        if err.is_permanent() {
            log::error!("[leap] Connection rejected: {}", err);
        } else {
            log::warn!("[leap] Connection attempt failed: {}", err);
        }
        self.state.set(StateInfo::errored(err.clone(), will_reconnect));
        err
    }

    /// A 4006 close carries the URL for the next attempt in its reason.
    fn apply_reconnect_url(&self, err: &LeapError) {
        if let LeapError::ServerClosed { code, reason } = err {
            if *code == CLOSE_CODE_RECONNECT && !reason.is_empty() {
                log::info!("[leap] Server moved the connection to {}", reason);
                *self.url.write() = reason.clone();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Steady state
    // ---------------------------------------------------------------------

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        transport: Arc<dyn FrameTransport>,
        read_timeout: Duration,
    ) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                frame = transport.next_frame(read_timeout) => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(LeapError::ConnectionClosed) => {
                    log::debug!("[leap] Read loop {} stopped, transport closed", generation);
                    return;
                },
                Err(e) => {
                    self.handle_ws_error(generation, e).await;
                    return;
                },
            };

            // A single bad frame mid-stream is not worth the connection.
            let payload = match decode_frame(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("[leap] Dropping undecodable frame: {}", e);
                    continue;
                },
            };

            match payload.opcode() {
                Some(Opcode::Dispatch) => self.dispatch_event(payload.d),
                Some(Opcode::Heartbeat) => {
                    let echo = Payload::new(Opcode::Heartbeat, payload.d);
                    match encode_payload(&echo) {
                        Ok(frame) => {
                            if let Err(e) = transport.send_frame(frame).await {
                                log::debug!("[leap] Failed to echo heartbeat: {}", e);
                            }
                        },
                        Err(e) => log::warn!("[leap] Failed to encode heartbeat echo: {}", e),
                    }
                },
                Some(Opcode::HeartbeatAck) => log::trace!("[leap] Heartbeat acknowledged"),
                Some(op) => log::debug!("[leap] Ignoring unexpected {:?} payload", op),
                None => log::debug!("[leap] Ignoring unknown opcode {}", payload.op),
            }
        }
    }

    async fn handle_ws_error(self: &Arc<Self>, generation: u64, err: LeapError) {
        {
            let mut slot = self.transport.write().await;
            match slot.as_ref() {
                Some(active) if active.generation == generation => {},
                // Already replaced or closed.
                _ => return,
            }
            if let Some(active) = slot.take() {
                let _ = active.transport.close().await;
            }
        }

        let err = err.classify_close();
        self.apply_reconnect_url(&err);

        let permanent = err.is_permanent();
        let will_reconnect =
            !permanent && self.options.auto_reconnect && !self.shutdown.is_cancelled();
        if permanent {
            log::error!("[leap] Session terminated by server: {}", err);
        } else {
            log::warn!("[leap] Connection lost: {}", err);
        }

        self.state.set(StateInfo::errored(err.clone(), will_reconnect));
        self.channel_waiter.close(err);

        if will_reconnect {
            self.reconnect_loop().await;
        } else {
            self.close_queues();
        }
    }

    async fn reconnect_loop(self: &Arc<Self>) {
        let delay = Duration::from_millis(self.options.reconnect_delay_ms);
        let mut attempt: u64 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            attempt += 1;

            match self.connect(true).await {
                Ok(()) => {
                    log::info!("[leap] Reconnected after {} attempt(s)", attempt);
                    return;
                },
                Err(e) if e.is_permanent() => {
                    self.close_queues();
                    return;
                },
                Err(LeapError::ConnectionClosed) if self.shutdown.is_cancelled() => return,
                Err(e) => log::warn!("[leap] Reconnect attempt {} failed: {}", attempt, e),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {},
            }
        }
    }

    fn dispatch_event(&self, data: JsonValue) {
        let event: DispatchEvent = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("[leap] Malformed dispatch payload: {}", e);
                return;
            },
        };

        let code = event.event_code.clone();
        let channel_id = event.details.channel_id.clone();
        let event = match LeapEvent::decode(event) {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                log::warn!("[leap] Failed to decode {} event: {}", code, e);
                // A subscribe waiting on this channel must still get an answer.
                let is_reply = matches!(code.as_str(), "AVAILABLE" | "UNAVAILABLE");
                if is_reply && !channel_id.is_empty() {
                    self.channel_waiter.signal(&channel_id, Err(e.into()));
                }
                return;
            },
            None => {
                log::debug!("[leap] Ignoring unknown dispatch event {}", code);
                return;
            },
        };

        match event {
            LeapEvent::Init(init) => {
                log::info!("[leap] Connected (connection id {})", init.connection_id);
                self.init_event.set(Some(Arc::new(init)));
                self.state.set(StateInfo::new(ConnectionState::Connected));
            },
            LeapEvent::Available(available) => {
                let tag = if available.channel.id.is_empty() {
                    available.details.channel_id.clone()
                } else {
                    available.channel.id.clone()
                };
                if !self.channel_waiter.signal(&tag, Ok(available.channel.clone())) {
                    self.broadcast_channel(ChannelEvent::Available(available));
                }
            },
            LeapEvent::Unavailable(unavailable) => {
                let err = LeapError::ChannelUnavailable {
                    channel_id: unavailable.details.channel_id.clone(),
                    error_code: unavailable.error_code.clone(),
                    graceful: unavailable.graceful,
                };
                if !self.channel_waiter.signal(&unavailable.details.channel_id, Err(err)) {
                    self.broadcast_channel(ChannelEvent::Unavailable(unavailable));
                }
            },
            LeapEvent::Message(message) => {
                for queue in self.message_queues.read().iter() {
                    queue.dispatch(message.clone());
                }
            },
            LeapEvent::StateUpdate(update) => {
                self.broadcast_channel(ChannelEvent::StateUpdate(update))
            },
            LeapEvent::PipeRoomAvailable(room) => {
                self.broadcast_channel(ChannelEvent::PipeRoomAvailable(room))
            },
            LeapEvent::PipeRoomUpdate(room) => {
                self.broadcast_channel(ChannelEvent::PipeRoomUpdate(room))
            },
        }
    }

    fn broadcast_channel(&self, event: ChannelEvent) {
        for queue in self.channel_queues.read().iter() {
            queue.dispatch(event.clone());
        }
    }

    // ---------------------------------------------------------------------
    // Facade operations
    // ---------------------------------------------------------------------

    /// Send SUBSCRIBE and wait for the AVAILABLE / UNAVAILABLE reply.
    pub(crate) async fn subscribe(&self, channel_id: &str) -> Result<ChannelInfo> {
        let waiter = {
            let slot = self.transport.read().await;
            let Some(active) = slot.as_ref() else {
                return Err(LeapError::ConnectionClosed);
            };

            // Registered before the frame goes out so a fast reply can't miss it.
            let waiter = self.channel_waiter.register(channel_id);
            let frame = encode_payload(&Payload::subscribe(channel_id)?)?;
            active.transport.send_frame(frame).await?;
            waiter
        };

        log::debug!("[leap] SUBSCRIBE sent for {}", channel_id);
        waiter.recv().await
    }

    pub(crate) fn message_event_channel(&self) -> mpsc::Receiver<MessageEvent> {
        register_queue(&self.message_queues, &self.queues_closed)
    }

    pub(crate) fn channel_event_channel(&self) -> mpsc::Receiver<ChannelEvent> {
        register_queue(&self.channel_queues, &self.queues_closed)
    }

    /// End every broadcast stream. Streams requested later start closed.
    fn close_queues(&self) {
        let mut messages = self.message_queues.write();
        let mut channels = self.channel_queues.write();
        self.queues_closed.store(true, Ordering::SeqCst);
        for queue in messages.drain(..) {
            queue.close();
        }
        for queue in channels.drain(..) {
            queue.close();
        }
    }

    /// Tear everything down. Later calls are no-ops.
    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();

        let active = self.transport.write().await.take();
        let result = match active {
            Some(active) => active.transport.close().await,
            None => Ok(()),
        };

        self.channel_waiter.shutdown(LeapError::ConnectionClosed);
        self.close_queues();
        self.state.set(StateInfo::new(ConnectionState::Idle));
        log::debug!("[leap] Client closed");
        result
    }
}

fn register_queue<T: Send + 'static>(
    queues: &RwLock<Vec<QueueDispatcher<T>>>,
    closed: &AtomicBool,
) -> mpsc::Receiver<T> {
    let (dispatcher, rx) = QueueDispatcher::channel();
    let mut queues = queues.write();
    if closed.load(Ordering::SeqCst) {
        dispatcher.close();
        return rx;
    }
    queues.retain(|queue| !queue.is_closed());
    queues.push(dispatcher);
    rx
}

// Plain fns so the read loop future (which may reconnect) does not appear in
// the type of `connect`.
fn spawn_read_loop(
    conn: Arc<LeapConnection>,
    generation: u64,
    transport: Arc<dyn FrameTransport>,
    read_timeout: Duration,
) {
    tokio::spawn(conn.read_loop(generation, transport, read_timeout));
}

fn spawn_heartbeat_loop(
    transport: Arc<dyn FrameTransport>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        // First beat is due one interval after hello.
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {},
            }

            let frame = match encode_payload(&Payload::heartbeat()) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("[leap] Failed to encode heartbeat: {}", e);
                    return;
                },
            };
            // The read loop owns error handling; a failed send just ends the beat.
            if let Err(e) = transport.send_frame(frame).await {
                log::debug!("[leap] Heartbeat stopped: {}", e);
                return;
            }
            log::trace!("[leap] Heartbeat sent");
        }
    });
}
