//! In-memory transport for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{read_deadline, Connector, Frame, FrameTransport};
use crate::codec::decode_frame;
use crate::compression::deflate_zlib;
use crate::error::{LeapError, Result};
use crate::models::{Opcode, Payload};

/// Hands every opened transport's server side to the test.
pub(crate) struct MockConnector {
    urls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<LeapError>>,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            urls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            servers,
        });
        (connector, rx)
    }

    /// Make the next connect attempt fail with `err`.
    pub(crate) fn fail_next(&self, err: LeapError) {
        self.failures.lock().push_back(err);
    }

    /// Every URL a connect was attempted against, in order.
    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn FrameTransport>> {
        self.urls.lock().push(url.to_string());
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();
        let sends = Arc::new(SendControl::default());

        let server = MockServer {
            to_client,
            from_client,
            closed: closing.clone(),
            sends: Arc::clone(&sends),
        };
        if self.servers.send(server).is_err() {
            return Err(LeapError::ConnectionFailed("mock server gone".to_string()));
        }

        Ok(Arc::new(MockTransport {
            incoming: tokio::sync::Mutex::new(incoming),
            outgoing,
            closing,
            sends,
        }))
    }
}

#[derive(Default)]
struct SendControl {
    failing: AtomicBool,
    attempts: AtomicUsize,
}

struct MockTransport {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Frame>>>,
    outgoing: mpsc::UnboundedSender<Frame>,
    closing: CancellationToken,
    sends: Arc<SendControl>,
}

#[async_trait]
impl FrameTransport for MockTransport {
    async fn next_frame(&self, read_timeout: Duration) -> Result<Frame> {
        let deadline = read_deadline(read_timeout);
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            biased;
            _ = self.closing.cancelled() => Err(LeapError::ConnectionClosed),
            _ = tokio::time::sleep_until(deadline) => {
                Err(LeapError::TimeoutError("mock read deadline".to_string()))
            },
            frame = incoming.recv() => match frame {
                Some(result) => result,
                None => Err(LeapError::WebSocketError("mock peer dropped".to_string())),
            },
        }
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        self.sends.attempts.fetch_add(1, Ordering::SeqCst);
        if self.closing.is_cancelled() {
            return Err(LeapError::ConnectionClosed);
        }
        if self.sends.failing.load(Ordering::SeqCst) {
            return Err(LeapError::WebSocketError("broken pipe".to_string()));
        }
        self.outgoing
            .send(frame)
            .map_err(|_| LeapError::WebSocketError("mock peer dropped".to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.closing.cancel();
        Ok(())
    }
}

/// Server side of one mock connection.
pub(crate) struct MockServer {
    to_client: mpsc::UnboundedSender<Result<Frame>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
    closed: CancellationToken,
    sends: Arc<SendControl>,
}

impl MockServer {
    /// Push a text JSON frame.
    pub(crate) fn send(&self, value: JsonValue) {
        let _ = self.to_client.send(Ok(Frame::Text(value.to_string())));
    }

    /// Push a zlib compressed binary frame.
    pub(crate) fn send_binary(&self, value: JsonValue) {
        let compressed = deflate_zlib(value.to_string().as_bytes());
        let _ = self.to_client.send(Ok(Frame::Binary(Bytes::from(compressed))));
    }

    /// Push a raw frame, valid or not.
    pub(crate) fn send_frame(&self, frame: Frame) {
        let _ = self.to_client.send(Ok(frame));
    }

    pub(crate) fn hello(&self, heartbeat_interval: u64) {
        self.send(json!({ "op": 1, "d": { "heartbeat_interval": heartbeat_interval } }));
    }

    pub(crate) fn dispatch(&self, channel_id: &str, event: &str, data: JsonValue) {
        self.send(json!({ "op": 0, "d": { "c": channel_id, "u": false, "e": event, "d": data } }));
    }

    pub(crate) fn init(&self) {
        self.dispatch("", "INIT", json!({ "cid": "conn_test", "scope": "project", "channels": [] }));
    }

    /// Send a close frame.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Err(LeapError::ServerClosed {
            code,
            reason: reason.to_string(),
        }));
    }

    /// Fail the client's next read with a network error.
    pub(crate) fn drop_connection(&self) {
        let _ = self
            .to_client
            .send(Err(LeapError::WebSocketError("connection reset".to_string())));
    }

    /// Make every later client write fail, reads keep working.
    pub(crate) fn fail_sends(&self) {
        self.sends.failing.store(true, Ordering::SeqCst);
    }

    /// How many writes the client attempted, failed ones included.
    pub(crate) fn send_attempts(&self) -> usize {
        self.sends.attempts.load(Ordering::SeqCst)
    }

    /// Whether the client closed its side.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Next payload the client sent.
    pub(crate) async fn recv(&mut self) -> Payload {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client transport dropped");
        decode_frame(&frame).expect("client sent an undecodable frame")
    }

    /// Next payload with opcode `op`, skipping everything else.
    pub(crate) async fn recv_op(&mut self, op: Opcode) -> Payload {
        loop {
            let payload = self.recv().await;
            if payload.opcode() == Some(op) {
                return payload;
            }
        }
    }

    /// Run the hello/identify/INIT handshake.
    pub(crate) async fn accept(&mut self, heartbeat_interval: u64) -> Payload {
        self.hello(heartbeat_interval);
        let identify = self.recv_op(Opcode::Identify).await;
        self.init();
        identify
    }
}
