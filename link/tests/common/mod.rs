#![allow(dead_code)]
//! In-process Leap server for integration tests.
//!
//! Accepts real WebSocket connections on a loopback port and lets each test
//! script the server side of the protocol frame by frame.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hop_leap::compression::deflate_zlib;
use hop_leap::{LeapClient, LeapClientBuilder, LeapTimeouts, Opcode, Payload};
use serde_json::{json, Value as JsonValue};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LeapTestServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    accept_task: JoinHandle<()>,
}

impl LeapTestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let (tx, connections) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(ServerConnection { ws }).is_err() {
                            return;
                        }
                    },
                    Err(e) => eprintln!("test server handshake failed: {}", e),
                }
            }
        });

        Self {
            addr,
            connections,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws?encoding=json&compression=zlib", self.addr)
    }

    /// Next accepted connection; panics after [`TEST_TIMEOUT`].
    pub async fn next_connection(&mut self) -> ServerConnection {
        self.try_next_connection(TEST_TIMEOUT)
            .await
            .expect("client did not connect")
    }

    pub async fn try_next_connection(&mut self, wait: Duration) -> Option<ServerConnection> {
        tokio::time::timeout(wait, self.connections.recv()).await.ok().flatten()
    }
}

impl Drop for LeapTestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConnection {
    pub async fn send_json(&mut self, value: JsonValue) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("send text frame");
    }

    pub async fn send_compressed(&mut self, value: JsonValue) {
        let compressed = deflate_zlib(value.to_string().as_bytes());
        self.ws
            .send(Message::Binary(compressed.into()))
            .await
            .expect("send binary frame");
    }

    pub async fn hello(&mut self, heartbeat_interval: u64) {
        self.send_compressed(json!({ "op": 1, "d": { "heartbeat_interval": heartbeat_interval } }))
            .await;
    }

    pub async fn dispatch(&mut self, channel_id: &str, event: &str, data: JsonValue) {
        self.send_compressed(json!({
            "op": 0,
            "d": { "c": channel_id, "u": false, "e": event, "d": data }
        }))
        .await;
    }

    /// Hello, wait for identify, INIT. Returns the identify payload.
    pub async fn accept(&mut self, heartbeat_interval: u64) -> Payload {
        self.hello(heartbeat_interval).await;
        let identify = self.recv_op(Opcode::Identify).await;
        self.dispatch("", "INIT", json!({ "cid": "conn_integration", "scope": "token", "channels": [] }))
            .await;
        identify
    }

    /// Next JSON payload the client sent.
    pub async fn recv(&mut self) -> Payload {
        loop {
            let msg = tokio::time::timeout(TEST_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for client frame")
                .expect("client hung up")
                .expect("websocket error");
            match msg {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("client sent invalid JSON")
                },
                Message::Binary(_) => panic!("client frames must be text"),
                _ => continue,
            }
        }
    }

    pub async fn recv_op(&mut self, op: Opcode) -> Payload {
        loop {
            let payload = self.recv().await;
            if payload.opcode() == Some(op) {
                return payload;
            }
        }
    }

    pub async fn close(mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        let _ = self.ws.close(Some(frame)).await;
        // Drain until the client acknowledges the close.
        let _ = tokio::time::timeout(TEST_TIMEOUT, async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
    }
}

pub fn client_builder(url: &str) -> LeapClientBuilder {
    LeapClient::builder()
        .project_id("project_integration")
        .token("leap_token_integration")
        .url(url)
        .timeouts(LeapTimeouts::fast())
        .reconnect_delay(Duration::from_millis(50))
}

/// Connect `client`, serving the handshake on `server`.
pub async fn connect(client: &LeapClient, server: &mut LeapTestServer) -> ServerConnection {
    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    let mut conn = server.next_connection().await;
    conn.accept(30_000).await;
    connecting
        .await
        .expect("connect task panicked")
        .expect("connect failed");
    conn
}
