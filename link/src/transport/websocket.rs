//! WebSocket transport built on tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::{read_deadline, Connector, Frame, FrameTransport};
use crate::error::{LeapError, Result};
use crate::timeouts::LeapTimeouts;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer closed without a close frame payload.
const CLOSE_CODE_NO_STATUS: u16 = 1005;

/// rustls needs a process wide provider before the first `wss://` handshake.
/// An application that installed its own keeps it.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

/// Opens [`WebSocketTransport`]s with a bounded connect time.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connection_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector. A zero timeout waits as long as the OS does.
    pub fn new(connection_timeout: Duration) -> Self {
        Self { connection_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(LeapTimeouts::default().connection_timeout)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn FrameTransport>> {
        log::debug!("[leap] Establishing WebSocket connection to {}", url);
        install_crypto_provider();

        let connect_result = if !LeapTimeouts::is_no_timeout(self.connection_timeout) {
            tokio::time::timeout(self.connection_timeout, tokio_tungstenite::connect_async(url))
                .await
        } else {
            Ok(tokio_tungstenite::connect_async(url).await)
        };

        let stream = match connect_result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(WsError::Http(response))) => {
                let status = response.status();
                return Err(LeapError::ConnectionFailed(format!(
                    "WebSocket HTTP error: {}",
                    status.as_u16()
                )));
            },
            Ok(Err(e)) => return Err(LeapError::ConnectionFailed(e.to_string())),
            Err(_) => {
                return Err(LeapError::TimeoutError(format!(
                    "Connection timeout ({:?})",
                    self.connection_timeout
                )))
            },
        };

        Ok(Arc::new(WebSocketTransport::new(stream)))
    }
}

/// A live WebSocket.
///
/// The write half sits behind its own lock so concurrent senders never
/// interleave frames. Reads are only ever issued by one read loop, the lock
/// on the read half just makes that safe to share.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closing: CancellationToken,
}

impl WebSocketTransport {
    fn new(ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closing: CancellationToken::new(),
        }
    }

    fn map_ws_error(&self, err: WsError) -> LeapError {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed if self.closing.is_cancelled() => {
                LeapError::ConnectionClosed
            },
            other => LeapError::WebSocketError(other.to_string()),
        }
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn next_frame(&self, read_timeout: Duration) -> Result<Frame> {
        let deadline = read_deadline(read_timeout);
        let mut stream = self.stream.lock().await;

        loop {
            tokio::select! {
                biased;

                _ = self.closing.cancelled() => return Err(LeapError::ConnectionClosed),

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(LeapError::TimeoutError(format!(
                        "no frame received within {:?}",
                        read_timeout
                    )));
                },

                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.as_str().to_owned())),
                    Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data)),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (u16::from(f.code), f.reason.as_str().to_owned()),
                            None => (CLOSE_CODE_NO_STATUS, String::new()),
                        };
                        return Err(LeapError::ServerClosed { code, reason });
                    },
                    // Pongs are answered by tungstenite itself.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {},
                    Some(Err(e)) => return Err(self.map_ws_error(e)),
                    None if self.closing.is_cancelled() => return Err(LeapError::ConnectionClosed),
                    None => {
                        return Err(LeapError::WebSocketError(
                            "connection ended without a close frame".to_string(),
                        ))
                    },
                },
            }
        }
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.closing.is_cancelled() {
            return Err(LeapError::ConnectionClosed);
        }
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
        };
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| self.map_ws_error(e))
    }

    async fn close(&self) -> Result<()> {
        self.closing.cancel();
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(LeapError::WebSocketError(e.to_string())),
        }
    }
}
