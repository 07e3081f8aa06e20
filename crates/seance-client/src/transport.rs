//! Transport abstraction and the WebSocket implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use seance_core::Handshake;
use seance_core::constants::{NORMAL_CLOSE_CODE, POLICY_CLOSE_CODE};

use crate::errors::ClientError;

/// Why the peer closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code, `None` when the connection dropped without a close frame.
    pub code: Option<u16>,
    /// Close reason text.
    pub reason: String,
}

impl CloseReason {
    /// A normal (1000) closure.
    pub fn normal() -> Self {
        Self {
            code: Some(NORMAL_CLOSE_CODE),
            reason: String::new(),
        }
    }

    /// A closure without a close frame.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }

    /// Whether this closure means "do not reconnect".
    pub fn is_normal(&self) -> bool {
        self.code == Some(NORMAL_CLOSE_CODE)
    }

    /// Whether the server refused the handshake. Retrying the same identity
    /// is refused again.
    pub fn is_refusal(&self) -> bool {
        self.code == Some(POLICY_CLOSE_CODE)
    }
}

/// One inbound item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// The connection is gone.
    Closed(CloseReason),
}

/// An open bidirectional connection.
///
/// `next_frame` must be cancel-safe: the driver polls it inside `select!`.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), ClientError>;

    /// Wait for the next inbound frame.
    async fn next_frame(&mut self) -> Frame;

    /// Close with `code` and `reason`.
    async fn close(&mut self, code: u16, reason: &str);
}

/// Opens transports. Each call is one connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport and complete the handshake.
    async fn connect(&self) -> Result<Box<dyn Transport>, ClientError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connects to `{server_url}/ws/{session_id}` and sends the handshake.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
    handshake: Handshake,
}

impl WsConnector {
    /// Connector for `session_id` on `server_url` (e.g. `ws://127.0.0.1:8000`).
    pub fn new(server_url: &str, session_id: &str, handshake: Handshake) -> Self {
        Self {
            url: format!("{}/ws/{session_id}", server_url.trim_end_matches('/')),
            handshake,
        }
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ClientError> {
        let (mut ws, _response) = connect_async(self.url.as_str()).await?;
        let handshake = serde_json::to_string(&self.handshake)
            .map_err(|e| ClientError::Transport(format!("failed to encode handshake: {e}")))?;
        ws.send(Message::text(handshake)).await?;
        debug!(url = %self.url, "connected");
        Ok(Box::new(WsTransport { ws }))
    }
}

/// [`Transport`] over a `tokio-tungstenite` stream.
pub struct WsTransport {
    ws: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.ws.send(Message::text(text)).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Frame {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Frame::Text(text),
                    Err(_) => debug!("ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return Frame::Closed(frame.map_or_else(
                        || CloseReason::abnormal("closed without a close frame"),
                        |f| CloseReason {
                            code: Some(u16::from(f.code)),
                            reason: f.reason.as_str().to_owned(),
                        },
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Frame::Closed(CloseReason::abnormal(e.to_string())),
                None => return Frame::Closed(CloseReason::abnormal("stream ended")),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        let _ = self.ws.close(Some(frame)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_session_path() {
        let connector = WsConnector::new("ws://127.0.0.1:8000/", "parlour", Handshake::default());
        assert_eq!(connector.url(), "ws://127.0.0.1:8000/ws/parlour");
    }

    #[test]
    fn only_1000_is_normal() {
        assert!(CloseReason::normal().is_normal());
        assert!(!CloseReason::abnormal("reset").is_normal());
        let away = CloseReason {
            code: Some(1001),
            reason: "server shutting down".into(),
        };
        assert!(!away.is_normal());
        assert!(!away.is_refusal());
    }

    #[test]
    fn policy_close_is_a_refusal() {
        let refused = CloseReason {
            code: Some(1008),
            reason: "invalid handshake".into(),
        };
        assert!(refused.is_refusal());
        assert!(!refused.is_normal());
    }

    #[tokio::test]
    async fn connect_to_nothing_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsConnector::new(&format!("ws://{addr}"), "parlour", Handshake::default());
        assert!(connector.connect().await.is_err());
    }
}
