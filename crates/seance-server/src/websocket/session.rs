//! Per-connection session task.
//!
//! ```text
//! accept → handshake → register → user_joined ─┐
//!                                              ▼
//!            ┌──── reader: frames → handler ◄──┤
//!            │     writer: queue → socket      │
//!            ▼                                 │
//!   client close / socket error / pruned / shutdown
//!            │
//!            ▼
//!   unregister → user_left → close frame
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use seance_core::constants::POLICY_CLOSE_CODE;
use seance_core::{ConnectionId, Envelope, Handshake, Identity, ProtocolError, SessionId};

use super::connection::Connection;
use super::context::SessionContext;
use super::handler::handle_frame;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_HANDSHAKE_REJECTIONS_TOTAL,
};

/// How long the writer gets to finish its current frame at teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

enum HandshakeFailure {
    TimedOut,
    Disconnected,
    Invalid(ProtocolError),
}

#[derive(Clone, Copy, Debug)]
enum Exit {
    ClientClosed,
    SocketError,
    Dropped,
    Shutdown,
}

impl Exit {
    fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::SocketError => "socket_error",
            Self::Dropped => "dropped",
            Self::Shutdown => "shutdown",
        }
    }

    /// Close frame the server sends, if any.
    fn close_frame(self) -> Option<CloseFrame> {
        match self {
            Self::ClientClosed | Self::SocketError => None,
            Self::Dropped => Some(CloseFrame {
                code: close_code::AGAIN,
                reason: "connection dropped".into(),
            }),
            Self::Shutdown => Some(CloseFrame {
                code: close_code::AWAY,
                reason: "server shutting down".into(),
            }),
        }
    }
}

/// Drive one accepted WebSocket until it closes.
#[instrument(skip_all, fields(session_id = %session_id, connection_id = %connection_id))]
pub async fn run_session(
    socket: WebSocket,
    session_id: SessionId,
    connection_id: ConnectionId,
    ctx: Arc<SessionContext>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let handshake = tokio::select! {
        result = read_handshake(&mut ws_rx, ctx.handshake_timeout) => result,
        () = ctx.shutdown.cancelled() => Err(HandshakeFailure::Disconnected),
    };
    let identity = match handshake {
        Ok(identity) => identity,
        Err(failure) => {
            counter!(WS_HANDSHAKE_REJECTIONS_TOTAL).increment(1);
            reject_handshake(&mut ws_tx, failure).await;
            return;
        }
    };

    let (tx, rx) = mpsc::channel::<Arc<String>>(ctx.outbound_queue_capacity);
    let connection = Arc::new(Connection::new(connection_id, tx));
    let participants =
        match ctx
            .registry
            .register(&session_id, Arc::clone(&connection), identity.clone())
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "registration refused");
                return;
            }
        };

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(user = %identity.name, user_id = %identity.id, participants, "participant joined");
    if participants > ctx.max_session_users {
        warn!(
            participants,
            max_users = ctx.max_session_users,
            "session is over its participant cap"
        );
    }
    let _ = ctx.broadcaster.broadcast(
        &session_id,
        &Envelope::user_joined(&identity),
        Some(&connection.id),
    );

    let mut writer = tokio::spawn(write_loop(ws_tx, rx, Arc::clone(&connection)));

    let exit = loop {
        tokio::select! {
            () = connection.closed() => break Exit::Dropped,
            () = ctx.shutdown.cancelled() => break Exit::Shutdown,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = handle_frame(&ctx, &connection, &session_id, &identity, text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        let _ = handle_frame(&ctx, &connection, &session_id, &identity, text);
                    }
                    Err(_) => debug!(len = bytes.len(), "ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(code = frame.as_ref().map(|f| f.code), "client closed");
                    break Exit::ClientClosed;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "socket error");
                    break Exit::SocketError;
                }
                None => break Exit::ClientClosed,
            },
        }
    };

    // The task that owned the connection announces the departure, whether it
    // left on its own or was pruned by a failed broadcast.
    let was_registered = ctx.registry.unregister(&session_id, &connection.id).is_some();
    connection.close();
    let _ = ctx
        .broadcaster
        .broadcast(&session_id, &Envelope::user_left(&identity), None);
    if !ctx.registry.has_session(&session_id) {
        ctx.history.forget(&session_id);
    }

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(mut ws_tx)) => {
            if let Some(frame) = exit.close_frame() {
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
            }
        }
        Ok(Err(e)) => warn!(error = %e, "writer task failed"),
        Err(_) => {
            debug!("writer did not finish in time");
            writer.abort();
        }
    }

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => exit.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(
        user = %identity.name,
        reason = exit.as_str(),
        was_registered,
        dropped_messages = connection.drop_count(),
        "participant left"
    );
}

/// Drain the outbound queue into the socket until the connection closes.
///
/// Returns the sink so the caller can send a final close frame.
async fn write_loop(
    mut ws_tx: WsSink,
    mut rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<Connection>,
) -> WsSink {
    loop {
        tokio::select! {
            biased;
            () = connection.closed() => break,
            next = rx.recv() => match next {
                Some(text) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.as_str().into())).await {
                        debug!(connection_id = %connection.id, error = %e, "socket write failed");
                        connection.close();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    ws_tx
}

/// Wait for the first frame and resolve it into an identity.
async fn read_handshake(
    ws_rx: &mut WsStream,
    timeout: Duration,
) -> Result<Identity, HandshakeFailure> {
    let text = tokio::time::timeout(timeout, next_text(ws_rx))
        .await
        .map_err(|_| HandshakeFailure::TimedOut)?
        .ok_or(HandshakeFailure::Disconnected)?;
    let handshake: Handshake = serde_json::from_str(&text)
        .map_err(|e| HandshakeFailure::Invalid(ProtocolError::InvalidEnvelope(e)))?;
    handshake.into_identity().map_err(HandshakeFailure::Invalid)
}

async fn next_text(ws_rx: &mut WsStream) -> Option<String> {
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => return String::from_utf8(bytes.to_vec()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
        }
    }
    None
}

async fn reject_handshake(ws_tx: &mut WsSink, failure: HandshakeFailure) {
    let reason = match failure {
        HandshakeFailure::TimedOut => {
            warn!("handshake timed out");
            "handshake timed out"
        }
        HandshakeFailure::Disconnected => {
            debug!("peer left before handshake");
            return;
        }
        HandshakeFailure::Invalid(err) => {
            warn!(code = err.code(), error = %err, "invalid handshake");
            if let Ok(json) = Envelope::from_protocol_error(&err).to_json() {
                let _ = ws_tx.send(Message::Text(json.into())).await;
            }
            "invalid handshake"
        }
    };
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: POLICY_CLOSE_CODE,
            reason: reason.into(),
        })))
        .await;
}
