//! Server-side connection state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use seance_core::{ConnectionId, SessionId};

use crate::errors::SendError;

/// One open WebSocket as seen by the registry and broadcaster.
///
/// Frames are queued on a bounded channel drained by the connection's writer
/// task. The session binding is write-once. `close()` fires a signal the
/// owning session task selects on, so pruning from anywhere ends the task.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    session_id: OnceLock<SessionId>,
    tx: mpsc::Sender<Arc<String>>,
    closed: CancellationToken,
    /// When this connection was accepted.
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Wrap the sending half of an outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            session_id: OnceLock::new(),
            tx,
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Bind to a session. Returns `false` if already bound.
    pub fn bind(&self, session_id: SessionId) -> bool {
        self.session_id.set(session_id).is_ok()
    }

    /// The bound session, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.get()
    }

    /// Queue a frame without waiting.
    pub fn send(&self, message: Arc<String>) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(match e {
                    TrySendError::Full(_) => SendError::Full,
                    TrySendError::Closed(_) => SendError::Closed,
                })
            }
        }
    }

    /// Fire the close signal. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
