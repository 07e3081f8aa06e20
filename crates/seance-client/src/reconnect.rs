//! Reconnection state machine.
//!
//! ```text
//! Idle → Connecting(0) → Open ──── leave / close 1000 ────→ Closed
//!                         │
//!                  any other close / failed connect
//!                         ▼
//!             ReconnectWait(n) ──timer──→ Connecting(n) → Open (n reset)
//!                         │
//!                   n == max_attempts
//!                         ▼
//!                       Failed
//! ```
//!
//! A close with 1008 means the server refused the handshake; that ends in
//! `Rejected` without retrying.
//!
//! One driver task owns the whole cycle, so at most one timer and one
//! connection attempt exist at any time. `leave()` cancels the driver's token,
//! which ends the cycle from any state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seance_core::Envelope;
use seance_core::constants::NORMAL_CLOSE_CODE;
use seance_settings::ClientSettings;

use crate::errors::ClientError;
use crate::transport::{CloseReason, Connector, Frame, Transport};

/// Default number of automatic reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default first reconnection delay.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Observable controller state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started.
    Idle,
    /// A connection attempt is in flight. `attempt` is 0 for the first
    /// connect, then the reconnection attempt number.
    Connecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Connected; sends are accepted.
    Open,
    /// Waiting before reconnection attempt `attempt`.
    ReconnectWait {
        /// Upcoming attempt number, starting at 1.
        attempt: u32,
        /// Delay before it.
        delay_ms: u64,
    },
    /// Closed on purpose. Terminal.
    Closed,
    /// Gave up after exhausting attempts. Terminal.
    Failed {
        /// Reconnection attempts made.
        attempts: u32,
    },
    /// The server refused the handshake. Terminal.
    Rejected {
        /// Close reason sent by the server.
        reason: String,
    },
}

impl ConnectionState {
    /// Whether the driver has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed { .. } | Self::Rejected { .. })
    }
}

/// Attempt budget and backoff base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Automatic attempts before `Failed`.
    pub max_attempts: u32,
    /// Delay before the first attempt; doubles each attempt.
    pub base_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Policy from client settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            max_attempts: settings.max_reconnect_attempts,
            base_delay_ms: settings.reconnect_base_delay_ms,
        }
    }

    /// Delay before attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay_ms.saturating_mul(1u64 << exp)
    }
}

enum Command {
    Send(String),
}

/// Keeps a session connection alive.
///
/// Inbound envelopes arrive on the receiver returned by [`start`](Self::start).
pub struct ReconnectionController {
    state_rx: watch::Receiver<ConnectionState>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectionController {
    /// Spawn the driver and begin connecting.
    pub fn start(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let driver = Driver {
            connector,
            policy,
            state: state_tx,
            commands: commands_rx,
            events: events_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(driver.run());

        let controller = Self {
            state_rx,
            commands: commands_tx,
            cancel,
            driver: Mutex::new(Some(handle)),
        };
        (controller, events_rx)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queue an envelope. Only valid while `Open`.
    pub fn send(&self, envelope: &Envelope) -> Result<(), ClientError> {
        if *self.state_rx.borrow() != ConnectionState::Open {
            return Err(ClientError::NotOpen);
        }
        let text = envelope.to_json()?;
        self.commands
            .send(Command::Send(text))
            .map_err(|_| ClientError::Stopped)
    }

    /// Close on purpose. No reconnection follows.
    pub fn leave(&self) {
        self.cancel.cancel();
    }

    /// Wait until a terminal state.
    pub async fn wait_terminal(&self) -> ConnectionState {
        let mut rx = self.state_rx.clone();
        match rx.wait_for(ConnectionState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Leave and wait for the driver to finish.
    pub async fn shutdown(&self) {
        self.leave();
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for ReconnectionController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

enum Ended {
    Left,
    PeerClosed(CloseReason),
}

struct Driver {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<Envelope>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            self.set(ConnectionState::Connecting { attempt });
            self.discard_stale_commands();

            let connected = tokio::select! {
                () = self.cancel.cancelled() => return self.set(ConnectionState::Closed),
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(mut transport) => {
                    attempt = 0;
                    info!("connection open");
                    self.set(ConnectionState::Open);
                    match self.pump(transport.as_mut()).await {
                        Ended::Left => {
                            transport.close(NORMAL_CLOSE_CODE, "leaving").await;
                            return self.set(ConnectionState::Closed);
                        }
                        Ended::PeerClosed(reason) if reason.is_normal() => {
                            info!("server closed the connection normally");
                            return self.set(ConnectionState::Closed);
                        }
                        Ended::PeerClosed(reason) if reason.is_refusal() => {
                            warn!(reason = %reason.reason, "server refused the handshake");
                            return self.set(ConnectionState::Rejected {
                                reason: reason.reason,
                            });
                        }
                        Ended::PeerClosed(reason) => {
                            warn!(code = reason.code, reason = %reason.reason, "connection lost");
                        }
                    }
                }
                Err(e) => warn!(attempt, error = %e, "connect failed"),
            }

            if attempt >= self.policy.max_attempts {
                warn!(attempts = attempt, "giving up on reconnection");
                return self.set(ConnectionState::Failed { attempts: attempt });
            }
            attempt += 1;
            let delay_ms = self.policy.delay_for(attempt);
            info!(attempt, delay_ms, "reconnecting");
            self.set(ConnectionState::ReconnectWait { attempt, delay_ms });

            tokio::select! {
                () = self.cancel.cancelled() => return self.set(ConnectionState::Closed),
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }
    }

    /// Move frames both ways until the connection ends.
    async fn pump(&mut self, transport: &mut dyn Transport) -> Ended {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ended::Left,
                Some(command) = self.commands.recv() => match command {
                    Command::Send(text) => {
                        if let Err(e) = transport.send_text(text).await {
                            return Ended::PeerClosed(CloseReason::abnormal(e.to_string()));
                        }
                    }
                },
                frame = transport.next_frame() => match frame {
                    Frame::Text(text) => match Envelope::from_json(&text) {
                        Ok(envelope) => {
                            let _ = self.events.send(envelope);
                        }
                        Err(e) => warn!(error = %e, "dropping undecodable frame"),
                    },
                    Frame::Closed(reason) => return Ended::PeerClosed(reason),
                },
            }
        }
    }

    fn discard_stale_commands(&mut self) {
        let mut stale = 0usize;
        while self.commands.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "discarded sends queued while disconnected");
        }
    }

    fn set(&self, state: ConnectionState) {
        debug!(state = ?state, "connection state");
        let _ = self.state.send_replace(state);
    }
}
