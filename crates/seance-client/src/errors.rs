//! Client error types.

use seance_core::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the client state machines and transports.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A send was attempted while the connection was not open.
    #[error("connection is not open")]
    NotOpen,

    /// The controller's driver task has stopped.
    #[error("connection controller has stopped")]
    Stopped,

    /// Connecting or writing to the transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Letter timings do not cover the text one-to-one.
    #[error("{timings} letter timings for {chars} characters")]
    TimingMismatch {
        /// Characters in the text.
        chars: usize,
        /// Timings supplied.
        timings: usize,
    },
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
