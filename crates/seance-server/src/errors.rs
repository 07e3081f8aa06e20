//! Server error types.

use seance_core::{ConnectionId, SessionId};
use thiserror::Error;

/// Why a registration was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identity name is blank.
    #[error("participant name must not be blank")]
    EmptyName,

    /// The connection already belongs to a session.
    #[error("connection {connection_id} is already bound to session {session_id}")]
    AlreadyBound {
        /// Offending connection.
        connection_id: ConnectionId,
        /// Session it is bound to.
        session_id: SessionId,
    },
}

/// Why an outbound frame could not be queued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The outbound queue is at capacity.
    #[error("outbound queue full")]
    Full,
    /// The writer task has gone away or the connection was closed.
    #[error("connection closed")]
    Closed,
}

impl SendError {
    /// Short label for metrics.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_bound_display() {
        let err = RegistryError::AlreadyBound {
            connection_id: ConnectionId::from("conn_1"),
            session_id: SessionId::from("parlour"),
        };
        assert_eq!(
            err.to_string(),
            "connection conn_1 is already bound to session parlour"
        );
    }

    #[test]
    fn send_error_reasons() {
        assert_eq!(SendError::Full.reason(), "full");
        assert_eq!(SendError::Closed.reason(), "closed");
    }
}
