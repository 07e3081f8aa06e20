//! Shared state handed to every session task.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use seance_spirit::ResponsePipeline;

use super::broadcast::BroadcastCoordinator;
use super::registry::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::history::ConversationHistory;

/// Everything a session task needs.
pub struct SessionContext {
    /// Session membership.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out over `registry`.
    pub broadcaster: BroadcastCoordinator,
    /// Spirit response generation.
    pub pipeline: Arc<ResponsePipeline>,
    /// Per-session exchange window.
    pub history: ConversationHistory,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
    /// Outbound queue capacity per connection.
    pub outbound_queue_capacity: usize,
    /// Advisory participant cap.
    pub max_session_users: usize,
    /// Time allowed for the handshake frame.
    pub handshake_timeout: Duration,
}

impl SessionContext {
    /// Build from server configuration.
    pub fn new(
        config: &ServerConfig,
        pipeline: Arc<ResponsePipeline>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_session_users));
        Self {
            broadcaster: BroadcastCoordinator::new(Arc::clone(&registry)),
            registry,
            pipeline,
            history: ConversationHistory::new(config.history_window),
            shutdown,
            outbound_queue_capacity: config.outbound_queue_capacity.max(1),
            max_session_users: config.max_session_users,
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
        }
    }
}
