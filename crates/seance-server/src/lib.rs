//! # seance-server
//!
//! Axum HTTP + WebSocket server for shared Séance sessions.
//!
//! - `GET /ws/{session_id}`: join a session (handshake frame, then envelopes)
//! - `GET /health`: liveness and live counters
//! - `GET /metrics`: Prometheus text
//!
//! Membership lives in [`ConnectionRegistry`], fan-out in
//! [`BroadcastCoordinator`], and each question is answered by the
//! `seance-spirit` response pipeline on a background task.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod history;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{RegistryError, SendError};
pub use server::SeanceServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::broadcast::{BroadcastCoordinator, BroadcastReport};
pub use websocket::connection::Connection;
pub use websocket::registry::{ConnectionRegistry, SessionInfo};
