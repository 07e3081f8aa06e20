//! WebSocket session layer: connection state, registry, fan-out, and the
//! per-connection task.

pub mod broadcast;
pub mod connection;
pub mod context;
pub mod handler;
pub mod registry;
pub mod session;
