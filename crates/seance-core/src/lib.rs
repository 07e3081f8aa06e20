//! # seance-core
//!
//! Foundation types shared by every Séance crate:
//!
//! - **Branded IDs**: `SessionId`, `ConnectionId`, `UserId` as newtypes for type safety
//! - **Envelope protocol**: the uniform `{event, data, timestamp}` wire wrapper,
//!   typed payloads for every event kind, and the peer handshake
//! - **Identity**: a validated participant identity
//! - **Errors**: `ProtocolError` via `thiserror`
//! - **Retry**: backoff math and a generic async retry combinator
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod retry;

pub use envelope::{Envelope, EventKind};
pub use errors::ProtocolError;
pub use identity::{Handshake, Identity};
pub use ids::{ConnectionId, SessionId, UserId};
