//! # seance-client
//!
//! Client-side state machines for joining a séance:
//!
//! - **Transport**: `Connector`/`Transport` traits and the `tokio-tungstenite`
//!   implementation that performs the join handshake
//! - **Reconnection**: `ReconnectionController` keeps one session connection
//!   alive with exponential backoff and a bounded attempt budget
//! - **Animation**: `AnimationSynchronizer` reveals spirit responses letter by
//!   letter, one sequence at a time

#![deny(unsafe_code)]

pub mod animation;
pub mod errors;
pub mod reconnect;
pub mod transport;

pub use animation::{AnimationSynchronizer, RevealCursor, RevealEvent, RevealSequence};
pub use errors::ClientError;
pub use reconnect::{ConnectionState, ReconnectPolicy, ReconnectionController};
pub use transport::{CloseReason, Connector, Frame, Transport, WsConnector};
