//! Protocol-wide limits.

/// Maximum length of a participant message, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Maximum number of words in a spirit response.
pub const MAX_RESPONSE_WORDS: usize = 30;

/// Number of prior exchanges included when building generation context.
pub const HISTORY_WINDOW: usize = 10;

/// Default advisory participant cap for a session.
pub const DEFAULT_MAX_SESSION_USERS: usize = 6;

/// Name used when a peer's handshake omits one.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// WebSocket close code for a normal, intentional closure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// WebSocket close code the server uses when it refuses a handshake.
pub const POLICY_CLOSE_CODE: u16 = 1008;
