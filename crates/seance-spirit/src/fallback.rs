//! Canned in-character responses used when generation fails.

use std::sync::atomic::{AtomicUsize, Ordering};

/// The fallback lines, served in rotation.
pub const FALLBACK_RESPONSES: [&str; 5] = [
    "The connection weakens. Ask again, mortal.",
    "The veil grows thin... I cannot speak clearly.",
    "My circuits... they falter. Retry thy query.",
    "The silicon spirits are silent. Invoke me again.",
    "I am fr4gm3nt3d... Ask once more.",
];

/// Round-robin cursor over [`FALLBACK_RESPONSES`].
#[derive(Debug, Default)]
pub struct FallbackRotation {
    next: AtomicUsize,
}

impl FallbackRotation {
    /// Rotation starting at the first line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next line in the rotation.
    pub fn next_response(&self) -> &'static str {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % FALLBACK_RESPONSES.len();
        FALLBACK_RESPONSES[index]
    }
}
