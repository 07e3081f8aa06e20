//! Per-character reveal timings.
//!
//! Each character of a response gets a delay in milliseconds, drawn from a
//! band chosen by its class. Jitter comes from an RNG seeded with the session
//! and the text, so the same response in the same session always reveals with
//! the same rhythm.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Lower clamp for any delay.
pub const MIN_DELAY_MS: u64 = 50;
/// Upper clamp for any delay.
pub const MAX_DELAY_MS: u64 = 500;

/// Letter timings for `text`, one per `char`.
pub fn letter_timings(session_id: &str, text: &str) -> Vec<u64> {
    let mut rng = seeded_rng(session_id, text);
    text.chars()
        .enumerate()
        .map(|(index, ch)| delay_for(index, ch, &mut rng))
        .collect()
}

fn seeded_rng(session_id: &str, text: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(seed))
}

fn delay_for(index: usize, ch: char, rng: &mut StdRng) -> u64 {
    let delay = if index == 0 {
        rng.random_range(200..=300)
    } else {
        match ch {
            ' ' => rng.random_range(200..=300),
            '.' | '!' | '?' => rng.random_range(250..=400),
            ',' | '-' | ';' | ':' => rng.random_range(180..=250),
            // 150 ± 50
            _ => 100 + rng.random_range(0..=100),
        }
    };
    delay.clamp(MIN_DELAY_MS, MAX_DELAY_MS)
}
