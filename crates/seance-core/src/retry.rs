//! Retry configuration, backoff math and a generic async retry combinator.
//!
//! - [`RetryConfig`]: retry parameters (max retries, backoff, jitter)
//! - [`calculate_backoff_delay_with_random`]: exponential backoff with jitter
//! - [`retry_with_backoff`]: run a fallible async operation until it succeeds,
//!   fails permanently, or exhausts its retry budget

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.0;

/// Configuration for retry logic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2, so three calls total).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.0).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt + 1` (zero-based `attempt`).
    ///
    /// Draws jitter from the thread RNG only when `jitter_factor > 0`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let random = if self.jitter_factor > 0.0 {
            rand::rng().random::<f64>()
        } else {
            0.5
        };
        calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff delay with explicit randomness.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (2r - 1) * jitter)`.
/// `random` should be in `[0.0, 1.0)`; `0.5` yields the exact exponential value.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Combinator
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of [`retry_with_backoff`].
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final value, or the last error.
    pub result: Result<T, E>,
    /// Total number of attempts made (1-based).
    pub attempts: u32,
    /// Total delay spent waiting in ms.
    pub total_delay_ms: u64,
    /// The last error was retryable but the budget ran out. False on success
    /// and on a non-retryable error, whichever attempt it came from.
    pub exhausted: bool,
}

/// Run `op` until it succeeds, returns a non-retryable error, or the retry
/// budget is spent.
///
/// `op` receives the zero-based attempt index. Before each backoff sleep
/// `on_retry` is called with the upcoming attempt index, the delay in ms and
/// the error that caused it. Between attempts the task sleeps for
/// [`RetryConfig::delay_for`] of the failed attempt index.
pub async fn retry_with_backoff<T, E, F, Fut, R, W>(
    config: &RetryConfig,
    mut op: F,
    is_retryable: R,
    mut on_retry: W,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    W: FnMut(u32, u64, &E),
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut total_delay_ms = 0u64;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_delay_ms,
                    exhausted: false,
                };
            }
            Err(err) => {
                let retryable = is_retryable(&err);
                if attempt >= config.max_retries || !retryable {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt + 1,
                        total_delay_ms,
                        exhausted: retryable,
                    };
                }

                let delay_ms = config.delay_for(attempt);
                debug!(attempt, delay_ms, error = %err, "retrying after backoff");
                on_retry(attempt + 1, delay_ms, &err);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                total_delay_ms += delay_ms;
                attempt += 1;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
