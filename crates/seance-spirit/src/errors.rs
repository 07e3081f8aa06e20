//! Generation error types.
//!
//! [`GeneratorError`] is what a [`Generator`](crate::generator::Generator)
//! returns for one call. [`SpiritError`] is the pipeline's own taxonomy; it is
//! logged and counted but never returned to callers, because the pipeline
//! always falls back to an in-character response.

use thiserror::Error;

/// Failure of a single generation call.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider status string (e.g. `RESOURCE_EXHAUSTED`).
        code: Option<String>,
    },

    /// The call succeeded but produced no usable text.
    #[error("generator returned an empty response")]
    Empty,

    /// The response body could not be decoded.
    #[error("malformed generator response: {0}")]
    Malformed(String),

    /// No backend is configured.
    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

impl GeneratorError {
    /// Whether another attempt may succeed.
    ///
    /// Rate limits, server errors, network failures, and empty or garbled
    /// output are transient. Other client errors and a missing backend are
    /// permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Empty | Self::Malformed(_) => true,
            Self::Unavailable(_) => false,
        }
    }

    /// Short category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Api { status: 429, .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Empty => "empty",
            Self::Malformed(_) => "parse",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Pipeline-level failure classification.
#[derive(Debug, Error)]
pub enum SpiritError {
    /// A call failed in a way that may succeed on retry.
    #[error("transient generation failure: {0}")]
    TransientCall(#[source] GeneratorError),

    /// A call failed in a way no retry will fix.
    #[error("permanent generation failure: {0}")]
    PermanentCall(#[source] GeneratorError),

    /// Every attempt in the retry budget failed.
    #[error("generation failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: GeneratorError,
    },

    /// The response exceeded the word limit and was truncated.
    #[error("response had {words} words, truncated to {max}")]
    OversizeResponse {
        /// Observed word count.
        words: usize,
        /// Limit applied.
        max: usize,
    },
}

impl SpiritError {
    /// Classify a single-call failure.
    pub fn from_call(err: GeneratorError) -> Self {
        if err.is_retryable() {
            Self::TransientCall(err)
        } else {
            Self::PermanentCall(err)
        }
    }

    /// Label used for the fallback metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TransientCall(_) => "transient",
            Self::PermanentCall(_) => "permanent",
            Self::ExhaustedRetries { .. } => "exhausted",
            Self::OversizeResponse { .. } => "oversize",
        }
    }
}
