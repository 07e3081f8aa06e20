//! Request and result types for the response pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use seance_core::SessionId;

/// One prior question and the spirit's answer to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Who asked.
    pub asker: String,
    /// The question.
    pub question: String,
    /// The spirit's answer.
    pub answer: String,
}

/// Everything needed to answer one question.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Session the question was asked in.
    pub session_id: SessionId,
    /// Validated question (1..=500 chars, trimmed).
    pub question: String,
    /// Asker display name.
    pub asker: String,
    /// Prior exchanges, oldest first. Only the trailing window is used.
    pub history: Vec<Exchange>,
}

/// A finished spirit response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Response text, at most 30 words.
    pub text: String,
    /// Whitespace-delimited word count of `text`.
    pub word_count: usize,
    /// Reveal delay per character of `text`, in milliseconds.
    pub timings: Vec<u64>,
    /// Whether `text` is a canned fallback.
    pub fallback: bool,
}

/// Pipeline progress, recorded on spans and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    /// Rendering the prompt.
    BuildingContext,
    /// Waiting on the generator.
    Calling,
    /// Backing off before another call.
    RetryWait,
    /// Enforcing the word limit.
    Validating,
    /// Producing letter timings.
    ComputingTimings,
    /// Finished with generated text.
    Done,
    /// Finished with a canned response.
    Fallback,
}

impl PipelineStage {
    /// Stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildingContext => "building_context",
            Self::Calling => "calling",
            Self::RetryWait => "retry_wait",
            Self::Validating => "validating",
            Self::ComputingTimings => "computing_timings",
            Self::Done => "done",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
