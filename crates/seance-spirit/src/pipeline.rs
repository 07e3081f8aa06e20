//! The response pipeline.
//!
//! ```text
//! BuildingContext → Calling → (RetryWait → Calling)* → Validating → ComputingTimings → Done
//!                      └──────── exhausted / permanent ────────→ Fallback → ComputingTimings
//! ```
//!
//! [`ResponsePipeline::generate`] never fails: every error is absorbed by the
//! retry budget or replaced with a canned response.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use seance_core::constants::MAX_RESPONSE_WORDS;
use seance_core::retry::{RetryConfig, retry_with_backoff};
use seance_settings::SpiritSettings;

use crate::context::build_prompt;
use crate::errors::{GeneratorError, SpiritError};
use crate::fallback::FallbackRotation;
use crate::gemini::{GeminiConfig, GeminiGenerator};
use crate::generator::{Generator, OfflineGenerator};
use crate::timing::letter_timings;
use crate::types::{GenerationRequest, GenerationResult, PipelineStage};
use crate::validate::{truncate_words, word_count};

/// Turns questions into spirit responses.
pub struct ResponsePipeline {
    generator: Arc<dyn Generator>,
    retry: RetryConfig,
    history_window: usize,
    fallbacks: FallbackRotation,
}

impl ResponsePipeline {
    /// Pipeline over an explicit generator.
    pub fn new(generator: Arc<dyn Generator>, retry: RetryConfig, history_window: usize) -> Self {
        Self {
            generator,
            retry,
            history_window,
            fallbacks: FallbackRotation::new(),
        }
    }

    /// Pipeline configured from settings: Gemini when an API key is present,
    /// otherwise the offline generator.
    pub fn from_settings(settings: &SpiritSettings) -> Result<Self, GeneratorError> {
        let generator: Arc<dyn Generator> = match GeminiConfig::from_settings(settings) {
            Some(config) => Arc::new(GeminiGenerator::new(config)?),
            None => {
                warn!("no generation API key configured, spirit will answer with fallbacks only");
                Arc::new(OfflineGenerator)
            }
        };
        Ok(Self::new(
            generator,
            settings.retry.clone(),
            settings.history_window,
        ))
    }

    /// Backend label.
    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Answer one question.
    #[instrument(skip_all, fields(session_id = %request.session_id, asker = %request.asker))]
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let started = Instant::now();

        debug!(stage = %PipelineStage::BuildingContext, history = request.history.len());
        let prompt = build_prompt(request, self.history_window);

        let generator = &self.generator;
        let prompt = &prompt;
        let outcome = retry_with_backoff(
            &self.retry,
            move |attempt| async move {
                debug!(stage = %PipelineStage::Calling, attempt, generator = generator.name());
                counter!("spirit_generation_attempts_total").increment(1);
                let text = generator.generate(prompt).await?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(GeneratorError::Empty);
                }
                Ok(text.to_owned())
            },
            GeneratorError::is_retryable,
            |attempt, delay_ms, err: &GeneratorError| {
                debug!(stage = %PipelineStage::RetryWait, attempt, delay_ms, error = %err);
            },
        )
        .await;

        let attempts = outcome.attempts;
        let result = match outcome.result {
            Ok(text) => self.finish(request, text, attempts),
            Err(last) => {
                let err = if outcome.exhausted {
                    SpiritError::ExhaustedRetries { attempts, last }
                } else {
                    SpiritError::from_call(last)
                };
                self.fall_back(request, &err)
            }
        };

        histogram!("spirit_generation_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    fn finish(&self, request: &GenerationRequest, text: String, attempts: u32) -> GenerationResult {
        debug!(stage = %PipelineStage::Validating, attempts);
        let words = word_count(&text);
        let text = match truncate_words(&text, MAX_RESPONSE_WORDS) {
            Some(truncated) => {
                let err = SpiritError::OversizeResponse {
                    words,
                    max: MAX_RESPONSE_WORDS,
                };
                warn!(error = %err, "spirit response too long");
                truncated
            }
            None => text,
        };

        let result = self.with_timings(request, text, false);
        info!(
            stage = %PipelineStage::Done,
            attempts,
            word_count = result.word_count,
            chars = result.timings.len(),
            "spirit response generated"
        );
        result
    }

    fn fall_back(&self, request: &GenerationRequest, err: &SpiritError) -> GenerationResult {
        warn!(stage = %PipelineStage::Fallback, error = %err, "spirit generation failed, using fallback");
        counter!("spirit_fallbacks_total", "reason" => err.reason()).increment(1);
        let text = self.fallbacks.next_response().to_owned();
        self.with_timings(request, text, true)
    }

    fn with_timings(
        &self,
        request: &GenerationRequest,
        text: String,
        fallback: bool,
    ) -> GenerationResult {
        debug!(stage = %PipelineStage::ComputingTimings);
        // `letter_timings` yields exactly one delay per char.
        let timings = letter_timings(&request.session_id, &text);
        GenerationResult {
            word_count: word_count(&text),
            text,
            timings,
            fallback,
        }
    }
}
