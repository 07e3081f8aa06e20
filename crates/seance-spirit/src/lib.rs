//! # seance-spirit
//!
//! Generated-response pipeline for Séance sessions.
//!
//! - [`ResponsePipeline`]: prompt context, retried generation call, word-limit
//!   validation, letter timings, and fallback rotation
//! - [`Generator`]: the external text-generation collaborator, with
//!   [`GeminiGenerator`] (Google `generateContent`) and [`OfflineGenerator`]
//! - [`timing::letter_timings`]: deterministic per-character reveal delays

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod fallback;
pub mod gemini;
pub mod generator;
pub mod pipeline;
pub mod timing;
pub mod types;
pub mod validate;

pub use errors::{GeneratorError, SpiritError};
pub use gemini::{GeminiConfig, GeminiGenerator};
pub use generator::{Generator, OfflineGenerator};
pub use pipeline::ResponsePipeline;
pub use types::{Exchange, GenerationRequest, GenerationResult, PipelineStage};
