//! The external text-generation collaborator.

use async_trait::async_trait;

use crate::context::Prompt;
use crate::errors::GeneratorError;

/// A backend that turns a prompt into text.
///
/// Implementors must be `Send + Sync` so one instance can serve every session.
/// A call either returns text (possibly empty, which the pipeline treats as a
/// transient failure) or a [`GeneratorError`] classified by
/// [`GeneratorError::is_retryable`].
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend label for logs.
    fn name(&self) -> &str;

    /// Generate a response to `prompt`.
    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError>;
}

/// Generator used when no API key is configured. Every call fails
/// permanently, so the pipeline answers with fallbacks only.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, GeneratorError> {
        Err(GeneratorError::Unavailable(
            "no generation API key configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn offline_is_permanently_unavailable() {
        let prompt = Prompt {
            system: String::new(),
            user: "hello".into(),
        };
        let err = OfflineGenerator.generate(&prompt).await.unwrap_err();
        assert_matches!(err, GeneratorError::Unavailable(_));
        assert!(!err.is_retryable());
    }
}
