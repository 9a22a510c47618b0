//! Adapters implementing the `reverie-core` capability traits over
//! [`LlmClient`].

use std::sync::Arc;

use tracing::debug;

use reverie_core::provider::{
    CompletionRequest, Embedder, ImportanceScorer, ProviderError, TextGenerator,
};
use reverie_core::registry::CharacterProfile;
use reverie_core::types::{Embedding, Importance};

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::prompt;
use crate::types::ChatRequest;

impl From<LlmError> for ProviderError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { retry_after } => ProviderError::RateLimited { retry_after },
            LlmError::ParseError(msg) => ProviderError::Permanent(msg),
            LlmError::RetriesExhausted {
                attempts,
                last_error,
            } => ProviderError::Exhausted {
                attempts,
                last_error,
            },
            LlmError::RequestFailed(_)
            | LlmError::Timeout(_)
            | LlmError::Unavailable(_)
            | LlmError::ConfigError(_) => ProviderError::Transient(err.to_string()),
        }
    }
}

/// HTTP-backed [`Embedder`].
pub struct LlmEmbedder {
    client: Arc<LlmClient>,
    dimensions: usize,
}

impl LlmEmbedder {
    /// Create an embedder producing `dimensions`-wide vectors.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, dimensions: usize) -> Self {
        Self { client, dimensions }
    }
}

impl Embedder for LlmEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        let vector = self.client.embed(text).await?;
        if vector.len() != self.dimensions {
            return Err(ProviderError::Permanent(format!(
                "embedding model returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// HTTP-backed [`ImportanceScorer`] using the 1–10 poignancy prompt.
pub struct LlmImportanceScorer {
    client: Arc<LlmClient>,
}

impl LlmImportanceScorer {
    /// Create a scorer over the given client.
    #[must_use]
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

impl ImportanceScorer for LlmImportanceScorer {
    async fn score(
        &self,
        profile: &CharacterProfile,
        text: &str,
    ) -> Result<Importance, ProviderError> {
        let request = ChatRequest::new(
            prompt::IMPORTANCE_SYSTEM,
            prompt::importance_user(&profile.name, &profile.summary, text),
        )
        .with_temperature(0.0)
        .with_max_tokens(8);

        let response = self.client.complete(&request).await?;
        let rating = parse_rating(&response.text)?;
        debug!(character = %profile.id, rating = %rating, "Importance scored");
        Ok(rating)
    }
}

/// HTTP-backed [`TextGenerator`].
pub struct LlmTextGenerator {
    client: Arc<LlmClient>,
}

impl LlmTextGenerator {
    /// Create a generator over the given client.
    #[must_use]
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

impl TextGenerator for LlmTextGenerator {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let chat = ChatRequest::new(request.system, request.user)
            .with_temperature(request.temperature)
            .with_max_tokens(request.max_tokens);
        let response = self.client.complete(&chat).await?;
        Ok(response.text)
    }
}

/// Parse a rating completion into an [`Importance`].
///
/// Accepts a bare number with optional `Rating:` prefix and trailing
/// punctuation; out-of-range values are clamped into `1..=10`. Anything
/// without a leading integer is a permanent failure.
fn parse_rating(text: &str) -> Result<Importance, ProviderError> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("Rating:")
        .or_else(|| trimmed.strip_prefix("rating:"))
        .unwrap_or(trimmed)
        .trim_start();

    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ProviderError::Permanent(format!(
            "importance response has no leading integer: '{text}'"
        )));
    }

    let raw: i64 = digits
        .parse()
        .map_err(|e| ProviderError::Permanent(format!("unparseable importance '{text}': {e}")))?;
    Ok(Importance::new(raw))
}
