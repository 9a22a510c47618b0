//! Capability boundaries consumed by the memory core.
//!
//! Three upstream capabilities are abstracted behind traits: text embedding,
//! importance scoring, and free-text generation. Production implementations
//! live in `reverie-llm`; deterministic in-library implementations are
//! provided for tests and for running without an LLM backend.
//!
//! Retry and backoff belong to the implementations. By the time a call
//! returns [`ProviderError::Exhausted`], the configured attempt budget has
//! been spent and the caller treats the operation as failed.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::CharacterProfile;
use crate::types::{Embedding, Importance};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of an upstream capability call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider asked us to slow down. `retry_after` is honored by the
    /// implementation's backoff loop when present.
    #[error("Provider rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-suggested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// Network failure, timeout, or other retryable condition.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider answered but the response is unusable (malformed or
    /// schema-violating output). Retrying would not help.
    #[error("Permanent provider failure: {0}")]
    Permanent(String),

    /// The retry budget was spent without a usable response.
    #[error("Provider retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// How many attempts were made.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },
}

// ---------------------------------------------------------------------------
// Typed requests
// ---------------------------------------------------------------------------

/// A request to the text-generation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt (role, rules, output contract).
    pub system: String,
    /// User prompt (context and instructions).
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a request with the defaults used by the reflection engine.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Text → fixed-dimension vector.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = std::result::Result<Embedding, ProviderError>> + Send;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Text → integer poignancy rating.
pub trait ImportanceScorer: Send + Sync {
    /// Rate the poignancy of `text` from the character's point of view.
    ///
    /// Implementations clamp out-of-range ratings into `1..=10` rather than
    /// rejecting them.
    fn score(
        &self,
        profile: &CharacterProfile,
        text: &str,
    ) -> impl Future<Output = std::result::Result<Importance, ProviderError>> + Send;
}

/// Free-text generation used by the reflection engine.
pub trait TextGenerator: Send + Sync {
    /// Complete a prompt and return the raw generated text.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = std::result::Result<String, ProviderError>> + Send;
}

// ---------------------------------------------------------------------------
// Deterministic providers (tests & LLM-free operation)
// ---------------------------------------------------------------------------

/// A deterministic embedder that hashes whitespace tokens into buckets.
///
/// Equal texts produce equal vectors and texts sharing tokens land closer
/// together, which is enough signal for ranking tests without a model.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    /// Create a hash embedder with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> std::result::Result<Embedding, ProviderError> {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let mut raw = vec![0.0_f32; self.dims];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dims as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            raw[bucket] += sign;
        }

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Ok(Embedding(raw));
        }
        Ok(Embedding(raw.iter().map(|x| x / mag).collect()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// An embedder that returns random unit-length vectors.
///
/// Useful for tests that need non-zero, diverse embeddings without any
/// correlation to the input text.
pub struct RandomEmbedder {
    dims: usize,
}

impl RandomEmbedder {
    /// Create a random embedder with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Embedder for RandomEmbedder {
    async fn embed(&self, _text: &str) -> std::result::Result<Embedding, ProviderError> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let raw: Vec<f32> = (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Ok(Embedding(vec![0.0; self.dims]));
        }
        Ok(Embedding(raw.iter().map(|x| x / mag).collect()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// An importance scorer that returns a fixed rating for every memory.
pub struct FixedImportance(pub Importance);

impl FixedImportance {
    /// Score every memory at the given raw rating (clamped into `1..=10`).
    #[must_use]
    pub fn new(rating: i64) -> Self {
        Self(Importance::new(rating))
    }
}

impl ImportanceScorer for FixedImportance {
    async fn score(
        &self,
        _profile: &CharacterProfile,
        _text: &str,
    ) -> std::result::Result<Importance, ProviderError> {
        Ok(self.0)
    }
}
