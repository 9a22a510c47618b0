//! Configuration for the Reverie memory system.
//!
//! Maps directly to `reverie.toml`; every section has serde defaults so a
//! partial (or missing) file yields a fully usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level Reverie configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverieConfig {
    /// Memory formation and reflection accounting.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval ranking settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// LLM boundary settings (consumed by `reverie-llm`).
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MemoryError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::MemoryError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Memory formation and reflection accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Accumulated importance at which a reflection cycle fires.
    #[serde(default = "default_reflection_limit")]
    pub reflection_limit: u32,
    /// How many recent memories feed the question-generation transcript.
    #[serde(default = "default_100")]
    pub questions_context: usize,
    /// How many salient questions each cycle asks for.
    #[serde(default = "default_3")]
    pub questions_per_cycle: usize,
    /// Upper bound on insights distilled per question.
    #[serde(default = "default_5")]
    pub insights_per_question: usize,
    /// How many relevant memories back each question's answer.
    #[serde(default = "default_10")]
    pub insight_retrieval_k: usize,
    /// Max back-to-back cycles when reflection output re-crosses the
    /// threshold; further syntheses wait for the next organic write.
    #[serde(default = "default_2")]
    pub max_chained_cycles: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            reflection_limit: 25,
            questions_context: 100,
            questions_per_cycle: 3,
            insights_per_question: 5,
            insight_retrieval_k: 10,
            max_chained_cycles: 2,
        }
    }
}

/// Retrieval ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Hourly decay base for the recency signal (`base ^ hours`).
    #[serde(default = "default_decay_base")]
    pub decay_base: f64,
    /// Default number of memories returned per retrieval.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Embedding vector dimensions, fixed per store instance.
    #[serde(default = "default_dimensions")]
    pub embedding_dimensions: usize,
    /// Largest (least urgent) task priority handled by the memory budget.
    #[serde(default = "default_8")]
    pub max_task_priority: u32,
    /// Memory budget granted to the most urgent tasks.
    #[serde(default = "default_10")]
    pub max_task_memories: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            decay_base: 0.99,
            top_k: 5,
            embedding_dimensions: 1536,
            max_task_priority: 8,
            max_task_memories: 10,
        }
    }
}

/// LLM boundary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible providers (empty for local Ollama).
    #[serde(default)]
    pub api_key: String,
    /// Chat model used for scoring and reflection.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Retry attempts per request beyond the first.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Entries held by the in-process embedding cache.
    #[serde(default = "default_cache_size")]
    pub embedding_cache_size: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: String::new(),
            chat_model: "qwen2.5:1.5b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            max_retries: 2,
            request_timeout_ms: 10_000,
            embedding_cache_size: 1024,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_provider() -> String { "ollama".to_string() }
fn default_base_url() -> String { "http://localhost:11434".to_string() }
fn default_chat_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text".to_string() }
fn default_decay_base() -> f64 { 0.99 }
fn default_reflection_limit() -> u32 { 25 }
fn default_2() -> u32 { 2 }
fn default_3() -> usize { 3 }
fn default_5() -> usize { 5 }
fn default_8() -> u32 { 8 }
fn default_10() -> usize { 10 }
fn default_100() -> usize { 100 }
fn default_top_k() -> usize { 5 }
fn default_dimensions() -> usize { 1536 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_cache_size() -> usize { 1024 }
fn default_busy_timeout() -> u32 { 5_000 }
