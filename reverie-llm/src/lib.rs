//! # reverie-llm — LLM Boundary for Reverie
//!
//! HTTP implementations of the capability traits `reverie-core` consumes:
//!
//! - **Embedding** — text → fixed-dimension vector
//! - **Importance scoring** — text → integer poignancy 1–10
//! - **Text generation** — reflection questions and insights
//!
//! Backends: **Ollama** (local, recommended default) and any
//! **OpenAI-compatible** API. Every call carries a hard timeout and a retry
//! budget with exponential, rate-limit-aware backoff; an LRU cache sits in
//! front of the embedder.

pub mod cache;
pub mod client;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod types;

pub use cache::EmbeddingCache;
pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use providers::{LlmEmbedder, LlmImportanceScorer, LlmTextGenerator};
pub use types::{ChatRequest, ChatResponse};
