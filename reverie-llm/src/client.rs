//! LLM client — unified interface for Ollama and OpenAI-compatible backends.
//!
//! Every call carries a hard timeout and runs inside a retry loop with
//! exponential backoff. HTTP 429 responses are rate-limit-aware: a
//! `Retry-After` header, when present, overrides the backoff schedule
//! (capped, so a hostile header cannot stall the caller for minutes).

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode, header::HeaderMap};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatResponse};
use reverie_core::config::LlmConfig;

/// Base delay of the exponential backoff schedule.
const BACKOFF_BASE_MS: u64 = 250;
/// Ceiling for computed backoff delays.
const BACKOFF_CAP_MS: u64 = 5_000;
/// Ceiling for server-suggested `Retry-After` waits.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(30);

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally (recommended default).
    Ollama {
        /// Base URL, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API (also works with Anthropic, Together, etc.).
    OpenAiCompatible {
        /// Base URL of the API.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available — every call fails with `Unavailable`.
    None,
}

/// The main LLM client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    chat_model: String,
    embedding_model: String,
    max_retries: u32,
    timeout: Duration,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        max_retries: u32,
        timeout_ms: u64,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            max_retries,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Create a client with no backend (every call fails).
    #[must_use]
    pub fn none() -> Self {
        Self {
            provider: LlmProvider::None,
            http: Client::new(),
            chat_model: String::new(),
            embedding_model: String::new(),
            max_retries: 0,
            timeout: Duration::from_millis(1),
        }
    }

    /// Build a client from the shared configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider name.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: config.base_url.clone(),
            },
            "openai" | "openai-compatible" => LlmProvider::OpenAiCompatible {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
            },
            "none" => LlmProvider::None,
            other => {
                return Err(LlmError::ConfigError(format!(
                    "unknown LLM provider '{other}' (expected ollama, openai, or none)"
                )));
            }
        };

        Ok(Self::new(
            provider,
            config.chat_model.clone(),
            config.embedding_model.clone(),
            config.max_retries,
            config.request_timeout_ms,
        ))
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unavailable`] without a backend, or
    /// [`LlmError::RetriesExhausted`] once the retry budget is spent.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let (url, body, api_key) = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => (
                format!("{base_url}/api/generate"),
                json!({
                    "model": self.chat_model,
                    "prompt": format!("{}\n\n{}", request.system, request.user),
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                }),
                None,
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                format!("{base_url}/v1/chat/completions"),
                json!({
                    "model": self.chat_model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                }),
                Some(api_key.as_str()),
            ),
        };

        let response = self.send_with_retry(&url, api_key, &body, "chat").await?;

        let text = match &self.provider {
            LlmProvider::Ollama { .. } => response["response"].as_str(),
            LlmProvider::OpenAiCompatible { .. } => {
                response["choices"][0]["message"]["content"].as_str()
            }
            LlmProvider::None => unreachable!("handled above"),
        }
        .ok_or_else(|| LlmError::ParseError("completion response missing text field".into()))?
        .to_string();

        Ok(ChatResponse {
            text,
            model: self.chat_model.clone(),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Embed a text string into a vector.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::complete`].
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let (url, body, api_key) = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => (
                format!("{base_url}/api/embeddings"),
                json!({ "model": self.embedding_model, "prompt": text }),
                None,
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                format!("{base_url}/v1/embeddings"),
                json!({ "model": self.embedding_model, "input": text }),
                Some(api_key.as_str()),
            ),
        };

        let response = self.send_with_retry(&url, api_key, &body, "embedding").await?;

        let values = match &self.provider {
            LlmProvider::Ollama { .. } => response["embedding"].as_array(),
            LlmProvider::OpenAiCompatible { .. } => response["data"][0]["embedding"].as_array(),
            LlmProvider::None => unreachable!("handled above"),
        }
        .ok_or_else(|| LlmError::ParseError("embedding response missing vector".into()))?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| LlmError::ParseError("non-numeric embedding entry".into()))
            })
            .collect()
    }

    /// POST a JSON body, retrying transient failures with backoff.
    async fn send_with_retry(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
        what: &str,
    ) -> Result<Value, LlmError> {
        let mut last_error = String::new();
        let mut rate_limit_hint: Option<Duration> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(attempt, rate_limit_hint.take());
                debug!(
                    what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying LLM call"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            let mut req = self.http.post(url).json(body).timeout(self.timeout);
            if let Some(key) = api_key {
                req = req.header("Authorization", format!("Bearer {key}"));
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    debug!(
                        what,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "LLM call succeeded"
                    );
                    return Ok(parsed);
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    rate_limit_hint = parse_retry_after(resp.headers());
                    last_error = "HTTP 429 Too Many Requests".to_string();
                    warn!(what, retry_after = ?rate_limit_hint, "LLM provider rate limited");
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(what, status = %resp.status(), "LLM call returned error status");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(
                            what,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "LLM call timed out"
                        );
                    } else {
                        warn!(what, error = %last_error, "LLM call failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

/// Exponential backoff: 250ms, 500ms, 1s, ... capped at 5s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_millis((BACKOFF_BASE_MS << exp).min(BACKOFF_CAP_MS))
}

/// Delay before `attempt`, honoring a server `Retry-After` hint when given.
fn retry_delay(attempt: u32, rate_limit_hint: Option<Duration>) -> Duration {
    match rate_limit_hint {
        Some(hint) => hint.min(RETRY_AFTER_CAP),
        None => backoff_delay(attempt),
    }
}

/// Read a `Retry-After: <seconds>` header if present and well-formed.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
