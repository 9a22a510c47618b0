//! Threshold-triggered reflection — distilling experience into insight.
//!
//! When a character's accumulated importance crosses the configured limit,
//! a reflection cycle runs: recent memories become a numbered transcript,
//! the text generator proposes a few salient questions about it, each
//! question pulls its own relevant memories, and the insights distilled from
//! those become new first-person memories. The loop is self-referential by
//! design — insight writes feed the same threshold accounting — so the
//! [`ReflectionWorker`] enforces at-most-one cycle in flight per character
//! and bounds how many cycles may chain back-to-back.
//!
//! Generator output is a schema-validated JSON string array; anything else
//! is rejected and the affected question or insight is skipped. A cycle
//! never propagates an error to whoever triggered it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::provider::{CompletionRequest, Embedder, ImportanceScorer, ProviderError, TextGenerator};
use crate::registry::CharacterRegistry;
use crate::retrieval::RelevanceRanker;
use crate::store::{MemoryStore, ReflectionTrigger};
use crate::types::{CharacterId, MemoryRecord, SimTime};

/// Synthesizes higher-level insight memories from accumulated experience.
pub struct ReflectionEngine<E, S, G> {
    store: Arc<MemoryStore<E, S>>,
    ranker: Arc<RelevanceRanker<E>>,
    generator: Arc<G>,
    config: MemoryConfig,
}

impl<E, S, G> Clone for ReflectionEngine<E, S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ranker: Arc::clone(&self.ranker),
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
        }
    }
}

impl<E, S, G> ReflectionEngine<E, S, G>
where
    E: Embedder + 'static,
    S: ImportanceScorer + 'static,
    G: TextGenerator + 'static,
{
    /// Create a reflection engine over the given store, ranker, and
    /// generator.
    #[must_use]
    pub fn new(
        store: Arc<MemoryStore<E, S>>,
        ranker: Arc<RelevanceRanker<E>>,
        generator: Arc<G>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            ranker,
            generator,
            config,
        }
    }

    /// The registry shared with the memory store.
    #[must_use]
    pub fn registry(&self) -> &Arc<CharacterRegistry> {
        self.store.registry()
    }

    /// Run one reflection cycle for a character.
    ///
    /// Side-effecting, no return value, and never propagates a failure:
    /// every error is logged and the affected question or insight skipped.
    /// Callers normally do not invoke this directly — the
    /// [`ReflectionWorker`] does, with the single-flight guarantee.
    pub async fn generate(&self, character: CharacterId, now: SimTime) {
        debug!(character = %character, tick = now.tick, "Generating reflection");

        let recent = match self.store.get_latest(character, self.config.questions_context) {
            Ok(memories) => memories,
            Err(e) => {
                warn!(character = %character, error = %e, "Reflection aborted: cannot load recent memories");
                return;
            }
        };
        if recent.is_empty() {
            debug!(character = %character, "Nothing to reflect on");
            return;
        }

        let questions = match self.ask_questions(character, &recent).await {
            Ok(questions) => questions,
            Err(e) => {
                warn!(character = %character, error = %e, "Reflection aborted: question generation failed");
                return;
            }
        };

        debug!(
            character = %character,
            questions = questions.len(),
            from_memories = recent.len(),
            "Reflection questions generated"
        );

        let mut cycle = JoinSet::new();
        for question in questions {
            let engine = self.clone();
            cycle.spawn(async move {
                engine.answer_question(character, &question, now).await;
            });
        }
        while cycle.join_next().await.is_some() {}

        info!(character = %character, "Reflection cycle completed");
    }

    /// Ask the generator for the cycle's salient questions.
    async fn ask_questions(
        &self,
        character: CharacterId,
        recent: &[MemoryRecord],
    ) -> std::result::Result<Vec<String>, ProviderError> {
        let profile = self
            .store
            .registry()
            .profile(character)
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        let n = self.config.questions_per_cycle;

        let system = format!(
            "You are the inner voice of {}, {}. You are reviewing recent \
             experiences during a quiet moment.",
            profile.name, profile.summary
        );
        let user = format!(
            "{transcript}\nGiven only the information above, what are the {n} \
             most salient high-level questions we can answer about the \
             subjects in the statements? Respond with a JSON array of \
             exactly {n} strings and nothing else.",
            transcript = transcript(recent),
        );

        let raw = self
            .generator
            .complete(CompletionRequest::new(system, user))
            .await?;

        let mut questions = parse_string_list(&raw)?;
        questions.truncate(n);
        Ok(questions)
    }

    /// Answer one reflection question and store the resulting insights.
    async fn answer_question(&self, character: CharacterId, question: &str, now: SimTime) {
        let relevant = match self
            .ranker
            .get_relevant(character, question, self.config.insight_retrieval_k, now, true)
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                warn!(character = %character, question, error = %e, "Skipping question: retrieval failed");
                return;
            }
        };
        if relevant.is_empty() {
            debug!(character = %character, question, "Skipping question: no relevant memories");
            return;
        }

        let profile = match self.store.registry().profile(character) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(character = %character, error = %e, "Skipping question: unknown character");
                return;
            }
        };
        let m = self.config.insights_per_question;

        let system = format!(
            "You are the inner voice of {}, {}.",
            profile.name, profile.summary
        );
        let user = format!(
            "Statements about {name}\n{transcript}\nWhat high-level insights \
             can you infer from the above statements? Speak in the first \
             person as {name}. Respond with a JSON array of at most {m} \
             strings and nothing else.",
            name = profile.name,
            transcript = transcript(&relevant),
        );

        let insights = match self
            .generator
            .complete(CompletionRequest::new(system, user))
            .await
            .and_then(|raw| parse_string_list(&raw))
        {
            Ok(mut insights) => {
                insights.truncate(m);
                insights
            }
            Err(e) => {
                warn!(character = %character, question, error = %e, "Skipping question: insight generation failed");
                return;
            }
        };

        for insight in insights {
            match self.store.create(character, &insight, now).await {
                Ok(id) => debug!(character = %character, memory = %id, "Insight memory created"),
                Err(e) => {
                    warn!(character = %character, insight, error = %e, "Skipping insight: create failed");
                }
            }
        }
    }
}

/// Render memories as the numbered transcript fed to the generator.
fn transcript(memories: &[MemoryRecord]) -> String {
    let mut out = String::new();
    for (i, memory) in memories.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, memory.text));
    }
    out
}

/// Parse a generator response as a JSON array of non-empty strings.
///
/// The output contract is strict: anything that is not a JSON string array
/// is a permanent provider failure (retrying the parse would not help).
/// Whitespace-only entries are dropped.
fn parse_string_list(raw: &str) -> std::result::Result<Vec<String>, ProviderError> {
    let parsed: Vec<String> = serde_json::from_str(raw.trim())
        .map_err(|e| ProviderError::Permanent(format!("expected a JSON string array: {e}")))?;
    Ok(parsed
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Background consumer of reflection triggers.
///
/// Guarantees per character: at most one cycle in flight; triggers arriving
/// mid-cycle coalesce into a single pending re-run; at most
/// `max_chained_cycles` consecutive re-runs before synthesis yields to the
/// next organic memory write.
pub struct ReflectionWorker;

impl ReflectionWorker {
    /// Spawn the worker task over a trigger channel.
    ///
    /// The returned handle finishes when every trigger sender is dropped.
    pub fn spawn<E, S, G>(
        engine: ReflectionEngine<E, S, G>,
        mut triggers: mpsc::UnboundedReceiver<ReflectionTrigger>,
    ) -> JoinHandle<()>
    where
        E: Embedder + 'static,
        S: ImportanceScorer + 'static,
        G: TextGenerator + 'static,
    {
        tokio::spawn(async move {
            while let Some(trigger) = triggers.recv().await {
                let registry = Arc::clone(engine.registry());
                if !registry.begin_reflection(trigger.character) {
                    debug!(
                        character = %trigger.character,
                        "Reflection already in flight; trigger coalesced"
                    );
                    continue;
                }

                let engine = engine.clone();
                let max_chained = engine.config.max_chained_cycles.max(1);
                tokio::spawn(async move {
                    let mut runs = 0_u32;
                    loop {
                        engine.generate(trigger.character, trigger.now).await;
                        runs += 1;

                        let pending = registry.finish_reflection(trigger.character);
                        if !pending {
                            break;
                        }
                        if runs >= max_chained {
                            debug!(
                                character = %trigger.character,
                                runs,
                                "Chained reflection budget spent; waiting for the next write"
                            );
                            break;
                        }
                        if !registry.begin_reflection(trigger.character) {
                            break;
                        }
                    }
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CharacterId, Embedding, Importance, MemoryId};

    fn record(text: &str) -> MemoryRecord {
        let when = SimTime::now(1);
        MemoryRecord {
            id: MemoryId::new(),
            character_id: CharacterId::new(),
            text: text.to_string(),
            embedding: Embedding(vec![1.0]),
            importance: Importance::new(5),
            occurred_at: when,
            accessed_at: when,
        }
    }

    #[test]
    fn transcript_is_numbered_in_order() {
        let memories = vec![record("saw the baker"), record("bought bread")];
        assert_eq!(transcript(&memories), "1. saw the baker\n2. bought bread\n");
    }

    #[test]
    fn parse_accepts_string_array() {
        let parsed = parse_string_list(r#"["one", " two ", "three"]"#).expect("parse");
        assert_eq!(parsed, vec!["one", "two", "three"]);
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        let parsed = parse_string_list("\n  [\"only\"]  \n").expect("parse");
        assert_eq!(parsed, vec!["only"]);
    }

    #[test]
    fn parse_drops_blank_entries() {
        let parsed = parse_string_list(r#"["keep", "", "   "]"#).expect("parse");
        assert_eq!(parsed, vec!["keep"]);
    }

    #[test]
    fn parse_rejects_prose() {
        let err = parse_string_list("1. a numbered list\n2. like the old days")
            .expect_err("prose is not a string array");
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[test]
    fn parse_rejects_non_string_arrays() {
        assert!(parse_string_list("[1, 2, 3]").is_err());
        assert!(parse_string_list(r#"{"questions": ["a"]}"#).is_err());
    }
}
