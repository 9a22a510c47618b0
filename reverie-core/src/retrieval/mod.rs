//! Relevance-ranked memory retrieval.
//!
//! Retrieval combines three equally weighted, independently normalized
//! signals — semantic similarity, stored importance, and recency of last
//! access — into a composite score in `[0, 3]`, then returns the top-k
//! candidates. Embedding the query is the only network call on this path;
//! everything after the candidate load is pure CPU work in
//! [`scoring`].

pub mod scoring;

use std::sync::Arc;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::persistence::{ListOrder, SqliteStore};
use crate::provider::Embedder;
use crate::types::{CharacterId, MemoryRecord, SimTime};

pub use scoring::{RankedMemory, ScoreBreakdown};

/// Memory budget for a task of the given priority.
///
/// Lower priority numbers are more urgent and get a larger budget:
/// the most urgent tasks receive `max_memories`, the least urgent roughly
/// `max_memories / max_priority`. Monotonically non-increasing in
/// `priority`. Pure — no I/O, no failure mode.
#[must_use]
pub fn max_memories_for_priority(
    priority: u32,
    max_priority: u32,
    max_memories: usize,
) -> usize {
    if max_priority == 0 {
        return max_memories;
    }
    let clamped = priority.min(max_priority);
    let fraction = f64::from(max_priority + 1 - clamped) / f64::from(max_priority);
    (fraction * max_memories as f64).round() as usize
}

/// Ranks a character's memory partition against free-text queries.
pub struct RelevanceRanker<E> {
    store: Arc<SqliteStore>,
    embedder: Arc<E>,
    config: RetrievalConfig,
}

impl<E: Embedder> RelevanceRanker<E> {
    /// Create a ranker over the given store and embedder.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, embedder: Arc<E>, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Retrieve the top-`k` most relevant memories for a query.
    ///
    /// An empty partition or `k == 0` yields an empty result, not an error;
    /// fewer candidates than `k` returns them all. When `touch` is set the
    /// returned records' `accessed_at` is moved to `now` before returning,
    /// boosting their recency for subsequent queries.
    ///
    /// # Errors
    ///
    /// Fails if the query cannot be embedded within the provider's retry
    /// budget or on storage errors.
    pub async fn get_relevant(
        &self,
        character: CharacterId,
        query: &str,
        k: usize,
        now: SimTime,
        touch: bool,
    ) -> Result<Vec<MemoryRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let candidates = self
            .store
            .list_by_character(character, ListOrder::NewestFirst, None)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_count = candidates.len();
        let mut ranked = scoring::rank(&query_embedding, candidates, &now, self.config.decay_base);
        ranked.truncate(k);

        debug!(
            character = %character,
            query_len = query.len(),
            candidates = candidate_count,
            returned = ranked.len(),
            top_score = ranked.first().map_or(0.0, |r| r.score.value()),
            "Ranked memory retrieval"
        );

        let records: Vec<MemoryRecord> = ranked.into_iter().map(|r| r.memory).collect();

        if touch {
            for record in &records {
                self.store.update_accessed_at(record.id, now)?;
            }
        }

        Ok(records)
    }

    /// Retrieve with the configured default `k`, touching access times.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::get_relevant`].
    pub async fn get_relevant_default(
        &self,
        character: CharacterId,
        query: &str,
        now: SimTime,
    ) -> Result<Vec<MemoryRecord>> {
        self.get_relevant(character, query, self.config.top_k, now, true)
            .await
    }

    /// Memory budget for a task priority, using the configured bounds.
    #[must_use]
    pub fn memory_budget(&self, priority: u32) -> usize {
        max_memories_for_priority(
            priority,
            self.config.max_task_priority,
            self.config.max_task_memories,
        )
    }
}
