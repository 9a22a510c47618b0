//! Memory formation and access.
//!
//! [`MemoryStore::create`] is the only way a memory comes into existence:
//! it fans out to the embedder and the importance scorer concurrently,
//! commits all-or-nothing, and feeds the character's reflection accounting.
//! Crossing the reflection threshold emits a trigger on a channel consumed
//! by the reflection worker — the caller never waits for synthesis.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::persistence::{ListOrder, SqliteStore};
use crate::provider::{Embedder, ImportanceScorer};
use crate::registry::CharacterRegistry;
use crate::types::{CharacterId, MemoryId, MemoryRecord, SimTime};

/// A reflection request emitted when a character crosses the threshold.
#[derive(Debug, Clone, Copy)]
pub struct ReflectionTrigger {
    /// The character whose accumulated importance crossed the limit.
    pub character: CharacterId,
    /// Simulation time of the memory write that crossed it.
    pub now: SimTime,
}

/// Owns the append-mostly memory collection and the write path into it.
pub struct MemoryStore<E, S> {
    store: Arc<SqliteStore>,
    registry: Arc<CharacterRegistry>,
    embedder: Arc<E>,
    scorer: Arc<S>,
    reflection_limit: u32,
    reflection_tx: mpsc::UnboundedSender<ReflectionTrigger>,
}

impl<E: Embedder, S: ImportanceScorer> MemoryStore<E, S> {
    /// Create a memory store.
    ///
    /// `reflection_tx` is the sending half of the trigger channel; hand the
    /// receiving half to [`crate::reflection::ReflectionWorker::spawn`].
    #[must_use]
    pub fn new(
        store: Arc<SqliteStore>,
        registry: Arc<CharacterRegistry>,
        embedder: Arc<E>,
        scorer: Arc<S>,
        config: &MemoryConfig,
        reflection_tx: mpsc::UnboundedSender<ReflectionTrigger>,
    ) -> Self {
        Self {
            store,
            registry,
            embedder,
            scorer,
            reflection_limit: config.reflection_limit,
            reflection_tx,
        }
    }

    /// The per-character state registry backing this store.
    #[must_use]
    pub fn registry(&self) -> &Arc<CharacterRegistry> {
        &self.registry
    }

    /// Log a new experience for a character.
    ///
    /// The embedding and the importance rating are requested concurrently
    /// and both must succeed before anything is written — a half-initialized
    /// record is never visible. The scored importance feeds the character's
    /// reflection sum; crossing the configured limit resets the sum and
    /// emits a detached reflection trigger.
    ///
    /// # Errors
    ///
    /// Fails without writing if either provider call exhausts its retry
    /// budget, if the embedding dimension is wrong, or on storage errors.
    pub async fn create(
        &self,
        character: CharacterId,
        text: &str,
        now: SimTime,
    ) -> Result<MemoryId> {
        let profile = self.registry.profile(character)?;

        let (embedding, importance) = tokio::try_join!(
            self.embedder.embed(text),
            self.scorer.score(&profile, text),
        )?;

        let record = MemoryRecord {
            id: MemoryId::new(),
            character_id: character,
            text: text.to_string(),
            embedding,
            importance,
            occurred_at: now,
            accessed_at: now,
        };
        self.store.insert(&record)?;

        let outcome = self
            .registry
            .add_importance(character, importance, self.reflection_limit)?;

        debug!(
            character = %character,
            memory = %record.id,
            importance = %importance,
            reflection_sum = outcome.new_sum,
            tick = now.tick,
            "Memory created"
        );

        if outcome.crossed {
            let trigger = ReflectionTrigger { character, now };
            if self.reflection_tx.send(trigger).is_err() {
                warn!(
                    character = %character,
                    "Reflection threshold crossed but no worker is listening"
                );
            }
        }

        Ok(record.id)
    }

    /// The `n` most recent memories for a character, newest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn get_latest(&self, character: CharacterId, n: usize) -> Result<Vec<MemoryRecord>> {
        self.store
            .list_by_character(character, ListOrder::NewestFirst, Some(n))
    }

    /// Fetch a single memory by id.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::MemoryNotFound`] for unknown ids, or storage
    /// errors.
    pub fn get_by_id(&self, id: MemoryId) -> Result<MemoryRecord> {
        self.store
            .get_by_id(id)?
            .ok_or(MemoryError::MemoryNotFound(id))
    }

    /// Move `accessed_at` to `now` for the given records.
    ///
    /// Per-record and last-writer-wins; concurrent calls over overlapping id
    /// sets are safe. Unknown ids are skipped silently.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn touch_accessed(&self, ids: &[MemoryId], now: SimTime) -> Result<()> {
        for id in ids {
            self.store.update_accessed_at(*id, now)?;
        }
        Ok(())
    }

    /// Number of memories in a character's partition.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn count(&self, character: CharacterId) -> Result<usize> {
        self.store.count_by_character(character)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FixedImportance, HashEmbedder};
    use crate::registry::CharacterProfile;

    fn harness(
        limit: u32,
    ) -> (
        MemoryStore<HashEmbedder, FixedImportance>,
        mpsc::UnboundedReceiver<ReflectionTrigger>,
        CharacterId,
    ) {
        let store = Arc::new(SqliteStore::open_in_memory(16).expect("open"));
        let registry = Arc::new(CharacterRegistry::new());
        let character = registry.register(CharacterProfile::new("Tess", "a night-shift guard"));

        let config = MemoryConfig {
            reflection_limit: limit,
            ..MemoryConfig::default()
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let store = MemoryStore::new(
            store,
            registry,
            Arc::new(HashEmbedder::new(16)),
            Arc::new(FixedImportance::new(3)),
            &config,
            tx,
        );
        (store, rx, character)
    }

    #[tokio::test]
    async fn create_then_get_by_id_round_trips() {
        let (store, _rx, character) = harness(100);

        let id = store
            .create(character, "Heard wolves howling past the gate", SimTime::now(42))
            .await
            .expect("create");

        let record = store.get_by_id(id).expect("get");
        assert_eq!(record.text, "Heard wolves howling past the gate");
        assert_eq!(record.importance.value(), 3);
        assert_eq!(record.embedding.dimensions(), 16);
        assert_eq!(record.occurred_at, record.accessed_at);
    }

    #[tokio::test]
    async fn create_for_unknown_character_writes_nothing() {
        let (store, _rx, _character) = harness(100);
        let stranger = CharacterId::new();

        let err = store
            .create(stranger, "should not persist", SimTime::now(1))
            .await
            .expect_err("unknown character");
        assert!(matches!(err, MemoryError::CharacterNotFound(_)));
        assert_eq!(store.count(stranger).expect("count"), 0);
    }

    #[tokio::test]
    async fn threshold_crossing_emits_one_trigger() {
        // Importance is fixed at 3; limit 7 crosses on the third create.
        let (store, mut rx, character) = harness(7);

        for tick in 1..=3 {
            store
                .create(character, "a patrol lap around the wall", SimTime::now(tick))
                .await
                .expect("create");
        }

        let trigger = rx.try_recv().expect("one trigger");
        assert_eq!(trigger.character, character);
        assert_eq!(trigger.now.tick, 3);
        assert!(rx.try_recv().is_err(), "no second trigger yet");
        assert_eq!(store.registry().reflection_sum(character).expect("sum"), 0);
    }

    #[tokio::test]
    async fn create_survives_dropped_worker() {
        let (store, rx, character) = harness(3);
        drop(rx);

        // The crossing is logged, not fatal.
        store
            .create(character, "the worker is gone", SimTime::now(5))
            .await
            .expect("create");
        assert_eq!(store.count(character).expect("count"), 1);
    }

    #[tokio::test]
    async fn get_latest_is_newest_first_and_bounded() {
        let (store, _rx, character) = harness(1_000);

        for (tick, text) in [(10, "dawn"), (20, "noon"), (30, "dusk")] {
            store
                .create(character, text, SimTime::now(tick))
                .await
                .expect("create");
        }

        let latest = store.get_latest(character, 2).expect("latest");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].text, "dusk");
        assert_eq!(latest[1].text, "noon");
    }

    #[tokio::test]
    async fn touch_accessed_overlapping_sets() {
        let (store, _rx, character) = harness(1_000);

        let a = store.create(character, "first", SimTime::now(1)).await.expect("create");
        let b = store.create(character, "second", SimTime::now(2)).await.expect("create");

        store.touch_accessed(&[a, b], SimTime::now(100)).expect("touch");
        store.touch_accessed(&[b], SimTime::now(200)).expect("touch");

        assert_eq!(store.get_by_id(a).expect("get").accessed_at.tick, 100);
        assert_eq!(store.get_by_id(b).expect("get").accessed_at.tick, 200);
        // occurred_at is untouched.
        assert_eq!(store.get_by_id(a).expect("get").occurred_at.tick, 1);
    }
}
