//! Core type definitions for the Reverie memory system.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a character whose experiences are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    /// Create a new random character ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a single memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulation timestamp measured in ticks since world creation.
///
/// The tick is monotonic within a character's timeline and is the single
/// clock used for both memory formation (`occurred_at`) and retrieval
/// touches (`accessed_at`). Wall-clock time rides along as save metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime {
    /// Simulation tick (monotonically increasing).
    pub tick: u64,
    /// Corresponding real-world wall-clock time (for save metadata).
    pub real_time: DateTime<Utc>,
}

impl SimTime {
    /// Ticks per simulated hour, the unit of recency decay.
    pub const TICKS_PER_HOUR: f64 = 1_000.0;

    /// Create a new simulation timestamp at the current wall-clock time.
    #[must_use]
    pub fn now(tick: u64) -> Self {
        Self {
            tick,
            real_time: Utc::now(),
        }
    }

    /// Simulated hours elapsed since `other`. Saturates at zero when
    /// `other` is in the future.
    #[must_use]
    pub fn hours_since(&self, other: &Self) -> f64 {
        (self.tick.saturating_sub(other.tick)) as f64 / Self::TICKS_PER_HOUR
    }
}

// ---------------------------------------------------------------------------
// Importance
// ---------------------------------------------------------------------------

/// Poignancy of a memory on the 1–10 scale.
///
/// 1 is purely mundane (waking up, making the bed), 10 is extremely
/// poignant (a break-up, a family death). The constructor clamps, so the
/// `1..=10` invariant holds for every persisted record regardless of what
/// the scoring provider returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Importance(u8);

impl Importance {
    /// The least poignant rating.
    pub const MIN: Self = Self(1);
    /// The most poignant rating.
    pub const MAX: Self = Self(10);

    /// Create an importance rating, clamping into `1..=10`.
    #[must_use]
    pub fn new(raw: i64) -> Self {
        Self(raw.clamp(1, 10) as u8)
    }

    /// The raw rating value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
///
/// The dimension is fixed per store instance and validated on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings.
    /// Returns 0.0 for mismatched dimensions or zero-magnitude vectors.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Memory Record
// ---------------------------------------------------------------------------

/// One attributed textual experience.
///
/// Created exclusively through the memory store; never structurally mutated
/// afterward except `accessed_at`, which moves forward on retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, assigned at creation.
    pub id: MemoryId,
    /// Owning character (exclusive partition owner).
    pub character_id: CharacterId,
    /// The memory content.
    pub text: String,
    /// Embedding of `text`; dimension constant across a store instance.
    pub embedding: Embedding,
    /// Poignancy rating, always within 1–10.
    pub importance: Importance,
    /// Simulation time at which the memory was formed.
    pub occurred_at: SimTime,
    /// Simulation time of the last retrieval; equals `occurred_at` until
    /// the record is first touched.
    pub accessed_at: SimTime,
}

// ---------------------------------------------------------------------------
// Retrieval Score
// ---------------------------------------------------------------------------

/// Composite score used to rank memories during retrieval.
///
/// The unweighted sum of three min-max normalized signals (similarity,
/// importance, recency), so it always lands in `[0, 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Create a retrieval score from a raw f64.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_clamps_both_ends() {
        assert_eq!(Importance::new(-3).value(), 1);
        assert_eq!(Importance::new(0).value(), 1);
        assert_eq!(Importance::new(7).value(), 7);
        assert_eq!(Importance::new(11).value(), 10);
        assert_eq!(Importance::new(i64::MAX).value(), 10);
        assert_eq!(Importance::new(0), Importance::MIN);
        assert_eq!(Importance::new(99), Importance::MAX);
    }

    #[test]
    fn hours_since_uses_ticks() {
        let t0 = SimTime::now(0);
        let t1 = SimTime::now(2_500);
        assert!((t1.hours_since(&t0) - 2.5).abs() < 1e-9);
        // Saturates rather than going negative.
        assert_eq!(t0.hours_since(&t1), 0.0);
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        let a = Embedding(vec![1.0, 0.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        let c = Embedding(vec![0.0, 1.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
        assert!(a.cosine_similarity(&c).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_dimensions_is_zero() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn retrieval_score_is_totally_ordered() {
        let hi = RetrievalScore::new(2.4);
        let lo = RetrievalScore::new(0.3);
        assert!(hi > lo);
    }
}
