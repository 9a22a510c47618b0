//! Per-signal scoring for memory retrieval.
//!
//! Score = norm(Similarity) + norm(Importance) + norm(Recency)
//!
//! Where:
//!   Similarity(m) = cosine(query_embedding, m.embedding)
//!   Importance(m) = stored poignancy rating (1–10)
//!   Recency(m)    = decay_base ^ hours_since(m.accessed_at)
//!
//! Recency decays from the last *access*, not from creation: a memory the
//! character keeps returning to stays salient. Each signal is min-max
//! normalized independently across the candidate set before summing, so no
//! signal's native scale dominates.

use crate::types::{Embedding, MemoryRecord, RetrievalScore, SimTime};

/// Normalized per-signal contributions to a composite score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    /// Normalized cosine similarity to the query.
    pub similarity: f64,
    /// Normalized stored importance.
    pub importance: f64,
    /// Normalized recency-of-access decay.
    pub recency: f64,
}

/// A candidate memory with its composite retrieval score.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    /// The scored memory.
    pub memory: MemoryRecord,
    /// Sum of the three normalized signals, in `[0, 3]`.
    pub score: RetrievalScore,
    /// Per-signal breakdown (useful for debugging and inspection).
    pub breakdown: ScoreBreakdown,
}

/// Recency signal: exponential fading of salience since last access.
///
/// Strictly decreasing in elapsed time for any `decay_base` in `(0, 1)`.
#[must_use]
pub fn recency_signal(accessed_at: &SimTime, now: &SimTime, decay_base: f64) -> f64 {
    decay_base.powf(now.hours_since(accessed_at))
}

/// Min-max normalize a signal across the candidate set.
///
/// Degenerate case: when every raw value is equal (including the
/// single-candidate set) the signal carries no ranking information, so every
/// candidate gets `0.0` rather than a division by zero.
#[must_use]
pub fn normalize(raw: &[f64]) -> Vec<f64> {
    let Some(first) = raw.first() else {
        return Vec::new();
    };

    let (min, max) = raw.iter().skip(1).fold((*first, *first), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });

    let span = max - min;
    if span <= f64::EPSILON {
        return vec![0.0; raw.len()];
    }

    raw.iter().map(|&v| (v - min) / span).collect()
}

/// Score and rank a candidate set against a query embedding.
///
/// Returns all candidates sorted by descending composite score. Ties break
/// by `occurred_at` descending, then by id ascending, so equal-scoring sets
/// always come back in the same order.
#[must_use]
pub fn rank(
    query_embedding: &Embedding,
    candidates: Vec<MemoryRecord>,
    now: &SimTime,
    decay_base: f64,
) -> Vec<RankedMemory> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let similarity_raw: Vec<f64> = candidates
        .iter()
        .map(|m| f64::from(query_embedding.cosine_similarity(&m.embedding)))
        .collect();
    let importance_raw: Vec<f64> = candidates
        .iter()
        .map(|m| f64::from(m.importance.value()))
        .collect();
    let recency_raw: Vec<f64> = candidates
        .iter()
        .map(|m| recency_signal(&m.accessed_at, now, decay_base))
        .collect();

    let similarity = normalize(&similarity_raw);
    let importance = normalize(&importance_raw);
    let recency = normalize(&recency_raw);

    let mut ranked: Vec<RankedMemory> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, memory)| {
            let breakdown = ScoreBreakdown {
                similarity: similarity[i],
                importance: importance[i],
                recency: recency[i],
            };
            RankedMemory {
                memory,
                score: RetrievalScore::new(
                    breakdown.similarity + breakdown.importance + breakdown.recency,
                ),
                breakdown,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.memory.occurred_at.tick.cmp(&a.memory.occurred_at.tick))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });

    ranked
}
