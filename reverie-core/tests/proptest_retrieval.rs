//! Property-based tests for the retrieval ranking invariants.
//!
//! Uses `proptest` to verify the ranking function under random candidate
//! sets: result bounds, sort order, normalization ranges, recency
//! monotonicity, and the priority→budget mapping.

use proptest::prelude::*;

use reverie_core::retrieval::scoring::{normalize, rank, recency_signal};
use reverie_core::retrieval::max_memories_for_priority;
use reverie_core::types::{
    CharacterId, Embedding, Importance, MemoryId, MemoryRecord, SimTime,
};

const DIMS: usize = 4;

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_embedding() -> impl Strategy<Value = Embedding> {
    prop::collection::vec(-1.0..1.0f32, DIMS).prop_map(Embedding)
}

fn arb_record() -> impl Strategy<Value = MemoryRecord> {
    (
        arb_embedding(),
        -5..25i64,          // raw importance, may be out of range
        0..1_000_000u64,    // occurred tick
        0..1_000_000u64,    // access delay in ticks
    )
        .prop_map(|(embedding, raw_importance, occurred, delay)| {
            let occurred_at = SimTime::now(occurred);
            MemoryRecord {
                id: MemoryId::new(),
                character_id: CharacterId::new(),
                text: "generated".to_string(),
                embedding,
                importance: Importance::new(raw_importance),
                occurred_at,
                accessed_at: SimTime::now(occurred.saturating_add(delay)),
            }
        })
}

// ---------------------------------------------------------------------------
// Property: importance is always clamped into [1, 10]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn importance_always_in_range(raw in i64::MIN..i64::MAX) {
        let importance = Importance::new(raw);
        prop_assert!((1..=10).contains(&importance.value()));
    }
}

// ---------------------------------------------------------------------------
// Property: ranking returns every candidate, sorted non-increasing
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn rank_is_complete_and_sorted(
        candidates in prop::collection::vec(arb_record(), 0..40),
        query in arb_embedding(),
        now_tick in 1_000_000..4_000_000u64,
    ) {
        let ranked = rank(&query, candidates.clone(), &SimTime::now(now_tick), 0.99);

        prop_assert_eq!(ranked.len(), candidates.len());
        for pair in ranked.windows(2) {
            prop_assert!(
                pair[0].score >= pair[1].score,
                "scores must be non-increasing"
            );
        }
        for entry in &ranked {
            let score = entry.score.value();
            prop_assert!(score.is_finite(), "composite score must never be NaN");
            prop_assert!((0.0..=3.0 + 1e-9).contains(&score));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: top-k truncation never exceeds min(k, candidates)
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn top_k_is_bounded(
        candidates in prop::collection::vec(arb_record(), 0..30),
        query in arb_embedding(),
        k in 0..50usize,
    ) {
        let mut ranked = rank(&query, candidates.clone(), &SimTime::now(2_000_000), 0.99);
        ranked.truncate(k);
        prop_assert!(ranked.len() <= k.min(candidates.len()));
    }
}

// ---------------------------------------------------------------------------
// Property: normalization lands in [0, 1] and preserves length
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn normalize_bounds_and_length(raw in prop::collection::vec(-1e6..1e6f64, 0..50)) {
        let normed = normalize(&raw);
        prop_assert_eq!(normed.len(), raw.len());
        for v in &normed {
            prop_assert!((0.0..=1.0).contains(v), "normalized value {v} out of range");
        }
    }

    #[test]
    fn normalize_constant_signal_is_all_zero(value in -1e6..1e6f64, len in 1..20usize) {
        let normed = normalize(&vec![value; len]);
        prop_assert!(normed.iter().all(|&v| v == 0.0));
    }
}

// ---------------------------------------------------------------------------
// Property: recency strictly decreases with elapsed time
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn recency_strictly_monotone(
        accessed in 0..1_000_000u64,
        delta_a in 1..500_000u64,
        extra in 1..500_000u64,
        decay_base in 0.5..0.999f64,
    ) {
        let accessed_at = SimTime::now(accessed);
        let earlier = SimTime::now(accessed + delta_a);
        let later = SimTime::now(accessed + delta_a + extra);

        let fresh = recency_signal(&accessed_at, &earlier, decay_base);
        let stale = recency_signal(&accessed_at, &later, decay_base);
        prop_assert!(fresh > stale, "recency must strictly decrease as time passes");
    }
}

// ---------------------------------------------------------------------------
// Property: memory budget is monotonically non-increasing in priority
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn budget_non_increasing(
        max_priority in 1..20u32,
        max_memories in 1..100usize,
    ) {
        let mut previous = usize::MAX;
        for priority in 0..=max_priority + 5 {
            let budget = max_memories_for_priority(priority, max_priority, max_memories);
            prop_assert!(budget <= previous);
            previous = budget;
        }
    }
}
