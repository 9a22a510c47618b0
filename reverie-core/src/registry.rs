//! Per-character state registry.
//!
//! The characters themselves (identity, persona summary) belong to an
//! external character-management collaborator; this registry is the explicit,
//! shared-state component through which the memory core reads and updates the
//! per-character reflection accounting. All mutation happens under a single
//! per-entry guard, so the threshold check-and-reset and the reflection
//! single-flight flags are atomic per character.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::types::{CharacterId, Importance};

/// Identity and persona context for one character.
///
/// The summary is the context handed to the importance scorer so ratings are
/// made from the character's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    /// Unique character identifier.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Short persona summary (occupation, disposition, current situation).
    pub summary: String,
}

impl CharacterProfile {
    /// Create a profile with a fresh random id.
    #[must_use]
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            summary: summary.into(),
        }
    }
}

/// Outcome of adding importance to a character's reflection sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdOutcome {
    /// The running sum after the add (0 when the threshold fired).
    pub new_sum: u32,
    /// Whether the configured limit was reached, resetting the sum.
    pub crossed: bool,
}

#[derive(Debug)]
struct CharacterState {
    profile: CharacterProfile,
    reflection_sum: u32,
    reflection_in_flight: bool,
    reflection_pending: bool,
}

/// Registry of all characters known to the memory system.
#[derive(Debug, Default)]
pub struct CharacterRegistry {
    characters: DashMap<CharacterId, CharacterState>,
}

impl CharacterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a character. Re-registering an id replaces the profile but
    /// keeps the reflection accounting.
    pub fn register(&self, profile: CharacterProfile) -> CharacterId {
        let id = profile.id;
        self.characters
            .entry(id)
            .and_modify(|state| state.profile = profile.clone())
            .or_insert_with(|| CharacterState {
                profile,
                reflection_sum: 0,
                reflection_in_flight: false,
                reflection_pending: false,
            });
        id
    }

    /// Look up a character's profile.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CharacterNotFound`] for unknown ids.
    pub fn profile(&self, id: CharacterId) -> Result<CharacterProfile> {
        self.characters
            .get(&id)
            .map(|state| state.profile.clone())
            .ok_or(MemoryError::CharacterNotFound(id))
    }

    /// Current accumulated importance since the last reflection cycle.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CharacterNotFound`] for unknown ids.
    pub fn reflection_sum(&self, id: CharacterId) -> Result<u32> {
        self.characters
            .get(&id)
            .map(|state| state.reflection_sum)
            .ok_or(MemoryError::CharacterNotFound(id))
    }

    /// Add a memory's importance to the character's reflection sum.
    ///
    /// The add, the limit comparison, and the reset all happen under one
    /// guard: two concurrent callers can never both observe the crossing.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CharacterNotFound`] for unknown ids.
    pub fn add_importance(
        &self,
        id: CharacterId,
        importance: Importance,
        limit: u32,
    ) -> Result<ThresholdOutcome> {
        let mut state = self
            .characters
            .get_mut(&id)
            .ok_or(MemoryError::CharacterNotFound(id))?;

        state.reflection_sum += u32::from(importance.value());
        if state.reflection_sum >= limit {
            debug!(
                character = %id,
                sum = state.reflection_sum,
                limit,
                "Reflection threshold crossed"
            );
            state.reflection_sum = 0;
            return Ok(ThresholdOutcome {
                new_sum: 0,
                crossed: true,
            });
        }

        Ok(ThresholdOutcome {
            new_sum: state.reflection_sum,
            crossed: false,
        })
    }

    /// Reset the reflection sum to zero without triggering anything.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CharacterNotFound`] for unknown ids.
    pub fn reset_reflection_sum(&self, id: CharacterId) -> Result<()> {
        let mut state = self
            .characters
            .get_mut(&id)
            .ok_or(MemoryError::CharacterNotFound(id))?;
        state.reflection_sum = 0;
        Ok(())
    }

    /// Try to claim the reflection slot for a character.
    ///
    /// Returns `true` if the caller now owns the (single) in-flight cycle.
    /// Returns `false` if a cycle is already running, in which case the
    /// trigger is coalesced into a pending re-run instead.
    pub fn begin_reflection(&self, id: CharacterId) -> bool {
        let Some(mut state) = self.characters.get_mut(&id) else {
            return false;
        };
        if state.reflection_in_flight {
            state.reflection_pending = true;
            return false;
        }
        state.reflection_in_flight = true;
        true
    }

    /// Release the reflection slot after a cycle completes.
    ///
    /// Returns `true` if a coalesced trigger arrived while the cycle ran
    /// (and clears it), telling the worker to run again.
    pub fn finish_reflection(&self, id: CharacterId) -> bool {
        let Some(mut state) = self.characters.get_mut(&id) else {
            return false;
        };
        state.reflection_in_flight = false;
        std::mem::take(&mut state.reflection_pending)
    }

    /// Number of registered characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_one() -> (CharacterRegistry, CharacterId) {
        let registry = CharacterRegistry::new();
        let id = registry.register(CharacterProfile::new("Mira", "a village herbalist"));
        (registry, id)
    }

    #[test]
    fn accumulates_until_limit_then_resets() {
        let (registry, id) = registry_with_one();

        let out = registry.add_importance(id, Importance::new(3), 8).expect("add");
        assert_eq!(out, ThresholdOutcome { new_sum: 3, crossed: false });

        let out = registry.add_importance(id, Importance::new(4), 8).expect("add");
        assert_eq!(out, ThresholdOutcome { new_sum: 7, crossed: false });

        // 7 + 2 >= 8: crossing resets to zero in the same operation.
        let out = registry.add_importance(id, Importance::new(2), 8).expect("add");
        assert!(out.crossed);
        assert_eq!(out.new_sum, 0);
        assert_eq!(registry.reflection_sum(id).expect("sum"), 0);
    }

    #[test]
    fn unknown_character_is_an_error() {
        let registry = CharacterRegistry::new();
        let id = CharacterId::new();
        assert!(matches!(
            registry.add_importance(id, Importance::new(5), 8),
            Err(MemoryError::CharacterNotFound(_))
        ));
        assert!(registry.profile(id).is_err());
    }

    #[test]
    fn reflection_single_flight() {
        let (registry, id) = registry_with_one();

        assert!(registry.begin_reflection(id), "first claim wins the slot");
        assert!(!registry.begin_reflection(id), "second claim coalesces");
        assert!(!registry.begin_reflection(id), "still coalesced");

        // Finishing reports the coalesced trigger exactly once.
        assert!(registry.finish_reflection(id));
        assert!(registry.begin_reflection(id));
        assert!(!registry.finish_reflection(id), "no pending trigger this time");
    }

    #[test]
    fn concurrent_adds_produce_one_crossing() {
        use std::sync::Arc;

        let (registry, id) = registry_with_one();
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                registry
                    .add_importance(id, Importance::new(4), 40)
                    .expect("add")
                    .crossed
            }));
        }

        let crossings = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|crossed| *crossed)
            .count();

        // 10 adds of 4 against a limit of 40: exactly one thread observes
        // the crossing regardless of interleaving.
        assert_eq!(crossings, 1);
        assert_eq!(registry.reflection_sum(id).expect("sum"), 0);
    }

    #[test]
    fn reregistering_keeps_accounting() {
        let (registry, id) = registry_with_one();
        registry.add_importance(id, Importance::new(5), 100).expect("add");

        let mut profile = registry.profile(id).expect("profile");
        profile.summary = "a retired herbalist".to_string();
        registry.register(profile);

        assert_eq!(registry.reflection_sum(id).expect("sum"), 5);
        assert_eq!(registry.profile(id).expect("profile").summary, "a retired herbalist");
    }
}
