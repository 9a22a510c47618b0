//! Prompt templates for the LLM boundary.
//!
//! Only the importance-scoring prompt lives here; the reflection engine in
//! `reverie-core` owns its own question/insight prompts since structured
//! parsing of their output is the core's contract.

/// System prompt for the 1–10 poignancy rating.
pub const IMPORTANCE_SYSTEM: &str = "On the scale of 1 to 10, where 1 is purely mundane \
(e.g., waking up, making bed) and 10 is extremely poignant (e.g., a break up, a family \
death), rate the likely poignancy of the following piece of memory. Only return the number.";

/// Build the user prompt for rating one memory from a character's point of
/// view.
#[must_use]
pub fn importance_user(character_name: &str, character_summary: &str, memory: &str) -> String {
    format!("Character: {character_name} — {character_summary}\nMemory: {memory}")
}
