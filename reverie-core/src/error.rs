//! Error types for the Reverie core library.

use thiserror::Error;

use crate::provider::ProviderError;

/// Top-level error type for all core memory operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// A memory with the given ID was not found.
    #[error("Memory not found: {0}")]
    MemoryNotFound(crate::MemoryId),

    /// Character not registered with the system.
    #[error("Character not found: {0}")]
    CharacterNotFound(crate::CharacterId),

    /// An embedding did not match the store's configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the store was configured with.
        expected: usize,
        /// Dimension the provider returned.
        actual: usize,
    },

    /// An upstream capability (embedder, scorer, generator) failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
