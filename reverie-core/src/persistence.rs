//! SQLite persistence layer for memory records.
//!
//! One row per memory, partitioned by character:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memories (
//!     id            TEXT PRIMARY KEY,
//!     character_id  TEXT NOT NULL,
//!     body          TEXT NOT NULL,
//!     embedding     BLOB NOT NULL,
//!     importance    INTEGER NOT NULL,
//!     occurred_tick INTEGER NOT NULL,
//!     occurred_real TEXT NOT NULL,
//!     accessed_tick INTEGER NOT NULL,
//!     accessed_real TEXT NOT NULL
//! );
//! ```
//!
//! - WAL mode for concurrent reads during gameplay.
//! - The embedding vector is a bincode BLOB; its dimension is validated on
//!   insert so a store instance never holds mixed-dimension vectors.
//! - `(character_id, occurred_tick)` index backs the newest-first listing
//!   the reflection transcript and candidate loading rely on.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::{MemoryError, Result};
use crate::types::{CharacterId, Embedding, Importance, MemoryId, MemoryRecord, SimTime};

/// Listing order for a character's memory partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Most recent `occurred_at` first.
    NewestFirst,
    /// Oldest `occurred_at` first.
    OldestFirst,
}

/// Handle to an open SQLite database of memory records.
///
/// The connection sits behind a mutex so the store is `Sync`; every
/// statement is short-lived and prepared through the statement cache.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    dimensions: usize,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memories (
    id            TEXT PRIMARY KEY,
    character_id  TEXT NOT NULL,
    body          TEXT NOT NULL,
    embedding     BLOB NOT NULL,
    importance    INTEGER NOT NULL,
    occurred_tick INTEGER NOT NULL,
    occurred_real TEXT NOT NULL,
    accessed_tick INTEGER NOT NULL,
    accessed_real TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_character_occurred
    ON memories (character_id, occurred_tick DESC);";

impl SqliteStore {
    /// Open (or create) an SQLite database at `path`.
    ///
    /// `dimensions` fixes the embedding dimension for this store instance.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: &PersistenceConfig,
        dimensions: usize,
    ) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(&format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            dimensions,
            "Memory store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// The embedding dimension this store enforces.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ------------------------------------------------------------------
    // Core CRUD
    // ------------------------------------------------------------------

    /// Insert a new memory record.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::DimensionMismatch`] if the embedding does not
    /// match the store's dimension, [`MemoryError::Serialization`] if the
    /// embedding cannot be encoded, or [`MemoryError::Database`] on SQLite
    /// failures.
    pub fn insert(&self, record: &MemoryRecord) -> Result<()> {
        if record.embedding.dimensions() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: record.embedding.dimensions(),
            });
        }

        let start = Instant::now();
        let blob = bincode::serialize(&record.embedding.0)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO memories (
                id, character_id, body, embedding, importance,
                occurred_tick, occurred_real, accessed_tick, accessed_real
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        stmt.execute(params![
            record.id.0.to_string(),
            record.character_id.0.to_string(),
            record.text,
            blob,
            i64::from(record.importance.value()),
            record.occurred_at.tick as i64,
            record.occurred_at.real_time.to_rfc3339(),
            record.accessed_at.tick as i64,
            record.accessed_at.real_time.to_rfc3339(),
        ])?;

        debug!(
            memory = %record.id,
            character = %record.character_id,
            importance = %record.importance,
            elapsed_us = start.elapsed().as_micros(),
            "Inserted memory"
        );

        Ok(())
    }

    /// Fetch a single record by id. Returns `None` if no row exists.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures or
    /// [`MemoryError::Serialization`] if a stored row cannot be decoded.
    pub fn get_by_id(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, character_id, body, embedding, importance,
                    occurred_tick, occurred_real, accessed_tick, accessed_real
             FROM memories WHERE id = ?1",
        )?;

        match stmt.query_row(params![id.0.to_string()], row_to_record).optional()? {
            None => Ok(None),
            Some(decoded) => decoded.map(Some),
        }
    }

    /// List a character's memory partition.
    ///
    /// `limit = None` loads the whole partition (the ranking candidate set).
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures or
    /// [`MemoryError::Serialization`] if a stored row cannot be decoded.
    pub fn list_by_character(
        &self,
        character: CharacterId,
        order: ListOrder,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let start = Instant::now();
        let sql = match order {
            ListOrder::NewestFirst => {
                "SELECT id, character_id, body, embedding, importance,
                        occurred_tick, occurred_real, accessed_tick, accessed_real
                 FROM memories WHERE character_id = ?1
                 ORDER BY occurred_tick DESC, id ASC LIMIT ?2"
            }
            ListOrder::OldestFirst => {
                "SELECT id, character_id, body, embedding, importance,
                        occurred_tick, occurred_real, accessed_tick, accessed_real
                 FROM memories WHERE character_id = ?1
                 ORDER BY occurred_tick ASC, id ASC LIMIT ?2"
            }
        };

        let bound = limit.map_or(-1_i64, |n| n as i64);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![character.0.to_string(), bound], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }

        debug!(
            character = %character,
            count = records.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Listed memory partition"
        );

        Ok(records)
    }

    /// Set a record's `accessed_at`. Last-writer-wins on the single field;
    /// touching a missing id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn update_accessed_at(&self, id: MemoryId, accessed_at: SimTime) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "UPDATE memories SET accessed_tick = ?2, accessed_real = ?3 WHERE id = ?1",
        )?;
        stmt.execute(params![
            id.0.to_string(),
            accessed_at.tick as i64,
            accessed_at.real_time.to_rfc3339(),
        ])?;
        Ok(())
    }

    /// Number of memories in a character's partition.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn count_by_character(&self, character: CharacterId) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE character_id = ?1",
            params![character.0.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Decode one `memories` row.
///
/// Decode failures are surfaced as a `Result` inside the rusqlite row so the
/// SQLite error channel stays clean.
#[allow(clippy::type_complexity)]
fn row_to_record(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<Result<MemoryRecord>, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let character_str: String = row.get(1)?;
    let body: String = row.get(2)?;
    let blob: Vec<u8> = row.get(3)?;
    let importance: i64 = row.get(4)?;
    let occurred_tick: i64 = row.get(5)?;
    let occurred_real: String = row.get(6)?;
    let accessed_tick: i64 = row.get(7)?;
    let accessed_real: String = row.get(8)?;

    Ok(decode_record(
        &id_str,
        &character_str,
        body,
        &blob,
        importance,
        occurred_tick,
        &occurred_real,
        accessed_tick,
        &accessed_real,
    ))
}

#[allow(clippy::too_many_arguments)]
fn decode_record(
    id_str: &str,
    character_str: &str,
    body: String,
    blob: &[u8],
    importance: i64,
    occurred_tick: i64,
    occurred_real: &str,
    accessed_tick: i64,
    accessed_real: &str,
) -> Result<MemoryRecord> {
    let id = uuid::Uuid::parse_str(id_str)
        .map_err(|e| MemoryError::Serialization(format!("bad memory id {id_str}: {e}")))?;
    let character = uuid::Uuid::parse_str(character_str)
        .map_err(|e| MemoryError::Serialization(format!("bad character id {character_str}: {e}")))?;
    let vector: Vec<f32> = bincode::deserialize(blob)
        .map_err(|e| MemoryError::Serialization(format!("bad embedding blob: {e}")))?;

    Ok(MemoryRecord {
        id: MemoryId(id),
        character_id: CharacterId(character),
        text: body,
        embedding: Embedding(vector),
        importance: Importance::new(importance),
        occurred_at: parse_sim_time(occurred_tick, occurred_real)?,
        accessed_at: parse_sim_time(accessed_tick, accessed_real)?,
    })
}

fn parse_sim_time(tick: i64, real: &str) -> Result<SimTime> {
    let real_time = DateTime::parse_from_rfc3339(real)
        .map_err(|e| MemoryError::Serialization(format!("bad timestamp {real}: {e}")))?
        .with_timezone(&Utc);
    Ok(SimTime {
        tick: tick as u64,
        real_time,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(character: CharacterId, tick: u64, text: &str) -> MemoryRecord {
        let when = SimTime::now(tick);
        MemoryRecord {
            id: MemoryId::new(),
            character_id: character,
            text: text.to_string(),
            embedding: Embedding(vec![0.5, -0.5, 0.25, 0.0]),
            importance: Importance::new(6),
            occurred_at: when,
            accessed_at: when,
        }
    }

    #[test]
    fn round_trip_insert_get() {
        let store = SqliteStore::open_in_memory(4).expect("open");
        let character = CharacterId::new();
        let record = sample_record(character, 1_000, "Met a wandering bard at the tavern");

        store.insert(&record).expect("insert");
        let loaded = store.get_by_id(record.id).expect("get").expect("Some");

        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.character_id, character);
        assert_eq!(loaded.text, record.text);
        assert_eq!(loaded.importance, record.importance);
        assert_eq!(loaded.embedding, record.embedding);
        assert_eq!(loaded.occurred_at.tick, 1_000);
        assert_eq!(loaded.accessed_at.tick, 1_000);
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = SqliteStore::open_in_memory(4).expect("open");
        assert!(store.get_by_id(MemoryId::new()).expect("get").is_none());
    }

    #[test]
    fn dimension_mismatch_rejected_before_write() {
        let store = SqliteStore::open_in_memory(8).expect("open");
        let character = CharacterId::new();
        let record = sample_record(character, 1, "wrong width");

        let err = store.insert(&record).expect_err("should reject");
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { expected: 8, actual: 4 }
        ));
        assert_eq!(store.count_by_character(character).expect("count"), 0);
    }

    #[test]
    fn listing_orders_and_limits() {
        let store = SqliteStore::open_in_memory(4).expect("open");
        let character = CharacterId::new();

        for (tick, text) in [(10, "first"), (30, "third"), (20, "second")] {
            store.insert(&sample_record(character, tick, text)).expect("insert");
        }

        let newest = store
            .list_by_character(character, ListOrder::NewestFirst, Some(2))
            .expect("list");
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].text, "third");
        assert_eq!(newest[1].text, "second");

        let oldest = store
            .list_by_character(character, ListOrder::OldestFirst, None)
            .expect("list");
        assert_eq!(oldest.len(), 3);
        assert_eq!(oldest[0].text, "first");
    }

    #[test]
    fn partitions_are_exclusive() {
        let store = SqliteStore::open_in_memory(4).expect("open");
        let alice = CharacterId::new();
        let bob = CharacterId::new();

        store.insert(&sample_record(alice, 1, "alice memory")).expect("insert");
        store.insert(&sample_record(bob, 2, "bob memory")).expect("insert");

        let memories = store
            .list_by_character(alice, ListOrder::NewestFirst, None)
            .expect("list");
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].text, "alice memory");
        assert_eq!(store.count_by_character(bob).expect("count"), 1);
    }

    #[test]
    fn touch_moves_only_accessed_at() {
        let store = SqliteStore::open_in_memory(4).expect("open");
        let character = CharacterId::new();
        let record = sample_record(character, 500, "touched later");
        store.insert(&record).expect("insert");

        store
            .update_accessed_at(record.id, SimTime::now(9_000))
            .expect("touch");

        let loaded = store.get_by_id(record.id).expect("get").expect("Some");
        assert_eq!(loaded.occurred_at.tick, 500);
        assert_eq!(loaded.accessed_at.tick, 9_000);
    }

    #[test]
    fn touching_missing_id_is_noop() {
        let store = SqliteStore::open_in_memory(4).expect("open");
        store
            .update_accessed_at(MemoryId::new(), SimTime::now(1))
            .expect("touch");
    }

    #[test]
    fn file_based_open_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("reverie.db");
        let config = PersistenceConfig::default();
        let character = CharacterId::new();

        {
            let store = SqliteStore::open(&db_path, &config, 4).expect("open");
            store.insert(&sample_record(character, 7, "durable")).expect("insert");
        }

        let reopened = SqliteStore::open(&db_path, &config, 4).expect("reopen");
        assert_eq!(reopened.count_by_character(character).expect("count"), 1);
    }
}
