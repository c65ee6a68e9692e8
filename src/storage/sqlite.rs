//! SQLite Storage
//!
//! Persists progression state, the personal-record log and challenge
//! instances in a single local database. Rows keep the columns queries
//! filter on and carry the full record as JSON in `body`.

use super::{ProgressionStore, StorageResult, StoreOps};
use crate::challenge::ChallengeInstance;
use crate::error::{EngineResult, StorageError};
use crate::exercise::GroupId;
use crate::progression::ProgressionState;
use crate::records::PersonalRecord;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS progression (
    user_id TEXT PRIMARY KEY,
    total_xp INTEGER NOT NULL,
    level INTEGER NOT NULL,
    rank TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS personal_records (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    group_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    value REAL NOT NULL,
    weight_bucket REAL,
    achieved_at INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_user_group ON personal_records(user_id, group_id);

CREATE TABLE IF NOT EXISTS challenge_instances (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    definition_id TEXT NOT NULL,
    status TEXT NOT NULL,
    spawned_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_instances_user ON challenge_instances(user_id, status);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn encode<T: Serialize>(value: &T) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(body: &str) -> StorageResult<T> {
    Ok(serde_json::from_str(body)?)
}

fn load_progression(conn: &Connection, user_id: &str) -> StorageResult<Option<ProgressionState>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM progression WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| decode(&b)).transpose()
}

fn upsert_progression(conn: &Connection, state: &ProgressionState) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO progression (user_id, total_xp, level, rank, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            state.user_id,
            state.total_xp as i64,
            state.level,
            state.rank.as_str(),
            encode(state)?,
            state.updated_at.timestamp_millis()
        ],
    )?;
    Ok(())
}

fn insert_records(conn: &Connection, records: &[PersonalRecord]) -> StorageResult<()> {
    for record in records {
        conn.execute(
            "INSERT INTO personal_records
             (id, user_id, group_id, kind, value, weight_bucket, achieved_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.user_id,
                record.group_id.as_str(),
                record.kind.as_str(),
                record.value,
                record.weight_bucket,
                record.achieved_at.timestamp_millis(),
                encode(record)?
            ],
        )?;
    }
    Ok(())
}

fn records_for(
    conn: &Connection,
    user_id: &str,
    group: &GroupId,
) -> StorageResult<Vec<PersonalRecord>> {
    let mut stmt = conn.prepare(
        "SELECT body FROM personal_records
         WHERE user_id = ?1 AND group_id = ?2 ORDER BY rowid ASC",
    )?;
    let bodies = stmt
        .query_map(params![user_id, group.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies.iter().map(|b| decode(b)).collect()
}

fn insert_instance(conn: &Connection, instance: &ChallengeInstance) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO challenge_instances
         (id, user_id, definition_id, status, spawned_at, expires_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            instance.id.to_string(),
            instance.user_id,
            instance.definition_id,
            instance.status.as_str(),
            instance.spawned_at.timestamp_millis(),
            instance.expires_at.timestamp_millis(),
            encode(instance)?
        ],
    )?;
    Ok(())
}

fn upsert_instance(conn: &Connection, instance: &ChallengeInstance) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO challenge_instances
         (id, user_id, definition_id, status, spawned_at, expires_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            instance.id.to_string(),
            instance.user_id,
            instance.definition_id,
            instance.status.as_str(),
            instance.spawned_at.timestamp_millis(),
            instance.expires_at.timestamp_millis(),
            encode(instance)?
        ],
    )?;
    Ok(())
}

fn load_instance(conn: &Connection, id: Uuid) -> StorageResult<Option<ChallengeInstance>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT status, body FROM challenge_instances WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((status, body)) => {
            let instance: ChallengeInstance = decode(&body)?;
            if instance.status.as_str() != status {
                return Err(StorageError::Corrupt(format!(
                    "instance {} status column {} disagrees with body {}",
                    id, status, instance.status
                )));
            }
            Ok(Some(instance))
        }
        None => Ok(None),
    }
}

fn instances_for_user(conn: &Connection, user_id: &str) -> StorageResult<Vec<ChallengeInstance>> {
    let mut stmt = conn.prepare(
        "SELECT body FROM challenge_instances
         WHERE user_id = ?1 ORDER BY spawned_at ASC, rowid ASC",
    )?;
    let bodies = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies.iter().map(|b| decode(b)).collect()
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // other processes may hold the write lock for the length of a unit
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        info!("Progression storage initialized at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl StoreOps for SqliteStore {
    // ========================================================================
    // PROGRESSION
    // ========================================================================

    fn load_progression(&self, user_id: &str) -> StorageResult<Option<ProgressionState>> {
        load_progression(&self.conn.lock(), user_id)
    }

    fn save_progression(&self, state: &ProgressionState) -> StorageResult<()> {
        upsert_progression(&self.conn.lock(), state)
    }

    // ========================================================================
    // PERSONAL RECORDS
    // ========================================================================

    fn append_records(&self, records: &[PersonalRecord]) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_records(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    fn records_for(&self, user_id: &str, group: &GroupId) -> StorageResult<Vec<PersonalRecord>> {
        records_for(&self.conn.lock(), user_id, group)
    }

    // ========================================================================
    // CHALLENGE INSTANCES
    // ========================================================================

    fn insert_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        insert_instance(&self.conn.lock(), instance)
    }

    fn load_instance(&self, id: Uuid) -> StorageResult<Option<ChallengeInstance>> {
        load_instance(&self.conn.lock(), id)
    }

    fn instances_for_user(&self, user_id: &str) -> StorageResult<Vec<ChallengeInstance>> {
        instances_for_user(&self.conn.lock(), user_id)
    }

    fn save_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        upsert_instance(&self.conn.lock(), instance)
    }
}

/// Store view bound to an open transaction
struct SqliteUnit<'a> {
    conn: &'a Connection,
}

impl StoreOps for SqliteUnit<'_> {
    fn load_progression(&self, user_id: &str) -> StorageResult<Option<ProgressionState>> {
        load_progression(self.conn, user_id)
    }

    fn save_progression(&self, state: &ProgressionState) -> StorageResult<()> {
        upsert_progression(self.conn, state)
    }

    fn append_records(&self, records: &[PersonalRecord]) -> StorageResult<()> {
        insert_records(self.conn, records)
    }

    fn records_for(&self, user_id: &str, group: &GroupId) -> StorageResult<Vec<PersonalRecord>> {
        records_for(self.conn, user_id, group)
    }

    fn insert_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        insert_instance(self.conn, instance)
    }

    fn load_instance(&self, id: Uuid) -> StorageResult<Option<ChallengeInstance>> {
        load_instance(self.conn, id)
    }

    fn instances_for_user(&self, user_id: &str) -> StorageResult<Vec<ChallengeInstance>> {
        instances_for_user(self.conn, user_id)
    }

    fn save_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        upsert_instance(self.conn, instance)
    }
}

impl ProgressionStore for SqliteStore {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn StoreOps) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front, so reads in the unit
        // cannot go stale before its writes land
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        work(&SqliteUnit { conn: &tx })?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }
}
