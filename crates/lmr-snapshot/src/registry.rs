//! Control-plane row store for snapshot bookkeeping.
//!
//! Deliberately minimal: single-row upserts keyed on conflict columns, no
//! joins, no multi-row transactions. `SqliteRegistry` is the durable backend;
//! `MemRegistry` keeps tests hermetic.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use lmr_types::RecordTime;

use crate::model::{EntityStats, Snapshot, SnapshotStatus};

pub type DynRegistry = Arc<dyn SnapshotRegistry>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt snapshot row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

pub trait SnapshotRegistry: Send + Sync {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), RegistryError>;
    fn load(&self, id: &str) -> Result<Option<Snapshot>, RegistryError>;
    /// Write the full row; the conflict key is the snapshot id.
    fn upsert(&self, snapshot: &Snapshot) -> Result<(), RegistryError>;
    fn upsert_entity_stats(
        &self,
        snapshot_id: &str,
        stats: &EntityStats,
    ) -> Result<(), RegistryError>;
    fn entity_stats(&self, snapshot_id: &str) -> Result<Vec<EntityStats>, RegistryError>;
}

// --- sqlite ----------------------------------------------------------------

pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                migration_id INTEGER NOT NULL,
                record_time TEXT NOT NULL,
                unlocked TEXT NOT NULL,
                locked TEXT NOT NULL,
                circulating TEXT NOT NULL,
                cursor TEXT,
                processed_pages INTEGER NOT NULL,
                processed_records INTEGER NOT NULL,
                status TEXT NOT NULL,
                previous_snapshot TEXT,
                error TEXT
            );
            CREATE TABLE IF NOT EXISTS entity_stats (
                snapshot_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                record_count INTEGER NOT NULL,
                PRIMARY KEY (snapshot_id, entity_type)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_snapshot(row: &rusqlite::Row<'_>) -> Result<Snapshot, RegistryError> {
        let id: String = row.get("id")?;
        let corrupt = |reason: String| RegistryError::Corrupt {
            id: id.clone(),
            reason,
        };

        let record_time: String = row.get("record_time")?;
        let record_time = DateTime::parse_from_rfc3339(&record_time)
            .map(|t| RecordTime(t.with_timezone(&Utc)))
            .map_err(|e| corrupt(format!("record_time: {e}")))?;

        let amount = |column: &str| -> Result<lmr_types::Amount, RegistryError> {
            let text: String = row.get(column)?;
            text.parse()
                .map_err(|e| corrupt(format!("{column}: {e}")))
        };

        let status: String = row.get("status")?;
        let status = SnapshotStatus::parse(&status)
            .ok_or_else(|| corrupt(format!("status: '{status}'")))?;

        Ok(Snapshot {
            source: row.get("source")?,
            migration_id: row.get::<_, i64>("migration_id")? as u64,
            record_time,
            unlocked: amount("unlocked")?,
            locked: amount("locked")?,
            circulating: amount("circulating")?,
            cursor: row.get("cursor")?,
            processed_pages: row.get::<_, i64>("processed_pages")? as u64,
            processed_records: row.get::<_, i64>("processed_records")? as u64,
            status,
            previous_snapshot: row.get("previous_snapshot")?,
            error: row.get("error")?,
            id,
        })
    }
}

impl SnapshotRegistry for SqliteRegistry {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), RegistryError> {
        self.upsert(snapshot)
    }

    fn load(&self, id: &str) -> Result<Option<Snapshot>, RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM snapshots WHERE id = ?1", params![id], |row| {
            Ok(Self::row_to_snapshot(row))
        })
        .optional()?
        .transpose()
    }

    fn upsert(&self, snapshot: &Snapshot) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO snapshots (
                id, source, migration_id, record_time, unlocked, locked,
                circulating, cursor, processed_pages, processed_records,
                status, previous_snapshot, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                record_time = excluded.record_time,
                unlocked = excluded.unlocked,
                locked = excluded.locked,
                circulating = excluded.circulating,
                cursor = excluded.cursor,
                processed_pages = excluded.processed_pages,
                processed_records = excluded.processed_records,
                status = excluded.status,
                error = excluded.error",
            params![
                snapshot.id,
                snapshot.source,
                snapshot.migration_id as i64,
                snapshot.record_time.to_string(),
                snapshot.unlocked.to_string(),
                snapshot.locked.to_string(),
                snapshot.circulating.to_string(),
                snapshot.cursor,
                snapshot.processed_pages as i64,
                snapshot.processed_records as i64,
                snapshot.status.as_str(),
                snapshot.previous_snapshot,
                snapshot.error,
            ],
        )?;
        Ok(())
    }

    fn upsert_entity_stats(
        &self,
        snapshot_id: &str,
        stats: &EntityStats,
    ) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entity_stats (snapshot_id, entity_type, chunk_count, record_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(snapshot_id, entity_type) DO UPDATE SET
                chunk_count = excluded.chunk_count,
                record_count = excluded.record_count",
            params![
                snapshot_id,
                stats.entity_type,
                stats.chunk_count as i64,
                stats.record_count as i64,
            ],
        )?;
        Ok(())
    }

    fn entity_stats(&self, snapshot_id: &str) -> Result<Vec<EntityStats>, RegistryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_type, chunk_count, record_count
             FROM entity_stats WHERE snapshot_id = ?1 ORDER BY entity_type",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            Ok(EntityStats {
                entity_type: row.get(0)?,
                chunk_count: row.get::<_, i64>(1)? as u64,
                record_count: row.get::<_, i64>(2)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

// --- in-memory -------------------------------------------------------------

#[derive(Default)]
pub struct MemRegistry {
    snapshots: RwLock<HashMap<String, Snapshot>>,
    stats: RwLock<HashMap<(String, String), EntityStats>>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotRegistry for MemRegistry {
    fn insert(&self, snapshot: &Snapshot) -> Result<(), RegistryError> {
        self.upsert(snapshot)
    }

    fn load(&self, id: &str) -> Result<Option<Snapshot>, RegistryError> {
        Ok(self.snapshots.read().unwrap().get(id).cloned())
    }

    fn upsert(&self, snapshot: &Snapshot) -> Result<(), RegistryError> {
        self.snapshots
            .write()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn upsert_entity_stats(
        &self,
        snapshot_id: &str,
        stats: &EntityStats,
    ) -> Result<(), RegistryError> {
        self.stats.write().unwrap().insert(
            (snapshot_id.to_string(), stats.entity_type.clone()),
            stats.clone(),
        );
        Ok(())
    }

    fn entity_stats(&self, snapshot_id: &str) -> Result<Vec<EntityStats>, RegistryError> {
        let mut out: Vec<EntityStats> = self
            .stats
            .read()
            .unwrap()
            .iter()
            .filter(|((sid, _), _)| sid == snapshot_id)
            .map(|(_, stats)| stats.clone())
            .collect();
        out.sort_by(|a, b| a.entity_type.cmp(&b.entity_type));
        Ok(out)
    }
}
