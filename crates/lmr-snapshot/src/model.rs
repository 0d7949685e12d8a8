use serde::{Deserialize, Serialize};

use lmr_types::{Amount, AmountError, MigrationId, RecordTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Processing,
    Completed,
    Failed,
}

impl SnapshotStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SnapshotStatus::Completed | SnapshotStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Processing => "processing",
            SnapshotStatus::Completed => "completed",
            SnapshotStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(SnapshotStatus::Processing),
            "completed" => Some(SnapshotStatus::Completed),
            "failed" => Some(SnapshotStatus::Failed),
            _ => None,
        }
    }
}

/// One point-in-time ACS capture and its running checkpoint state.
///
/// The row is the only cross-invocation state the orchestrator owns: it is
/// re-read fresh at the start of every batch and written back only after all
/// chunk and manifest writes for that batch have succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Upstream endpoint this snapshot was captured from.
    pub source: String,
    pub migration_id: MigrationId,
    /// The ledger timestamp this snapshot is "as of".
    pub record_time: RecordTime,
    pub unlocked: Amount,
    pub locked: Amount,
    /// Always `unlocked − locked`, same scale.
    pub circulating: Amount,
    pub cursor: Option<String>,
    pub processed_pages: u64,
    pub processed_records: u64,
    pub status: SnapshotStatus,
    /// Lineage: the snapshot this one chains from, if any.
    pub previous_snapshot: Option<String>,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn new(
        id: String,
        source: String,
        migration_id: MigrationId,
        record_time: RecordTime,
        previous_snapshot: Option<String>,
    ) -> Self {
        Self {
            id,
            source,
            migration_id,
            record_time,
            unlocked: Amount::ZERO,
            locked: Amount::ZERO,
            circulating: Amount::ZERO,
            cursor: None,
            processed_pages: 0,
            processed_records: 0,
            status: SnapshotStatus::Processing,
            previous_snapshot,
            error: None,
        }
    }

    /// Fold one committed batch into the checkpoint state.
    pub fn apply_batch(
        &mut self,
        unlocked_delta: Amount,
        locked_delta: Amount,
        pages: u64,
        records: u64,
        cursor: Option<String>,
        completed: bool,
    ) -> Result<(), AmountError> {
        self.unlocked = self.unlocked.checked_add(unlocked_delta)?;
        self.locked = self.locked.checked_add(locked_delta)?;
        self.circulating = self.unlocked.checked_sub(self.locked)?;
        self.processed_pages += pages;
        self.processed_records += records;
        if cursor.is_some() {
            self.cursor = cursor;
        }
        if completed {
            self.status = SnapshotStatus::Completed;
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = SnapshotStatus::Failed;
        self.error = Some(message.into());
    }
}

/// Per-(snapshot, entity-type) bookkeeping surfaced to the dashboard layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub entity_type: String,
    pub chunk_count: u64,
    pub record_count: u64,
}
