//! SnapshotChain orchestrator: drives paginated ACS retrieval under a
//! bounded per-invocation budget, accumulates decimal holding totals, and
//! persists chunks/manifests plus the snapshot checkpoint row.
//!
//! One logical cursor per snapshot; invocations chain by re-reading the
//! snapshot row fresh and resuming from its persisted cursor. Nothing here
//! may run concurrently for the same snapshot (manifest updates are
//! read-modify-write with no locking).

mod model;
mod orchestrator;
mod registry;

pub use model::{EntityStats, Snapshot, SnapshotStatus};
pub use orchestrator::{BatchOutcome, ChainConfig, HoldingKind, SnapshotChain, holding_kind};
pub use registry::{DynRegistry, MemRegistry, RegistryError, SnapshotRegistry, SqliteRegistry};

use lmr_ledger::LedgerError;
use lmr_store::StoreError;
use lmr_types::AmountError;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot {id} not found")]
    UnknownSnapshot { id: String },
    #[error("upstream fetch failed for snapshot {id} at cursor {cursor:?}: {source}")]
    Upstream {
        id: String,
        cursor: Option<String>,
        #[source]
        source: LedgerError,
    },
    #[error("storage write failed for snapshot {id} at {path}: {source}")]
    Storage {
        id: String,
        path: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("record-time did not stabilize after {attempts} timestamp reads")]
    UnstableRecordTime { attempts: u32 },
    #[error("amount arithmetic failed for snapshot {id}: {source}")]
    Amount {
        id: String,
        #[source]
        source: AmountError,
    },
}

impl SnapshotError {
    /// Whether re-invoking the batch from the last persisted cursor can
    /// plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SnapshotError::Upstream { source, .. } => source.is_retryable(),
            SnapshotError::Storage { .. } => true,
            _ => false,
        }
    }
}
