use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use lmr_ledger::wire::{AcsPageRequest, CreatedEvent, SnapshotTimestampRequest};
use lmr_ledger::DynLedger;
use lmr_store::{ChunkEntry, DynStore, Manifest, StoreError, paths};
use lmr_types::{Amount, MigrationId, RecordTime, select};

use crate::model::{EntityStats, Snapshot, SnapshotStatus};
use crate::registry::DynRegistry;
use crate::{SnapshotError, SnapshotResult};

/// Entity-type suffix carried by unlocked fungible holdings.
pub const UNLOCKED_SUFFIX: &str = ":Holding";
/// Entity-type suffix carried by locked holdings; their amount sits one
/// nesting level deeper, on the wrapped holding.
pub const LOCKED_SUFFIX: &str = ":LockedHolding";

const UNLOCKED_AMOUNT_PATH: &[&str] = &["amount", "initial_amount"];
const LOCKED_AMOUNT_PATH: &[&str] = &["holding", "amount", "initial_amount"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingKind {
    Unlocked,
    Locked,
}

/// Classify a template id as a fungible-holding entity-type, if it is one.
pub fn holding_kind(template_id: &str) -> Option<HoldingKind> {
    if template_id.ends_with(LOCKED_SUFFIX) {
        Some(HoldingKind::Locked)
    } else if template_id.ends_with(UNLOCKED_SUFFIX) {
        Some(HoldingKind::Unlocked)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Upstream endpoint recorded on the snapshot row.
    pub source: String,
    pub migration_id: MigrationId,
    /// Records requested per ACS page.
    pub page_size: u32,
    /// Page budget per invocation.
    pub pages_per_batch: u32,
    /// Double-read attempts before giving up on a stable record-time.
    pub timestamp_attempts: u32,
    pub previous_snapshot: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            migration_id: 0,
            page_size: 500,
            pages_per_batch: 40,
            timestamp_attempts: 3,
            previous_snapshot: None,
        }
    }
}

/// What one `continue_snapshot` invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Budget exhausted with more data upstream; re-invoke.
    Continue { pages: u64, records: u64 },
    /// The upstream returned an empty page; the snapshot is complete.
    Completed { pages: u64, records: u64 },
    /// The snapshot was already terminal; nothing was done.
    AlreadyTerminal(SnapshotStatus),
}

pub struct SnapshotChain {
    ledger: DynLedger,
    store: DynStore,
    registry: DynRegistry,
    config: ChainConfig,
}

impl SnapshotChain {
    pub fn new(
        ledger: DynLedger,
        store: DynStore,
        registry: DynRegistry,
        config: ChainConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            registry,
            config,
        }
    }

    /// Create a new snapshot in `processing` status.
    ///
    /// The record-time is read twice (and re-read on disagreement, up to the
    /// configured attempts) so that clock skew between upstream calls cannot
    /// pin the snapshot to a timestamp the next invocation would not see.
    pub async fn start_snapshot(&self) -> SnapshotResult<String> {
        let request = SnapshotTimestampRequest {
            before: RecordTime::now(),
            migration_id: self.config.migration_id,
        };
        let mut last = self
            .ledger
            .snapshot_timestamp(&request)
            .await
            .map_err(|source| SnapshotError::Upstream {
                id: "<new>".into(),
                cursor: None,
                source,
            })?
            .record_time;

        let mut verified = None;
        for attempt in 0..self.config.timestamp_attempts {
            let check = self
                .ledger
                .snapshot_timestamp(&request)
                .await
                .map_err(|source| SnapshotError::Upstream {
                    id: "<new>".into(),
                    cursor: None,
                    source,
                })?
                .record_time;
            if check == last {
                verified = Some(check);
                break;
            }
            debug!(attempt, "record-time moved between reads, re-verifying");
            last = check;
        }
        let record_time = verified.ok_or(SnapshotError::UnstableRecordTime {
            attempts: self.config.timestamp_attempts,
        })?;

        let snapshot = Snapshot::new(
            uuid::Uuid::new_v4().to_string(),
            self.config.source.clone(),
            self.config.migration_id,
            record_time,
            self.config.previous_snapshot.clone(),
        );
        self.registry.insert(&snapshot)?;
        info!(id = %snapshot.id, record_time = %record_time, "snapshot started");
        Ok(snapshot.id)
    }

    /// Run one budgeted batch from the snapshot's persisted cursor.
    ///
    /// Idempotent per cursor: chunk paths derive from the page count at batch
    /// start, chunk/manifest writes are upserts, and the snapshot row commits
    /// last, so a retried batch rewrites the same objects and lands on the
    /// same totals.
    pub async fn continue_snapshot(&self, id: &str) -> SnapshotResult<BatchOutcome> {
        let mut snapshot = self
            .registry
            .load(id)?
            .ok_or_else(|| SnapshotError::UnknownSnapshot { id: id.into() })?;
        if snapshot.status.is_terminal() {
            return Ok(BatchOutcome::AlreadyTerminal(snapshot.status));
        }

        let batch_index = snapshot.processed_pages;
        let mut cursor = snapshot.cursor.clone();
        let mut groups: BTreeMap<String, Vec<CreatedEvent>> = BTreeMap::new();
        let mut unlocked_delta = Amount::ZERO;
        let mut locked_delta = Amount::ZERO;
        let mut pages = 0u64;
        let mut records = 0u64;
        let mut completed = false;

        for _ in 0..self.config.pages_per_batch {
            let request = AcsPageRequest {
                migration_id: snapshot.migration_id,
                record_time: snapshot.record_time,
                page_size: self.config.page_size,
                after: cursor.clone(),
            };
            let page = self.ledger.acs_page(&request).await.map_err(|source| {
                SnapshotError::Upstream {
                    id: id.into(),
                    cursor: cursor.clone(),
                    source,
                }
            })?;

            if page.created_events.is_empty() {
                completed = true;
                break;
            }

            pages += 1;
            let next = page.next_cursor();
            for event in page.created_events {
                records += 1;
                match holding_kind(&event.template_id) {
                    Some(HoldingKind::Unlocked) => {
                        match select::amount_at(&event.create_arguments, UNLOCKED_AMOUNT_PATH) {
                            Some(amount) => {
                                unlocked_delta = unlocked_delta.checked_add(amount).map_err(
                                    |source| SnapshotError::Amount {
                                        id: id.into(),
                                        source,
                                    },
                                )?;
                            }
                            None => warn!(
                                contract = %event.contract_id,
                                "holding without parsable initial amount, skipped"
                            ),
                        }
                    }
                    Some(HoldingKind::Locked) => {
                        match select::amount_at(&event.create_arguments, LOCKED_AMOUNT_PATH) {
                            Some(amount) => {
                                locked_delta = locked_delta.checked_add(amount).map_err(
                                    |source| SnapshotError::Amount {
                                        id: id.into(),
                                        source,
                                    },
                                )?;
                            }
                            None => warn!(
                                contract = %event.contract_id,
                                "locked holding without parsable amount, skipped"
                            ),
                        }
                    }
                    None => {}
                }
                groups.entry(event.template_id.clone()).or_default().push(event);
            }

            match next {
                Some(next) => cursor = Some(next),
                None => {
                    // No continuation despite a non-empty page: nothing more
                    // can be fetched safely, close the snapshot here.
                    warn!(id, "upstream returned records without a continuation cursor");
                    completed = true;
                    break;
                }
            }
        }

        // Chunks and manifests first; the snapshot row commits only after
        // every write for this batch has succeeded.
        for (template_id, events) in &groups {
            let chunk_path = paths::chunk_path(id, template_id, batch_index);
            let bytes = serde_json::to_vec(events).expect("chunk serialization is infallible");
            self.store
                .put(&chunk_path, &bytes)
                .await
                .map_err(|source| SnapshotError::Storage {
                    id: id.into(),
                    path: chunk_path.clone(),
                    source,
                })?;

            let manifest_path = paths::manifest_path(id, template_id);
            let mut manifest = match self.store.get(&manifest_path).await {
                Ok(bytes) => Manifest::decode(&manifest_path, &bytes).map_err(|source| {
                    SnapshotError::Storage {
                        id: id.into(),
                        path: manifest_path.clone(),
                        source,
                    }
                })?,
                Err(StoreError::NotFound { .. }) => Manifest::new(template_id.clone()),
                Err(source) => {
                    return Err(SnapshotError::Storage {
                        id: id.into(),
                        path: manifest_path.clone(),
                        source,
                    });
                }
            };
            manifest.merge_entry(ChunkEntry {
                index: batch_index,
                count: events.len() as u64,
                path: chunk_path.clone(),
            });
            self.store
                .put(&manifest_path, &manifest.encode())
                .await
                .map_err(|source| SnapshotError::Storage {
                    id: id.into(),
                    path: manifest_path.clone(),
                    source,
                })?;

            self.registry.upsert_entity_stats(
                id,
                &EntityStats {
                    entity_type: template_id.clone(),
                    chunk_count: manifest.entries().len() as u64,
                    record_count: manifest.total_count,
                },
            )?;
        }

        snapshot
            .apply_batch(unlocked_delta, locked_delta, pages, records, cursor, completed)
            .map_err(|source| SnapshotError::Amount {
                id: id.into(),
                source,
            })?;
        self.registry.upsert(&snapshot)?;

        info!(
            id,
            pages,
            records,
            unlocked = %snapshot.unlocked,
            locked = %snapshot.locked,
            completed,
            "batch committed"
        );

        Ok(if completed {
            BatchOutcome::Completed { pages, records }
        } else {
            BatchOutcome::Continue { pages, records }
        })
    }

    /// Collapse the self-chaining invocation pattern into a budgeted loop.
    ///
    /// Retryable batch errors are retried in place; a non-retryable error or
    /// an exhausted retry budget marks the snapshot failed and surfaces the
    /// error. Returns the final snapshot row.
    pub async fn run_to_completion(
        &self,
        id: &str,
        max_invocations: u32,
        max_retries: u32,
    ) -> SnapshotResult<Snapshot> {
        let mut retries = 0u32;
        for _ in 0..max_invocations {
            match self.continue_snapshot(id).await {
                Ok(BatchOutcome::Continue { .. }) => {
                    retries = 0;
                }
                Ok(BatchOutcome::Completed { .. }) | Ok(BatchOutcome::AlreadyTerminal(_)) => break,
                Err(err) if err.is_retryable() && retries < max_retries => {
                    retries += 1;
                    warn!(id, retries, error = %err, "retryable batch failure, re-invoking");
                }
                Err(err) => {
                    if let Ok(Some(mut snapshot)) = self.registry.load(id) {
                        snapshot.mark_failed(err.to_string());
                        let _ = self.registry.upsert(&snapshot);
                    }
                    return Err(err);
                }
            }
        }
        self.registry
            .load(id)?
            .ok_or_else(|| SnapshotError::UnknownSnapshot { id: id.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_classification_by_suffix() {
        assert_eq!(
            holding_kind("acme.ledger:Token:Holding"),
            Some(HoldingKind::Unlocked)
        );
        assert_eq!(
            holding_kind("acme.ledger:Token:LockedHolding"),
            Some(HoldingKind::Locked)
        );
        assert_eq!(holding_kind("acme.ledger:Rewards:RewardCoupon"), None);
        // "LockedHolding" must not be caught by the unlocked suffix.
        assert!(!"acme.ledger:Token:LockedHolding".ends_with(UNLOCKED_SUFFIX));
    }
}
