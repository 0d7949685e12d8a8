//! Chunk-aware aggregation reader: resolves a snapshot's manifests by
//! entity-type suffix, deduplicates their chunk references, downloads chunks
//! with a fixed-size worker pool, and sums one caller-selected decimal field
//! per record.
//!
//! A manifest rewritten by a retried batch can carry duplicate chunk entries;
//! deduplicating the resolved path set before downloading is what keeps such
//! manifests from double-counting. Individual chunk failures (download or
//! parse) are logged and contribute zero; they never fail the whole sum.

use std::collections::BTreeSet;

use futures::{StreamExt, stream};
use serde_json::Value;
use tracing::warn;

use lmr_store::{DynStore, Manifest, StoreError, paths};
use lmr_types::{Amount, AmountError, select};

/// Concurrent chunk downloads; manifests have been seen referencing tens of
/// thousands of chunks, so the fan-out stays fixed regardless of input size.
pub const DEFAULT_CONCURRENCY: usize = 6;

pub type AggregateResult<T> = Result<T, AggregateError>;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("listing manifests for snapshot {snapshot_id} failed: {source}")]
    List {
        snapshot_id: String,
        #[source]
        source: StoreError,
    },
    #[error("amount accumulation overflowed: {0}")]
    Amount(#[from] AmountError),
}

/// Picks the value to sum out of one chunk record.
///
/// Selection is defensive by contract: a missing or non-numeric field yields
/// `None` and the record contributes zero.
pub trait FieldSelector: Send + Sync {
    fn pick(&self, record: &Value) -> Option<Amount>;
}

/// Built-in selectors for the fungible-holding report types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingSelector {
    /// `create_arguments.amount.initial_amount`
    UnlockedAmount,
    /// `create_arguments.holding.amount.initial_amount` (locked holdings wrap
    /// the underlying holding one level deeper).
    LockedAmount,
}

impl FieldSelector for HoldingSelector {
    fn pick(&self, record: &Value) -> Option<Amount> {
        let path: &[&str] = match self {
            HoldingSelector::UnlockedAmount => &["create_arguments", "amount", "initial_amount"],
            HoldingSelector::LockedAmount => {
                &["create_arguments", "holding", "amount", "initial_amount"]
            }
        };
        select::amount_at(record, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumOutcome {
    pub sum: Amount,
    /// Records seen across all downloaded chunks.
    pub record_count: u64,
    /// Manifests whose entity-type matched the suffix.
    pub manifest_count: u64,
}

/// Sum `selector` over every record of every chunk belonging to manifests
/// whose entity-type ends with `entity_type_suffix`.
pub async fn sum_field(
    store: &DynStore,
    snapshot_id: &str,
    entity_type_suffix: &str,
    selector: &dyn FieldSelector,
    concurrency: usize,
) -> AggregateResult<SumOutcome> {
    let prefix = format!("{}/", paths::snapshot_root(snapshot_id));
    let keys = store
        .list(&prefix)
        .await
        .map_err(|source| AggregateError::List {
            snapshot_id: snapshot_id.to_string(),
            source,
        })?;

    let mut manifest_count = 0u64;
    let mut chunk_paths = BTreeSet::new();
    for key in keys.iter().filter(|k| k.ends_with(paths::MANIFEST_FILE)) {
        let bytes = match store.get(key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %key, error = %err, "manifest download failed, skipped");
                continue;
            }
        };
        let manifest = match Manifest::decode(key, &bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(path = %key, error = %err, "manifest decode failed, skipped");
                continue;
            }
        };
        if !manifest.entity_type.ends_with(entity_type_suffix) {
            continue;
        }
        manifest_count += 1;
        let dir = paths::parent(key);
        for entry in manifest.entries() {
            chunk_paths.insert(paths::resolve_chunk_path(dir, &entry.path));
        }
    }

    let concurrency = concurrency.max(1);
    let downloads = stream::iter(chunk_paths.into_iter().map(|path| {
        let store = store.clone();
        async move {
            let result = store.get(&path).await;
            (path, result)
        }
    }))
    .buffer_unordered(concurrency)
    .collect::<Vec<_>>()
    .await;

    let mut sum = Amount::ZERO;
    let mut record_count = 0u64;
    for (path, result) in downloads {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path, error = %err, "chunk download failed, contributes zero");
                continue;
            }
        };
        let records: Vec<Value> = match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %path, error = %err, "chunk parse failed, contributes zero");
                continue;
            }
        };
        record_count += records.len() as u64;
        for record in &records {
            if let Some(amount) = selector.pick(record) {
                sum = sum.checked_add(amount)?;
            }
        }
    }

    Ok(SumOutcome {
        sum,
        record_count,
        manifest_count,
    })
}
