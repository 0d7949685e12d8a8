//! Per-(snapshot, entity-type) manifest: the index of chunk files that
//! together hold one entity type's records.
//!
//! Manifests grow by read-modify-write with no optimistic-concurrency check;
//! the orchestrator's single-writer-per-chain discipline is what keeps the
//! accounting intact. Readers must tolerate duplicate entries left behind by
//! a retried batch and deduplicate by path before downloading.

use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: u64,
    /// Records stored in this chunk.
    pub count: u64,
    pub path: String,
}

/// A chunk reference as found on disk. Older writers emitted flat path
/// strings; current writers emit full entries. Both decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkRef {
    Entry(ChunkEntry),
    Path(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Original ledger template id (not the path-folded key).
    pub entity_type: String,
    pub chunks: Vec<ChunkRef>,
    /// Running record count across all chunks.
    pub total_count: u64,
}

impl Manifest {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            chunks: Vec::new(),
            total_count: 0,
        }
    }

    pub fn decode(path: &str, bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::ManifestDecode {
            path: path.to_string(),
            source,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("manifest serialization is infallible")
    }

    /// Chunk references normalized to entries. Flat path references carry no
    /// count; callers that need counts read the chunk itself.
    pub fn entries(&self) -> Vec<ChunkEntry> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(pos, c)| match c {
                ChunkRef::Entry(entry) => entry.clone(),
                ChunkRef::Path(path) => ChunkEntry {
                    index: pos as u64,
                    count: 0,
                    path: path.clone(),
                },
            })
            .collect()
    }

    /// Upsert a chunk entry by path.
    ///
    /// A retried batch re-submits the same path with the same count; replacing
    /// the old entry keeps `total_count` equal to the sum of per-chunk counts.
    pub fn merge_entry(&mut self, entry: ChunkEntry) {
        if let Some(existing) = self.chunks.iter_mut().find(|c| match c {
            ChunkRef::Entry(e) => e.path == entry.path,
            ChunkRef::Path(p) => *p == entry.path,
        }) {
            if let ChunkRef::Entry(e) = existing {
                self.total_count = self.total_count.saturating_sub(e.count) + entry.count;
            } else {
                self.total_count += entry.count;
            }
            *existing = ChunkRef::Entry(entry);
        } else {
            self.total_count += entry.count;
            self.chunks.push(ChunkRef::Entry(entry));
        }
    }

    /// True when the per-chunk counts add up to `total_count`.
    pub fn counts_consistent(&self) -> bool {
        let sum: u64 = self
            .chunks
            .iter()
            .map(|c| match c {
                ChunkRef::Entry(e) => e.count,
                ChunkRef::Path(_) => 0,
            })
            .sum();
        sum == self.total_count
    }
}
