//! Chunk/manifest storage abstraction plus filesystem and in-memory backends.
//!
//! The store moves opaque byte blobs addressed by hierarchical path strings.
//! Writes are upserts so retried batches can safely overwrite their own
//! output; no multi-object transaction is offered and callers must recover
//! from partial batches via idempotent retry.

mod fs_store;
pub mod manifest;
mod mem_store;
pub mod paths;

pub use fs_store::FsStore;
pub use manifest::{ChunkEntry, Manifest};
pub use mem_store::MemStore;

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;

pub type StoreResult<T> = Result<T, StoreError>;
pub type DynStore = Arc<dyn ObjectStore>;

/// Object store over opaque blobs addressed by `/`-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upsert: overwriting an existing object is allowed and expected.
    async fn put(&self, path: &str, bytes: &[u8]) -> StoreResult<()>;
    async fn get(&self, path: &str) -> StoreResult<Vec<u8>>;
    /// All object paths starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {path}")]
    NotFound { path: String },
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid object path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("manifest decode failed at {path}: {source}")]
    ManifestDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}

/// Reject traversal and absolute paths before they reach a backend.
pub(crate) fn check_path(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Err(StoreError::InvalidPath {
            path: path.into(),
            reason: "empty",
        });
    }
    if path.starts_with('/') {
        return Err(StoreError::InvalidPath {
            path: path.into(),
            reason: "absolute paths are not allowed",
        });
    }
    if path.split('/').any(|seg| seg == ".." || seg.is_empty()) {
        return Err(StoreError::InvalidPath {
            path: path.into(),
            reason: "traversal or empty segment",
        });
    }
    Ok(())
}
