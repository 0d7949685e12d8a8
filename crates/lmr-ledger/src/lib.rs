//! Client side of the upstream ledger API: the ACS snapshot endpoints and
//! the transaction-update log.
//!
//! [`LedgerApi`] is the seam: production code talks to [`HttpLedgerClient`],
//! tests talk to [`FakeLedger`]. Only the fields this pipeline consumes are
//! modeled; the rest of each payload rides along untyped.

mod client;
mod fake;
pub mod wire;

pub use client::{HttpLedgerClient, LedgerClientConfig};
pub use fake::{FailWith, FakeLedger};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use wire::{
    AcsPageRequest, AcsPageResponse, SnapshotTimestampRequest, SnapshotTimestampResponse,
    UpdatesRequest, UpdatesResponse,
};

pub type LedgerResult<T> = Result<T, LedgerError>;
pub type DynLedger = Arc<dyn LedgerApi>;

#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn snapshot_timestamp(
        &self,
        request: &SnapshotTimestampRequest,
    ) -> LedgerResult<SnapshotTimestampResponse>;

    async fn acs_page(&self, request: &AcsPageRequest) -> LedgerResult<AcsPageResponse>;

    async fn updates_page(&self, request: &UpdatesRequest) -> LedgerResult<UpdatesResponse>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
    #[error("decoding response from {endpoint} failed: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LedgerError {
    /// Transient failures are retried at the batch level by re-invocation.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Timeout { .. } | LedgerError::Http { .. } => true,
            LedgerError::Status { status, .. } => *status >= 500 || *status == 429,
            LedgerError::Decode { .. } => false,
        }
    }
}
