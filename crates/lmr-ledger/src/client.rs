use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::wire::{
    AcsPageRequest, AcsPageResponse, SnapshotTimestampRequest, SnapshotTimestampResponse,
    UpdatesRequest, UpdatesResponse,
};
use crate::{LedgerApi, LedgerError, LedgerResult};

const SNAPSHOT_TIMESTAMP_PATH: &str = "v0/state/acs/snapshot-timestamp";
const ACS_PATH: &str = "v0/state/acs";
const UPDATES_PATH: &str = "v0/updates";

#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub base_url: Url,
    /// Per-request timeout; also applied as an outer hard cap.
    pub timeout: Duration,
}

impl LedgerClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }
}

/// `reqwest`-backed ledger client. All consumed endpoints are JSON-over-POST.
#[derive(Clone)]
pub struct HttpLedgerClient {
    client: Client,
    config: LedgerClientConfig,
}

impl std::fmt::Debug for HttpLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedgerClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

impl HttpLedgerClient {
    pub fn new(config: LedgerClientConfig) -> LedgerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .build()
            .map_err(|source| LedgerError::Http {
                endpoint: config.base_url.as_str().to_string(),
                source,
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.as_str().trim_end_matches('/'))
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> LedgerResult<Resp> {
        let endpoint = self.endpoint(path);
        debug!(%endpoint, "ledger POST");
        let send = self.client.post(&endpoint).json(request).send();

        // Outer cap on top of reqwest's own timeout, the ledger API is the
        // one collaborator that can stall past its budget.
        let response = match timeout(self.config.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(LedgerError::Http {
                    endpoint,
                    source,
                });
            }
            Err(_) => {
                return Err(LedgerError::Timeout {
                    endpoint,
                    timeout: self.config.timeout,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|source| LedgerError::Http {
            endpoint: endpoint.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| LedgerError::Decode { endpoint, source })
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn snapshot_timestamp(
        &self,
        request: &SnapshotTimestampRequest,
    ) -> LedgerResult<SnapshotTimestampResponse> {
        self.post_json(SNAPSHOT_TIMESTAMP_PATH, request).await
    }

    async fn acs_page(&self, request: &AcsPageRequest) -> LedgerResult<AcsPageResponse> {
        self.post_json(ACS_PATH, request).await
    }

    async fn updates_page(&self, request: &UpdatesRequest) -> LedgerResult<UpdatesResponse> {
        self.post_json(UPDATES_PATH, request).await
    }
}
