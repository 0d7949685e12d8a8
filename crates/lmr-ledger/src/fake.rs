//! In-memory ledger fake for hermetic tests: programmed snapshot timestamps,
//! ACS pages, and an update log served by record-time, plus fault injection.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use lmr_types::RecordTime;

use crate::wire::{
    AcsPageRequest, AcsPageResponse, CreatedEvent, PageRange, SnapshotTimestampRequest,
    SnapshotTimestampResponse, Transaction, UpdatesRequest, UpdatesResponse,
};
use crate::{LedgerApi, LedgerError, LedgerResult};

/// Next programmed failure; errors are built on demand since they hold
/// non-clonable sources.
#[derive(Debug, Clone, Copy)]
pub enum FailWith {
    Timeout,
    Status(u16),
}

impl FailWith {
    fn into_error(self, endpoint: &str) -> LedgerError {
        match self {
            FailWith::Timeout => LedgerError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: Duration::from_secs(30),
            },
            FailWith::Status(status) => LedgerError::Status {
                endpoint: endpoint.to_string(),
                status,
                body: "injected failure".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct Inner {
    timestamps: VecDeque<RecordTime>,
    acs_pages: Vec<Vec<CreatedEvent>>,
    transactions: Vec<Transaction>,
    acs_cursor_log: Vec<Option<String>>,
    fail_next: Option<FailWith>,
}

#[derive(Default)]
pub struct FakeLedger {
    inner: Mutex<Inner>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for the snapshot-timestamp endpoint; the last one
    /// repeats once the queue drains.
    pub fn push_timestamp(&self, record_time: RecordTime) {
        self.inner.lock().unwrap().timestamps.push_back(record_time);
    }

    /// Append one ACS page. An empty trailing page is implicit: paging past
    /// the programmed pages yields `created_events: []`.
    pub fn push_acs_page(&self, events: Vec<CreatedEvent>) {
        self.inner.lock().unwrap().acs_pages.push(events);
    }

    /// Install the update log; transactions are served in record-time order.
    pub fn set_transactions(&self, mut transactions: Vec<Transaction>) {
        transactions.sort_by_key(|tx| tx.record_time);
        self.inner.lock().unwrap().transactions = transactions;
    }

    pub fn fail_next(&self, failure: FailWith) {
        self.inner.lock().unwrap().fail_next = Some(failure);
    }

    /// Cursors observed by the ACS endpoint, in call order.
    pub fn acs_cursors_seen(&self) -> Vec<Option<String>> {
        self.inner.lock().unwrap().acs_cursor_log.clone()
    }

    fn take_failure(&self, endpoint: &str) -> Option<LedgerError> {
        self.inner
            .lock()
            .unwrap()
            .fail_next
            .take()
            .map(|f| f.into_error(endpoint))
    }
}

#[async_trait]
impl LedgerApi for FakeLedger {
    async fn snapshot_timestamp(
        &self,
        _request: &SnapshotTimestampRequest,
    ) -> LedgerResult<SnapshotTimestampResponse> {
        if let Some(err) = self.take_failure("snapshot-timestamp") {
            return Err(err);
        }
        let mut inner = self.inner.lock().unwrap();
        let record_time = if inner.timestamps.len() > 1 {
            inner.timestamps.pop_front().unwrap()
        } else {
            *inner
                .timestamps
                .front()
                .expect("FakeLedger: no timestamp programmed")
        };
        Ok(SnapshotTimestampResponse { record_time })
    }

    async fn acs_page(&self, request: &AcsPageRequest) -> LedgerResult<AcsPageResponse> {
        if let Some(err) = self.take_failure("acs") {
            return Err(err);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.acs_cursor_log.push(request.after.clone());

        let index = match &request.after {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map(|i| i + 1)
                .unwrap_or(usize::MAX),
        };
        if index >= inner.acs_pages.len() {
            return Ok(AcsPageResponse::default());
        }
        Ok(AcsPageResponse {
            created_events: inner.acs_pages[index].clone(),
            range: Some(PageRange {
                to: Some(index.to_string()),
            }),
        })
    }

    async fn updates_page(&self, request: &UpdatesRequest) -> LedgerResult<UpdatesResponse> {
        if let Some(err) = self.take_failure("updates") {
            return Err(err);
        }
        let inner = self.inner.lock().unwrap();
        let transactions: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|tx| tx.record_time > request.after.record_time)
            .take(request.page_size as usize)
            .cloned()
            .collect();
        Ok(UpdatesResponse { transactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn rt(minute: u32) -> RecordTime {
        RecordTime(Utc.with_ymd_and_hms(2024, 7, 1, 12, minute, 0).unwrap())
    }

    fn event(id: &str) -> CreatedEvent {
        CreatedEvent {
            contract_id: id.to_string(),
            template_id: "acme:Token:Holding".to_string(),
            create_arguments: json!({}),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn acs_pages_chain_through_cursors() {
        let ledger = FakeLedger::new();
        ledger.push_acs_page(vec![event("c1"), event("c2")]);
        ledger.push_acs_page(vec![event("c3")]);

        let mut after = None;
        let mut seen = Vec::new();
        loop {
            let page = ledger
                .acs_page(&AcsPageRequest {
                    migration_id: 0,
                    record_time: rt(0),
                    page_size: 500,
                    after: after.clone(),
                })
                .await
                .unwrap();
            if page.created_events.is_empty() {
                break;
            }
            seen.extend(page.created_events.iter().map(|e| e.contract_id.clone()));
            after = page.next_cursor();
        }
        assert_eq!(seen, vec!["c1", "c2", "c3"]);
        assert_eq!(ledger.acs_cursors_seen().len(), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn updates_are_served_after_cursor() {
        let ledger = FakeLedger::new();
        ledger.set_transactions(vec![
            Transaction {
                update_id: "u2".into(),
                record_time: rt(2),
                migration_id: 0,
                root_event_ids: vec![],
                events_by_id: Default::default(),
            },
            Transaction {
                update_id: "u1".into(),
                record_time: rt(1),
                migration_id: 0,
                root_event_ids: vec![],
                events_by_id: Default::default(),
            },
        ]);

        let page = ledger
            .updates_page(&UpdatesRequest {
                page_size: 10,
                after: crate::wire::UpdateCursor {
                    migration_id: 0,
                    record_time: rt(1),
                },
            })
            .await
            .unwrap();
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].update_id, "u2");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn injected_failure_fires_once() {
        let ledger = FakeLedger::new();
        ledger.push_acs_page(vec![]);
        ledger.fail_next(FailWith::Status(503));

        let request = AcsPageRequest {
            migration_id: 0,
            record_time: rt(0),
            page_size: 500,
            after: None,
        };
        let err = ledger.acs_page(&request).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.acs_page(&request).await.is_ok());
    }
}
