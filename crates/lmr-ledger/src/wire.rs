//! Wire shapes for the consumed slices of the ledger API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lmr_types::{MigrationId, RecordTime};

// --- ACS snapshot-timestamp lookup -----------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTimestampRequest {
    pub before: RecordTime,
    pub migration_id: MigrationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTimestampResponse {
    pub record_time: RecordTime,
}

// --- ACS page fetch --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcsPageRequest {
    pub migration_id: MigrationId,
    pub record_time: RecordTime,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcsPageResponse {
    #[serde(default)]
    pub created_events: Vec<CreatedEvent>,
    #[serde(default)]
    pub range: Option<PageRange>,
}

impl AcsPageResponse {
    /// Continuation cursor for the next page, if the upstream supplied one.
    pub fn next_cursor(&self) -> Option<String> {
        self.range.as_ref().and_then(|r| r.to.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRange {
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub contract_id: String,
    pub template_id: String,
    #[serde(default)]
    pub create_arguments: Value,
}

// --- Transaction-update log ------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpdateCursor {
    pub migration_id: MigrationId,
    pub record_time: RecordTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesRequest {
    pub page_size: u32,
    pub after: UpdateCursor,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatesResponse {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub update_id: String,
    pub record_time: RecordTime,
    pub migration_id: MigrationId,
    #[serde(default)]
    pub root_event_ids: Vec<String>,
    #[serde(default)]
    pub events_by_id: HashMap<String, TreeEvent>,
}

impl Transaction {
    pub fn cursor(&self) -> UpdateCursor {
        UpdateCursor {
            migration_id: self.migration_id,
            record_time: self.record_time,
        }
    }
}

/// One node of a transaction's event tree. The discriminator is structural:
/// exercises carry `choice`, creates carry `create_arguments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeEvent {
    Exercised(ExercisedEvent),
    Created(CreatedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExercisedEvent {
    pub contract_id: String,
    pub template_id: String,
    pub choice: String,
    #[serde(default)]
    pub choice_argument: Value,
    #[serde(default)]
    pub child_event_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn acs_page_decodes_cursor_from_range() {
        let raw = json!({
            "created_events": [
                {
                    "contract_id": "c1",
                    "template_id": "acme:Token:Holding",
                    "create_arguments": {"amount": {"initial_amount": "10.0000000000"}}
                }
            ],
            "range": {"to": "0042"}
        });
        let page: AcsPageResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(page.created_events.len(), 1);
        assert_eq!(page.next_cursor().as_deref(), Some("0042"));
    }

    #[test]
    fn empty_acs_page_has_no_cursor() {
        let page: AcsPageResponse = serde_json::from_value(json!({})).unwrap();
        assert!(page.created_events.is_empty());
        assert!(page.next_cursor().is_none());
    }

    #[test]
    fn tree_event_discriminates_on_structure() {
        let created: TreeEvent = serde_json::from_value(json!({
            "contract_id": "c1",
            "template_id": "acme:Rewards:RewardCoupon",
            "create_arguments": {"beneficiary": "alice"}
        }))
        .unwrap();
        assert!(matches!(created, TreeEvent::Created(_)));

        let exercised: TreeEvent = serde_json::from_value(json!({
            "contract_id": "c1",
            "template_id": "acme:Rewards:RewardCoupon",
            "choice": "Claim",
            "choice_argument": {},
            "child_event_ids": ["e2"]
        }))
        .unwrap();
        match exercised {
            TreeEvent::Exercised(e) => {
                assert_eq!(e.choice, "Claim");
                assert_eq!(e.child_event_ids, vec!["e2"]);
            }
            TreeEvent::Created(_) => panic!("decoded as create"),
        }
    }

    #[test]
    fn transaction_cursor_tracks_record_time() {
        let tx: Transaction = serde_json::from_value(json!({
            "update_id": "u1",
            "record_time": "2024-07-01T12:00:00Z",
            "migration_id": 3,
            "root_event_ids": ["e1"],
            "events_by_id": {}
        }))
        .unwrap();
        let cursor = tx.cursor();
        assert_eq!(cursor.migration_id, 3);
        assert_eq!(cursor.record_time, tx.record_time);
    }
}
