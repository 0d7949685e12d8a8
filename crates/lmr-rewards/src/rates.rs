//! Phase one: build the issuance-round rate tables from round-lifecycle
//! creation events observed inside the grace-extended window.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use lmr_ledger::DynLedger;
use lmr_ledger::wire::{TreeEvent, UpdatesRequest};
use lmr_types::{Amount, RecordTime, select};

use crate::{Phase, ReducerConfig, RewardsError, RewardsResult};

pub const ISSUING_ROUND_SUFFIX: &str = ":IssuingRound";
pub const CLOSED_ROUND_SUFFIX: &str = ":ClosedRound";

const ROUND_FIELD: &str = "round";
const RATE_FIELD: &str = "rate_per_weight";

/// Round number → per-unit-of-weight issuance rate.
///
/// Claims resolve against rounds still issuing at consume time; expiries
/// resolve against rounds that have closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTables {
    pub issuing: BTreeMap<u64, Amount>,
    pub closed: BTreeMap<u64, Amount>,
}

impl RateTables {
    pub fn rate_for_claim(&self, round: u64) -> Option<Amount> {
        self.issuing.get(&round).copied()
    }

    pub fn rate_for_expiry(&self, round: u64) -> Option<Amount> {
        self.closed.get(&round).copied()
    }
}

pub(crate) struct RoundCollection {
    pub tables: RateTables,
    pub truncated: bool,
}

pub(crate) async fn collect_rounds(
    ledger: &DynLedger,
    config: &ReducerConfig,
    deadline: RecordTime,
) -> RewardsResult<RoundCollection> {
    let mut tables = RateTables::default();
    let mut cursor = config.start;
    let mut truncated = true;

    'paging: for batch in 0..config.max_batches {
        let page = ledger
            .updates_page(&UpdatesRequest {
                page_size: config.page_size,
                after: cursor,
            })
            .await
            .map_err(|source| RewardsError::Upstream {
                phase: Phase::CollectingRounds,
                batch,
                source,
            })?;

        if page.transactions.is_empty() {
            truncated = false;
            break;
        }

        for tx in &page.transactions {
            if tx.record_time > deadline {
                truncated = false;
                break 'paging;
            }
            for event in tx.events_by_id.values() {
                let TreeEvent::Created(created) = event else {
                    continue;
                };
                let table = if created.template_id.ends_with(ISSUING_ROUND_SUFFIX) {
                    &mut tables.issuing
                } else if created.template_id.ends_with(CLOSED_ROUND_SUFFIX) {
                    &mut tables.closed
                } else {
                    continue;
                };
                match round_rate(&created.create_arguments) {
                    Some((round, rate)) => {
                        table.insert(round, rate);
                    }
                    None => warn!(
                        template = %created.template_id,
                        contract = %created.contract_id,
                        "round creation without round/rate fields, skipped"
                    ),
                }
            }
            cursor = tx.cursor();
        }
    }

    debug!(
        issuing = tables.issuing.len(),
        closed = tables.closed.len(),
        truncated,
        "round collection finished"
    );
    Ok(RoundCollection { tables, truncated })
}

pub(crate) fn round_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn round_rate(create_arguments: &Value) -> Option<(u64, Amount)> {
    let round = round_number(create_arguments.as_object()?.get(ROUND_FIELD)?)?;
    let rate = select::amount_at(create_arguments, &[RATE_FIELD])?;
    Some((round, rate))
}
