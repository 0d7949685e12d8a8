//! Phase two: replay the update log up to the nominal window end, walking
//! each transaction's event tree for coupon creates and consumes.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use lmr_ledger::DynLedger;
use lmr_ledger::wire::{TreeEvent, UpdatesRequest};
use lmr_types::{Amount, RecordTime, select};

use crate::rates::{RateTables, round_number};
use crate::{Phase, ReducerConfig, RewardsError, RewardsResult};

pub const COUPON_SUFFIX: &str = ":RewardCoupon";
pub const CHOICE_CLAIM: &str = "RewardCoupon_Claim";
pub const CHOICE_EXPIRE: &str = "RewardCoupon_Expire";

/// An outstanding reward coupon held in memory for one reduction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coupon {
    pub contract_id: String,
    pub beneficiary: String,
    pub weight: Amount,
    pub round: u64,
    pub expires_at: Option<RecordTime>,
    /// Weight already minted against this coupon; only the remainder pays
    /// out at claim/expiry time.
    pub minted_weight: Amount,
}

impl Coupon {
    fn from_create(contract_id: &str, create_arguments: &Value) -> Option<Coupon> {
        let fields = create_arguments.as_object()?;
        Some(Coupon {
            contract_id: contract_id.to_string(),
            beneficiary: fields.get("beneficiary")?.as_str()?.to_string(),
            weight: select::amount_of(fields.get("weight")?)?,
            round: round_number(fields.get("round")?)?,
            expires_at: fields
                .get("expires_at")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            minted_weight: fields
                .get("minted_weight")
                .and_then(select::amount_of)
                .unwrap_or(Amount::ZERO),
        })
    }
}

pub(crate) struct CouponReplay {
    pub active: HashMap<String, Coupon>,
    pub claimed_count: u64,
    pub claimed_amount: Amount,
    pub expired_count: u64,
    pub expired_amount: Amount,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

pub(crate) async fn collect_coupons(
    ledger: &DynLedger,
    config: &ReducerConfig,
    rates: &RateTables,
) -> RewardsResult<CouponReplay> {
    let mut replay = CouponReplay {
        active: HashMap::new(),
        claimed_count: 0,
        claimed_amount: Amount::ZERO,
        expired_count: 0,
        expired_amount: Amount::ZERO,
        truncated: true,
        warnings: Vec::new(),
    };
    let mut cursor = config.start;

    'paging: for batch in 0..config.max_batches {
        let page = ledger
            .updates_page(&UpdatesRequest {
                page_size: config.page_size,
                after: cursor,
            })
            .await
            .map_err(|source| RewardsError::Upstream {
                phase: Phase::CollectingCoupons,
                batch,
                source,
            })?;

        if page.transactions.is_empty() {
            replay.truncated = false;
            break;
        }

        for tx in &page.transactions {
            // No grace here: consumes after the nominal end belong to the
            // next window even though their round rates were collected.
            if tx.record_time > config.end_time {
                replay.truncated = false;
                break 'paging;
            }
            for root in &tx.root_event_ids {
                walk(root, &tx.events_by_id, 0, config, rates, &mut replay)?;
            }
            cursor = tx.cursor();
        }
    }

    debug!(
        claimed = replay.claimed_count,
        expired = replay.expired_count,
        outstanding = replay.active.len(),
        truncated = replay.truncated,
        "coupon replay finished"
    );
    Ok(replay)
}

fn walk(
    event_id: &str,
    events: &HashMap<String, TreeEvent>,
    depth: u32,
    config: &ReducerConfig,
    rates: &RateTables,
    replay: &mut CouponReplay,
) -> RewardsResult<()> {
    if depth > config.max_event_depth {
        warn!(event_id, depth, "event tree deeper than bound, subtree skipped");
        return Ok(());
    }
    match events.get(event_id) {
        None => {}
        Some(TreeEvent::Created(created)) => {
            if created.template_id.ends_with(COUPON_SUFFIX) {
                match Coupon::from_create(&created.contract_id, &created.create_arguments) {
                    Some(coupon) if coupon.beneficiary == config.beneficiary => {
                        replay.active.insert(coupon.contract_id.clone(), coupon);
                    }
                    Some(_) => {}
                    None => warn!(
                        contract = %created.contract_id,
                        "coupon creation with incomplete arguments, skipped"
                    ),
                }
            }
        }
        Some(TreeEvent::Exercised(exercised)) => {
            let is_claim = exercised.choice == CHOICE_CLAIM;
            if is_claim || exercised.choice == CHOICE_EXPIRE {
                consume(&exercised.contract_id, is_claim, config, rates, replay)?;
            }
            for child in &exercised.child_event_ids {
                walk(child, events, depth + 1, config, rates, replay)?;
            }
        }
    }
    Ok(())
}

fn consume(
    contract_id: &str,
    is_claim: bool,
    config: &ReducerConfig,
    rates: &RateTables,
    replay: &mut CouponReplay,
) -> RewardsResult<()> {
    let Some(coupon) = replay.active.get(contract_id) else {
        return Ok(());
    };
    // Only coupons carrying the requested round weight are resolved; a
    // mismatch is not this run's instrument and stays untouched.
    if coupon.weight != config.expected_weight {
        warn!(
            contract = %coupon.contract_id,
            weight = %coupon.weight,
            expected = %config.expected_weight,
            "consume with unexpected weight, coupon left outstanding"
        );
        return Ok(());
    }
    let coupon = replay
        .active
        .remove(contract_id)
        .expect("presence checked above");

    let rate = if is_claim {
        rates.rate_for_claim(coupon.round)
    } else {
        rates.rate_for_expiry(coupon.round)
    };

    let amount = match rate {
        Some(rate) => coupon
            .weight
            .checked_sub(coupon.minted_weight)?
            .max(Amount::ZERO)
            .checked_mul(rate)?,
        None => {
            let table = if is_claim { "issuing" } else { "closed" };
            warn!(
                contract = %coupon.contract_id,
                round = coupon.round,
                table,
                "no rate collected for round, consume counted with zero amount"
            );
            replay.warnings.push(format!(
                "round {} missing from the {table} rate table; coupon {} counted with zero amount",
                coupon.round, coupon.contract_id
            ));
            Amount::ZERO
        }
    };

    if is_claim {
        replay.claimed_count += 1;
        replay.claimed_amount = replay.claimed_amount.checked_add(amount)?;
    } else {
        replay.expired_count += 1;
        replay.expired_amount = replay.expired_amount.checked_add(amount)?;
    }
    Ok(())
}
