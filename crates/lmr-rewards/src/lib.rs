//! Reward ledger reducer: replays the transaction-update stream in two
//! passes to classify every reward coupon for one beneficiary as claimed,
//! expired, or still outstanding, with a decimal total per class.
//!
//! Pass one collects issuance-round rate tables inside a grace-extended
//! window; pass two re-pages the same log (independent cursor) and walks
//! each transaction's event tree for coupon creates and consumes. The run
//! holds no durable checkpoint: callers retry the whole computation, which
//! is why both passes carry strict batch bounds.

mod coupons;
mod rates;

pub use coupons::{CHOICE_CLAIM, CHOICE_EXPIRE, COUPON_SUFFIX, Coupon};
pub use rates::{CLOSED_ROUND_SUFFIX, ISSUING_ROUND_SUFFIX, RateTables};

use std::fmt;

use chrono::Duration;
use serde::Serialize;

use lmr_ledger::{DynLedger, LedgerError};
use lmr_ledger::wire::UpdateCursor;
use lmr_types::{Amount, AmountError, RecordTime};

pub type RewardsResult<T> = Result<T, RewardsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CollectingRounds,
    CollectingCoupons,
    Summarizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::CollectingRounds => "collecting-rounds",
            Phase::CollectingCoupons => "collecting-coupons",
            Phase::Summarizing => "summarizing",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RewardsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream fetch failed in phase {phase} at batch {batch}: {source}")]
    Upstream {
        phase: Phase,
        batch: u32,
        #[source]
        source: LedgerError,
    },
    #[error("amount arithmetic failed: {0}")]
    Amount(#[from] AmountError),
}

#[derive(Debug, Clone)]
pub struct ReducerConfig {
    pub beneficiary: String,
    /// Where both passes start paging from.
    pub start: UpdateCursor,
    /// Nominal end of the collection window.
    pub end_time: RecordTime,
    /// Extension applied in the round-collection pass only: a coupon's
    /// consuming event can land slightly after the nominal end, and its
    /// round's rate must still be resolvable.
    pub grace: Duration,
    /// Coupon weight this run accounts for; consumes with another recorded
    /// weight are not accumulated.
    pub expected_weight: Amount,
    pub page_size: u32,
    /// Per-phase batch ceiling; reaching it yields a partial result.
    pub max_batches: u32,
    /// Defensive bound on event-tree recursion over untrusted data.
    pub max_event_depth: u32,
}

impl ReducerConfig {
    pub fn new(
        beneficiary: impl Into<String>,
        start: UpdateCursor,
        end_time: RecordTime,
        expected_weight: Amount,
    ) -> Self {
        Self {
            beneficiary: beneficiary.into(),
            start,
            end_time,
            grace: Duration::minutes(10),
            expected_weight,
            page_size: 100,
            max_batches: 1000,
            max_event_depth: 64,
        }
    }

    /// Fail fast on bad parameters, before any network call.
    fn validate(&self) -> RewardsResult<RecordTime> {
        if self.beneficiary.trim().is_empty() {
            return Err(RewardsError::InvalidInput("beneficiary is required".into()));
        }
        if self.start.record_time >= self.end_time {
            return Err(RewardsError::InvalidInput(
                "start record-time must precede end time".into(),
            ));
        }
        if self.expected_weight.is_negative() || self.expected_weight.is_zero() {
            return Err(RewardsError::InvalidInput(
                "expected round weight must be positive".into(),
            ));
        }
        self.end_time
            .checked_add(self.grace)
            .ok_or_else(|| RewardsError::InvalidInput("grace window overflows time range".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardSummary {
    pub claimed_count: u64,
    pub claimed_amount: Amount,
    pub expired_count: u64,
    pub expired_amount: Amount,
    pub unclaimed_count: u64,
    /// Extrapolated from the average claimed amount per coupon; outstanding
    /// coupons have no resolved rate yet, so this is an estimate by design.
    pub estimated_unclaimed_amount: Amount,
    /// True when either pass hit its batch ceiling before draining the log.
    pub truncated: bool,
    pub warnings: Vec<String>,
}

/// Run the full reduction: CollectingRounds, then CollectingCoupons, then
/// Summarizing.
pub async fn reduce(ledger: &DynLedger, config: &ReducerConfig) -> RewardsResult<RewardSummary> {
    let rounds_deadline = config.validate()?;

    let rounds = rates::collect_rounds(ledger, config, rounds_deadline).await?;
    let replay = coupons::collect_coupons(ledger, config, &rounds.tables).await?;

    let mut warnings = Vec::new();
    if rounds.truncated {
        warnings.push(format!(
            "round collection stopped at the {}-batch ceiling; rate tables may be incomplete",
            config.max_batches
        ));
    }
    if replay.truncated {
        warnings.push(format!(
            "coupon replay stopped at the {}-batch ceiling; totals cover a partial window",
            config.max_batches
        ));
    }
    warnings.extend(replay.warnings);

    let unclaimed_count = replay.active.len() as u64;
    let estimated_unclaimed_amount = if replay.claimed_count > 0 && unclaimed_count > 0 {
        replay
            .claimed_amount
            .checked_div_count(replay.claimed_count)?
            .checked_mul_count(unclaimed_count)?
    } else {
        Amount::ZERO
    };

    Ok(RewardSummary {
        claimed_count: replay.claimed_count,
        claimed_amount: replay.claimed_amount,
        expired_count: replay.expired_count,
        expired_amount: replay.expired_amount,
        unclaimed_count,
        estimated_unclaimed_amount,
        truncated: rounds.truncated || replay.truncated,
        warnings,
    })
}
