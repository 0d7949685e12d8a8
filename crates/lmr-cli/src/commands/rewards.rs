use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Args;

use lmr_ledger::wire::UpdateCursor;
use lmr_rewards::{ReducerConfig, reduce};
use lmr_types::{Amount, RecordTime};

use crate::opts::MirrorOpts;

#[derive(Args, Debug)]
pub struct RewardsArgs {
    /// Beneficiary party the coupons belong to
    #[arg(long)]
    pub beneficiary: String,

    /// Ledger migration epoch the starting checkpoint belongs to
    #[arg(long, env = "LMR_MIGRATION_ID")]
    pub migration_id: u64,

    /// Record-time to start paging from (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub start: DateTime<Utc>,

    /// Nominal end of the collection window (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub end: DateTime<Utc>,

    /// Coupon round weight this run accounts for
    #[arg(long)]
    pub expected_weight: Amount,

    /// Grace minutes for late round-lifecycle events
    #[arg(long, default_value_t = 10)]
    pub grace_minutes: i64,

    /// Per-phase batch ceiling
    #[arg(long, default_value_t = 1000)]
    pub max_batches: u32,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {e}"))
}

pub async fn cmd_rewards(opts: &MirrorOpts, args: &RewardsArgs) -> Result<()> {
    let ledger = opts.ledger()?;
    let mut config = ReducerConfig::new(
        args.beneficiary.clone(),
        UpdateCursor {
            migration_id: args.migration_id,
            record_time: RecordTime(args.start),
        },
        RecordTime(args.end),
        args.expected_weight,
    );
    config.grace = Duration::minutes(args.grace_minutes);
    config.max_batches = args.max_batches;

    let summary = reduce(&ledger, &config).await.context("reduce rewards")?;

    opts.emit(&summary, || {
        let mut lines = vec![
            format!(
                "claimed {} ({}), expired {} ({}), unclaimed {} (est. {})",
                summary.claimed_count,
                summary.claimed_amount,
                summary.expired_count,
                summary.expired_amount,
                summary.unclaimed_count,
                summary.estimated_unclaimed_amount
            ),
        ];
        if summary.truncated {
            lines.push("warning: partial result, batch ceiling reached".into());
        }
        for warning in &summary.warnings {
            lines.push(format!("warning: {warning}"));
        }
        lines.join("\n")
    })
}
