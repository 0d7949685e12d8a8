use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use lmr_aggregate::{DEFAULT_CONCURRENCY, HoldingSelector, sum_field};

use crate::opts::MirrorOpts;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Field {
    /// Unlocked holding amount
    Unlocked,
    /// Locked holding amount (one nesting level deeper)
    Locked,
}

impl From<Field> for HoldingSelector {
    fn from(field: Field) -> Self {
        match field {
            Field::Unlocked => HoldingSelector::UnlockedAmount,
            Field::Locked => HoldingSelector::LockedAmount,
        }
    }
}

#[derive(Args, Debug)]
pub struct SumArgs {
    /// Snapshot id
    #[arg(long)]
    pub snapshot: String,

    /// Entity-type suffix to match, e.g. ":Holding"
    #[arg(long)]
    pub suffix: String,

    /// Which holding field to sum
    #[arg(long, value_enum)]
    pub field: Field,

    /// Concurrent chunk downloads
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

pub async fn cmd_sum(opts: &MirrorOpts, args: &SumArgs) -> Result<()> {
    let store = opts.store()?;
    let selector: HoldingSelector = args.field.into();
    let outcome = sum_field(
        &store,
        &args.snapshot,
        &args.suffix,
        &selector,
        args.concurrency,
    )
    .await
    .context("aggregate sum")?;

    opts.emit(
        &serde_json::json!({
            "sum": outcome.sum,
            "record_count": outcome.record_count,
            "manifest_count": outcome.manifest_count,
        }),
        || {
            format!(
                "sum {} over {} records from {} manifests",
                outcome.sum, outcome.record_count, outcome.manifest_count
            )
        },
    )
}
