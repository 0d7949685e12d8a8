use anyhow::{Context, Result, bail};
use clap::Args;

use lmr_snapshot::{ChainConfig, SnapshotChain};

use crate::opts::MirrorOpts;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Ledger migration epoch to snapshot
    #[arg(long, env = "LMR_MIGRATION_ID")]
    pub migration_id: u64,

    /// Previous snapshot id for lineage
    #[arg(long)]
    pub previous: Option<String>,
}

#[derive(Args, Debug)]
pub struct ContinueArgs {
    /// Snapshot id
    #[arg(long)]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Existing snapshot to resume; a new one is started when omitted
    #[arg(long)]
    pub id: Option<String>,

    /// Ledger migration epoch (required when starting fresh)
    #[arg(long, env = "LMR_MIGRATION_ID")]
    pub migration_id: Option<u64>,

    /// Invocation budget for the chain loop
    #[arg(long, default_value_t = 1000)]
    pub max_invocations: u32,

    /// Retries per transient batch failure
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Snapshot id
    #[arg(long)]
    pub id: String,
}

fn chain(opts: &MirrorOpts, migration_id: u64, previous: Option<String>) -> Result<SnapshotChain> {
    let ledger = opts.ledger()?;
    let source = opts
        .ledger_url
        .as_ref()
        .map(|u| u.as_str().to_string())
        .unwrap_or_default();
    Ok(SnapshotChain::new(
        ledger,
        opts.store()?,
        opts.registry()?,
        ChainConfig {
            source,
            migration_id,
            previous_snapshot: previous,
            ..ChainConfig::default()
        },
    ))
}

pub async fn cmd_start(opts: &MirrorOpts, args: &StartArgs) -> Result<()> {
    let chain = chain(opts, args.migration_id, args.previous.clone())?;
    let id = chain.start_snapshot().await.context("start snapshot")?;
    opts.emit(&serde_json::json!({ "snapshot_id": id }), || id.clone())
}

pub async fn cmd_continue(opts: &MirrorOpts, args: &ContinueArgs) -> Result<()> {
    let registry = opts.registry()?;
    let snapshot = registry
        .load(&args.id)?
        .with_context(|| format!("snapshot {} not found", args.id))?;
    let chain = chain(opts, snapshot.migration_id, None)?;
    let outcome = chain
        .continue_snapshot(&args.id)
        .await
        .context("continue snapshot")?;
    opts.emit(
        &serde_json::json!({ "outcome": format!("{outcome:?}") }),
        || format!("{outcome:?}"),
    )
}

pub async fn cmd_run(opts: &MirrorOpts, args: &RunArgs) -> Result<()> {
    let (id, migration_id) = match &args.id {
        Some(id) => {
            let registry = opts.registry()?;
            let snapshot = registry
                .load(id)?
                .with_context(|| format!("snapshot {id} not found"))?;
            (Some(id.clone()), snapshot.migration_id)
        }
        None => match args.migration_id {
            Some(migration_id) => (None, migration_id),
            None => bail!("--migration-id is required when starting a new snapshot"),
        },
    };

    let chain = chain(opts, migration_id, None)?;
    let id = match id {
        Some(id) => id,
        None => chain.start_snapshot().await.context("start snapshot")?,
    };
    let snapshot = chain
        .run_to_completion(&id, args.max_invocations, args.max_retries)
        .await
        .context("run snapshot chain")?;

    opts.emit(&snapshot, || {
        format!(
            "snapshot {} {}: unlocked {} locked {} circulating {} ({} pages, {} records)",
            snapshot.id,
            snapshot.status.as_str(),
            snapshot.unlocked,
            snapshot.locked,
            snapshot.circulating,
            snapshot.processed_pages,
            snapshot.processed_records
        )
    })
}

pub async fn cmd_status(opts: &MirrorOpts, args: &StatusArgs) -> Result<()> {
    let registry = opts.registry()?;
    let snapshot = registry
        .load(&args.id)?
        .with_context(|| format!("snapshot {} not found", args.id))?;
    let stats = registry.entity_stats(&args.id)?;

    opts.emit(
        &serde_json::json!({ "snapshot": snapshot, "entity_stats": stats }),
        || {
            let mut lines = vec![format!(
                "snapshot {} {} as of {} (cursor {:?})",
                snapshot.id,
                snapshot.status.as_str(),
                snapshot.record_time,
                snapshot.cursor
            )];
            lines.push(format!(
                "  unlocked {} locked {} circulating {}",
                snapshot.unlocked, snapshot.locked, snapshot.circulating
            ));
            for s in &stats {
                lines.push(format!(
                    "  {}: {} chunks, {} records",
                    s.entity_type, s.chunk_count, s.record_count
                ));
            }
            lines.join("\n")
        },
    )
}
