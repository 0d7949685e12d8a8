mod commands;
mod opts;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::rewards::RewardsArgs;
use commands::snapshot::{ContinueArgs, RunArgs, StartArgs, StatusArgs};
use commands::sum::SumArgs;
use opts::MirrorOpts;

#[derive(Parser, Debug)]
#[command(name = "lmr", version, about = "Ledger mirror pipelines")]
struct Cli {
    #[command(flatten)]
    opts: MirrorOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot chain operations
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Sum a holding field across a snapshot's chunks
    Sum(SumArgs),

    /// Reduce the update log into reward-coupon totals
    Rewards(RewardsArgs),
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    /// Create a snapshot and schedule its first batch
    Start(StartArgs),

    /// Run one budgeted batch of an existing snapshot
    Continue(ContinueArgs),

    /// Drive a snapshot to completion in a budgeted loop
    Run(RunArgs),

    /// Show a snapshot row and its entity stats
    Status(StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();
    let opts = &cli.opts;

    match cli.command {
        Command::Snapshot(cmd) => match cmd {
            SnapshotCommand::Start(args) => commands::snapshot::cmd_start(opts, &args).await,
            SnapshotCommand::Continue(args) => commands::snapshot::cmd_continue(opts, &args).await,
            SnapshotCommand::Run(args) => commands::snapshot::cmd_run(opts, &args).await,
            SnapshotCommand::Status(args) => commands::snapshot::cmd_status(opts, &args).await,
        },
        Command::Sum(args) => commands::sum::cmd_sum(opts, &args).await,
        Command::Rewards(args) => commands::rewards::cmd_rewards(opts, &args).await,
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
