//! Global CLI options shared by every subcommand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use url::Url;

use lmr_ledger::{DynLedger, HttpLedgerClient, LedgerClientConfig};
use lmr_snapshot::{DynRegistry, SqliteRegistry};
use lmr_store::{DynStore, FsStore};

#[derive(Args, Debug, Clone)]
pub struct MirrorOpts {
    /// Upstream ledger API base URL (env: LMR_LEDGER_URL)
    #[arg(long, global = true, env = "LMR_LEDGER_URL")]
    pub ledger_url: Option<Url>,

    /// Chunk/manifest store directory (env: LMR_STORE)
    #[arg(long, global = true, env = "LMR_STORE", default_value = "./mirror-data")]
    pub store_dir: PathBuf,

    /// Control-plane sqlite file (env: LMR_DB, default: <store-dir>/control.sqlite)
    #[arg(long, global = true, env = "LMR_DB")]
    pub db: Option<PathBuf>,

    /// Upstream request timeout in seconds (env: LMR_TIMEOUT_SECS)
    #[arg(long, global = true, env = "LMR_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// JSON output
    #[arg(long, global = true)]
    pub json: bool,
}

impl MirrorOpts {
    pub fn ledger(&self) -> Result<DynLedger> {
        let base_url = self
            .ledger_url
            .clone()
            .context("ledger URL is required (--ledger-url or LMR_LEDGER_URL)")?;
        let mut config = LedgerClientConfig::new(base_url);
        config.timeout = Duration::from_secs(self.timeout_secs);
        let client = HttpLedgerClient::new(config).context("build ledger client")?;
        Ok(Arc::new(client))
    }

    pub fn store(&self) -> Result<DynStore> {
        let store = FsStore::open(&self.store_dir)
            .with_context(|| format!("open store at {}", self.store_dir.display()))?;
        Ok(Arc::new(store))
    }

    pub fn registry(&self) -> Result<DynRegistry> {
        let path = self
            .db
            .clone()
            .unwrap_or_else(|| self.store_dir.join("control.sqlite"));
        let registry = SqliteRegistry::open(&path)
            .with_context(|| format!("open control database at {}", path.display()))?;
        Ok(Arc::new(registry))
    }

    pub fn emit(&self, value: &impl serde::Serialize, human: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}
