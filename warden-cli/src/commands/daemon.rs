//! `warden daemon` — foreground daemon with periodic syncs.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use warden_agent::daemon;
use warden_core::{AgentConfig, StateStore, AGENT_VERSION};

/// Arguments for `warden daemon`.
#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Sync interval in hours (overrides the configured cadence).
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let cfg = AgentConfig::load_at(&home).context("failed to load config")?;
        let store = Arc::new(StateStore::open_at(&home).context("failed to open state store")?);

        let interval = self.interval.unwrap_or(cfg.sync_interval_hours);
        println!("Warden Agent daemon (v{AGENT_VERSION})");
        println!("Sync interval: every {interval} hours");
        println!("Press ctrl-c to stop");
        println!();

        daemon::start_blocking(&cfg, store, self.interval).context("daemon exited with error")?;
        println!("Daemon stopped");
        Ok(())
    }
}
