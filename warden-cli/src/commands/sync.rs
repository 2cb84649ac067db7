//! `warden sync` — trigger one collect-and-upload cycle.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use warden_agent::{daemon, sync, LazyCollector, SyncOutcome, ThrottlePolicy};
use warden_core::{AgentConfig, StateStore, AGENT_VERSION};

/// Arguments for `warden sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Bypass the time-based throttles (never the single-run guard).
    #[arg(long, short = 'f')]
    pub force: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let cfg = AgentConfig::load_at(&home).context("failed to load config")?;
        let store = StateStore::open_at(&home).context("failed to open state store")?;

        let api = daemon::build_api(&cfg, &store);
        let source = LazyCollector::new(cfg.engine_path.clone());
        let policy = ThrottlePolicy::from(&cfg);

        println!("Syncing system posture...");
        match sync::run(&store, &api, &source, &policy, AGENT_VERSION, self.force)? {
            SyncOutcome::Completed => {
                println!("{} Sync completed successfully!", "✓".green());
                if let Some(checked_at) = store.last_checked_at() {
                    println!("Last successful sync: {}", checked_at.to_rfc3339());
                }
            }
            SyncOutcome::SkippedRunning => {
                println!("A sync is already in progress; nothing to do.");
            }
            SyncOutcome::SkippedTooSoon { wait_minutes } => {
                println!(
                    "Last sync attempt was too recent. Wait {wait_minutes} more minutes or use --force."
                );
            }
            SyncOutcome::SkippedRecentSuccess { hours_since } => {
                println!(
                    "Last successful sync was {hours_since} hours ago; skipping. Use --force to sync anyway."
                );
            }
        }
        Ok(())
    }
}
