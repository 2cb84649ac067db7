//! `warden register` — one-time registration handshake.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use warden_agent::register;
use warden_agent::LazyCollector;
use warden_api::ApiClient;
use warden_core::{AgentConfig, Region, StateStore, TargetEnv, AGENT_VERSION};

/// Arguments for `warden register`.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// One-time bootstrap token from the registration link.
    pub token: String,

    /// Backend region.
    #[arg(long, short = 'r', default_value = "NA")]
    pub region: Region,

    /// Target environment (defaults to the configured one).
    #[arg(long, value_name = "ENV")]
    pub env: Option<TargetEnv>,
}

impl RegisterArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let mut cfg = AgentConfig::load_at(&home).context("failed to load config")?;
        cfg.region = self.region;
        if let Some(env) = self.env {
            cfg.target_env = env;
        }

        let store = StateStore::open_at(&home).context("failed to open state store")?;
        let mut api = ApiClient::new(cfg.target_env, cfg.region, AGENT_VERSION);
        let source = LazyCollector::new(cfg.engine_path.clone());

        println!("Registering agent ({} region)...", self.region);
        let profile = register::run(
            &store,
            &mut api,
            &source,
            &self.token,
            self.region,
            AGENT_VERSION,
        )?;

        println!(
            "Authenticated as: {} ({})",
            profile.display_name(),
            profile.email
        );
        println!("{} Agent registered successfully!", "✓".green());
        println!();
        println!("Run 'warden sync' to upload your first posture snapshot,");
        println!("or 'warden daemon' for periodic syncs.");
        Ok(())
    }
}
