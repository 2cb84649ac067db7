//! `warden config` — view and modify agent configuration.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use warden_core::config::{config_path_at, AgentConfig};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,

    /// Set a configuration value.
    Set { key: String, value: String },

    /// Show the configuration file path.
    Path,

    /// Write the default configuration file.
    Init,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        ConfigCommand::Show => {
            let cfg = AgentConfig::load_at(&home).context("failed to load config")?;
            println!("region: {}", cfg.region);
            println!("target_env: {}", cfg.target_env);
            println!("sync_interval_hours: {}", cfg.sync_interval_hours);
            println!("min_hours_since_last_sync: {}", cfg.min_hours_since_last_sync);
            println!(
                "min_minutes_between_syncs: {}",
                cfg.min_minutes_between_syncs
            );
            match &cfg.engine_path {
                Some(path) => println!("engine_path: {}", path.display()),
                None => println!("engine_path: (auto-detect)"),
            }
        }
        ConfigCommand::Set { key, value } => {
            let mut cfg = AgentConfig::load_at(&home).context("failed to load config")?;
            cfg.set_key(&key, &value)?;
            cfg.save_at(&home).context("failed to save config")?;
            println!("{} Set {key} = {value}", "✓".green());
        }
        ConfigCommand::Path => {
            println!("{}", config_path_at(&home).display());
        }
        ConfigCommand::Init => {
            AgentConfig::default()
                .save_at(&home)
                .context("failed to save config")?;
            println!(
                "{} Configuration initialized at: {}",
                "✓".green(),
                config_path_at(&home).display()
            );
        }
    }
    Ok(())
}
