//! Warden — workstation compliance agent CLI.
//!
//! # Usage
//!
//! ```text
//! warden register <token> [--region NA|EU|APAC] [--env LOCAL|DEV|QA|PROD]
//! warden sync [--force]
//! warden status [--json] [--verbose]
//! warden unregister [--yes]
//! warden daemon [--interval <hours>]
//! warden config show|set|path|init
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonArgs, register::RegisterArgs, status::StatusArgs,
    sync::SyncArgs, unregister::UnregisterArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Workstation compliance agent — collects security posture and reports it to Warden",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register this device using a one-time bootstrap token.
    Register(RegisterArgs),

    /// Collect a posture snapshot and upload it.
    Sync(SyncArgs),

    /// Show registration and sync status.
    Status(StatusArgs),

    /// Clear local registration data and credentials.
    Unregister(UnregisterArgs),

    /// Run in the foreground with periodic syncs.
    Daemon(DaemonArgs),

    /// Manage agent configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Register(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Unregister(args) => args.run(),
        Commands::Daemon(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
