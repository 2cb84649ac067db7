//! `warden unregister` — clear registration data and credentials.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use warden_core::StateStore;

/// Arguments for `warden unregister`.
#[derive(Args, Debug)]
pub struct UnregisterArgs {
    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl UnregisterArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let store = StateStore::open_at(&home).context("failed to open state store")?;

        if !store.is_registered() {
            println!("Agent is not currently registered.");
            return Ok(());
        }

        if !self.yes {
            if let Some(user) = store.user() {
                println!(
                    "Currently registered as: {} ({})",
                    user.display_name(),
                    user.email
                );
            }
            print!("Are you sure you want to unregister? [y/N]: ");
            std::io::stdout().flush().ok();

            let mut response = String::new();
            std::io::stdin()
                .read_line(&mut response)
                .context("failed to read confirmation")?;
            if !matches!(response.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                println!("Unregistration cancelled.");
                return Ok(());
            }
        }

        store.clear().context("failed to clear agent state")?;
        println!("{} Agent unregistered.", "✓".green());
        println!();
        println!("To register again, run: warden register YOUR_TOKEN --region NA");
        Ok(())
    }
}
