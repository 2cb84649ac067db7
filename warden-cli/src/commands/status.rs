//! `warden status` — registration and sync visibility.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use warden_api::resolve_base_url;
use warden_collector::Collector;
use warden_core::{AgentConfig, StateStore, SyncState, AGENT_VERSION};

/// Arguments for `warden status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Include engine/OS/identity details (runs the engine).
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Serialize)]
struct StatusReport {
    version: &'static str,
    environment: String,
    region: String,
    api_endpoint: String,
    registered: bool,
    user: Option<String>,
    email: Option<String>,
    sync_state: SyncState,
    last_checked_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    sync_interval_hours: u64,
    min_hours_since_last_sync: i64,
    min_minutes_between_syncs: i64,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let cfg = AgentConfig::load_at(&home).context("failed to load config")?;
        let store = StateStore::open_at(&home).context("failed to open state store")?;

        let snapshot = store.snapshot();
        let region = snapshot.region.unwrap_or(cfg.region);
        let report = StatusReport {
            version: AGENT_VERSION,
            environment: cfg.target_env.to_string(),
            region: region.to_string(),
            api_endpoint: resolve_base_url(cfg.target_env, region).to_string(),
            registered: snapshot.is_registered(),
            user: snapshot.user.as_ref().map(|u| u.display_name()),
            email: snapshot.user.as_ref().map(|u| u.email.clone()),
            sync_state: snapshot.sync_state,
            last_checked_at: snapshot.last_checked_at,
            last_attempt_at: snapshot.last_attempt_at,
            sync_interval_hours: cfg.sync_interval_hours,
            min_hours_since_last_sync: cfg.min_hours_since_last_sync,
            min_minutes_between_syncs: cfg.min_minutes_between_syncs,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status")?
            );
            return Ok(());
        }

        print_table(&report);

        if self.verbose {
            print_engine_details(&cfg);
        }
        Ok(())
    }
}

fn print_table(report: &StatusReport) {
    println!("Warden Agent v{}", report.version);

    let registration = if report.registered {
        format!("{} registered", "✓".green())
    } else {
        format!("{} not registered", "✗".red())
    };

    let mut rows = vec![
        StatusRow {
            field: "environment",
            value: report.environment.clone(),
        },
        StatusRow {
            field: "region",
            value: report.region.clone(),
        },
        StatusRow {
            field: "api endpoint",
            value: report.api_endpoint.clone(),
        },
        StatusRow {
            field: "registration",
            value: registration,
        },
    ];
    if let (Some(user), Some(email)) = (&report.user, &report.email) {
        rows.push(StatusRow {
            field: "user",
            value: format!("{user} ({email})"),
        });
    }
    rows.push(StatusRow {
        field: "sync state",
        value: sync_state_label(report.sync_state),
    });
    rows.push(StatusRow {
        field: "last success",
        value: format_age(report.last_checked_at),
    });
    rows.push(StatusRow {
        field: "last attempt",
        value: format_age(report.last_attempt_at),
    });
    rows.push(StatusRow {
        field: "sync cadence",
        value: format!(
            "every {}h (min {}h since success, {}m between attempts)",
            report.sync_interval_hours,
            report.min_hours_since_last_sync,
            report.min_minutes_between_syncs,
        ),
    });

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !report.registered {
        println!();
        println!(
            "To register, run: warden register YOUR_TOKEN --region {}",
            report.region
        );
    }
}

fn print_engine_details(cfg: &AgentConfig) {
    match Collector::new(cfg.engine_path.as_deref()) {
        Ok(collector) => match serde_json::to_string_pretty(&collector.debug_info()) {
            Ok(details) => println!("{details}"),
            Err(err) => println!("warning: could not render engine details: {err}"),
        },
        Err(err) => println!("warning: could not initialize engine: {err}"),
    }
}

fn sync_state_label(state: SyncState) -> String {
    match state {
        SyncState::Never => "never synced".to_string(),
        SyncState::Running => format!("{} in progress", "⋯".yellow()),
        SyncState::Success => format!("{} success", "✓".green()),
        SyncState::Error => format!("{} error", "✗".red()),
    }
}

fn format_age(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let elapsed = Utc::now() - at;
    let age = if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    };
    format!("{} ({age})", at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn format_age_buckets() {
        assert_eq!(format_age(None), "never");
        let now = Utc::now();
        assert!(format_age(Some(now)).contains("just now"));
        assert!(format_age(Some(now - Duration::minutes(30))).contains("30m ago"));
        assert!(format_age(Some(now - Duration::hours(5))).contains("5h ago"));
        assert!(format_age(Some(now - Duration::days(3))).contains("3d ago"));
    }
}
