//! Daemon runtime: a timer-driven trigger thread over the sync orchestrator.
//!
//! Every scheduled tick is isolated — a pipeline failure is logged and the
//! next tick proceeds; no failure path terminates the daemon process.

use std::sync::Arc;
use std::time::Duration;

use warden_api::ApiClient;
use warden_core::{AgentConfig, StateStore, AGENT_VERSION};

use crate::error::AgentError;
use crate::ports::LazyCollector;
use crate::scheduler::Scheduler;
use crate::sync::{self, SyncOutcome, ThrottlePolicy};

const SYNC_JOB_ID: &str = "sync";
/// Delay before the one initial run after process start.
const INITIAL_SYNC_DELAY: Duration = Duration::from_secs(10);

/// Start the daemon runtime and block the current thread until it exits
/// (ctrl-c). `interval_hours` overrides the configured cadence.
pub fn start_blocking(
    cfg: &AgentConfig,
    store: Arc<StateStore>,
    interval_hours: Option<u64>,
) -> Result<(), AgentError> {
    init_tracing();

    if !store.is_registered() {
        return Err(AgentError::NotRegistered);
    }

    let interval_hours = interval_hours.unwrap_or(cfg.sync_interval_hours).max(1);
    let api = Arc::new(build_api(cfg, &store));
    let source = Arc::new(LazyCollector::new(cfg.engine_path.clone()));
    let policy = ThrottlePolicy::from(cfg);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(store, api, source, policy, interval_hours));
    Ok(())
}

/// Build the gateway for a registered store: the persisted region wins over
/// the configured one, and the cached credential/correlation id ride along.
/// Shared with the CLI's one-shot `sync`.
pub fn build_api(cfg: &AgentConfig, store: &StateStore) -> ApiClient {
    let region = store.region().unwrap_or(cfg.region);
    let mut api = ApiClient::new(cfg.target_env, region, AGENT_VERSION);
    if let Some(token) = store.access_token() {
        api.set_bearer(token);
    }
    if let Some(id) = store.correlation_id() {
        api.set_correlation_id(id.to_string());
    }
    api
}

async fn run(
    store: Arc<StateStore>,
    api: Arc<ApiClient>,
    source: Arc<LazyCollector>,
    policy: ThrottlePolicy,
    interval_hours: u64,
) {
    tracing::info!(
        version = AGENT_VERSION,
        interval_hours,
        "warden daemon started"
    );

    let mut scheduler = Scheduler::new();
    scheduler.schedule(
        SYNC_JOB_ID,
        Duration::from_secs(interval_hours * 60 * 60),
        INITIAL_SYNC_DELAY,
        move || {
            tick(&store, &api, &source, &policy);
        },
    );

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down daemon"),
        Err(err) => tracing::error!(error = %err, "ctrl-c handler failed, shutting down"),
    }

    // Graceful: an in-flight collection-and-upload cycle runs to completion.
    scheduler.shutdown().await;
    tracing::info!("warden daemon stopped");
}

fn tick(store: &StateStore, api: &ApiClient, source: &LazyCollector, policy: &ThrottlePolicy) {
    match sync::run(store, api, source, policy, AGENT_VERSION, false) {
        Ok(SyncOutcome::Completed) => tracing::info!("sync completed"),
        Ok(SyncOutcome::SkippedRunning) => {
            tracing::info!("sync already in progress, skipping")
        }
        Ok(SyncOutcome::SkippedTooSoon { wait_minutes }) => {
            tracing::info!(wait_minutes, "last attempt too recent, skipping")
        }
        Ok(SyncOutcome::SkippedRecentSuccess { hours_since }) => {
            tracing::info!(hours_since, "recent successful sync, skipping")
        }
        Err(err) => tracing::error!(error = %err, "sync failed"),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
