//! The sync orchestrator: a throttled state machine around one
//! collect-and-upload pipeline.
//!
//! This is the canonical sync entrypoint for both `warden sync` and the
//! daemon tick. State transitions: `NEVER → RUNNING → {SUCCESS, ERROR}`,
//! with either terminal state re-enterable to `RUNNING` on the next attempt.

use chrono::Utc;

use warden_core::{AgentConfig, StateStore, StateUpdate, SyncState};

use crate::error::AgentError;
use crate::ports::{ComplianceApi, TelemetrySource};

/// Minimum-spacing rules that suppress redundant sync attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub min_minutes_between_syncs: i64,
    pub min_hours_since_last_sync: i64,
}

impl From<&AgentConfig> for ThrottlePolicy {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            min_minutes_between_syncs: cfg.min_minutes_between_syncs,
            min_hours_since_last_sync: cfg.min_hours_since_last_sync,
        }
    }
}

/// What a trigger call did. Skips are deliberate no-ops, not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Full pipeline ran and the upload was acknowledged.
    Completed,
    /// A sync is already in flight; refused regardless of `forced`.
    SkippedRunning,
    /// Last attempt was too recent; `wait_minutes` until the next window.
    SkippedTooSoon { wait_minutes: i64 },
    /// Last success is fresh enough that nothing needs uploading.
    SkippedRecentSuccess { hours_since: i64 },
}

/// Trigger one sync attempt.
///
/// `forced` bypasses both time-based throttles (operator-triggered
/// troubleshooting) but never the single-run guard — overlapping uploads
/// are refused unconditionally.
pub fn run(
    store: &StateStore,
    api: &impl ComplianceApi,
    source: &impl TelemetrySource,
    policy: &ThrottlePolicy,
    agent_version: &str,
    forced: bool,
) -> Result<SyncOutcome, AgentError> {
    if !store.is_registered() {
        return Err(AgentError::NotRegistered);
    }

    if store.sync_state() == SyncState::Running {
        return Ok(SyncOutcome::SkippedRunning);
    }

    if !forced {
        if let Some(minutes) = store.minutes_since_last_attempt() {
            if minutes < policy.min_minutes_between_syncs {
                return Ok(SyncOutcome::SkippedTooSoon {
                    wait_minutes: policy.min_minutes_between_syncs - minutes,
                });
            }
        }
        if let Some(hours) = store.hours_since_last_success() {
            if hours < policy.min_hours_since_last_sync {
                return Ok(SyncOutcome::SkippedRecentSuccess {
                    hours_since: hours,
                });
            }
        }
    }

    // The attempt is on: mark RUNNING and stamp the attempt clock before any
    // network traffic.
    store.set_sync_state(SyncState::Running)?;
    store.set_last_attempt_at(Utc::now())?;

    match execute_pipeline(store, api, source, agent_version, forced) {
        Ok(()) => {
            store.set_sync_state(SyncState::Success)?;
            Ok(SyncOutcome::Completed)
        }
        Err(err) => {
            // Best effort — the pipeline error is the one worth surfacing.
            let _ = store.set_sync_state(SyncState::Error);
            Err(err)
        }
    }
}

fn execute_pipeline(
    store: &StateStore,
    api: &impl ComplianceApi,
    source: &impl TelemetrySource,
    agent_version: &str,
    forced: bool,
) -> Result<(), AgentError> {
    if !store.is_init_data_ready() {
        let init = api.init_data()?;
        store.set_av_service_signatures(init.av_service_signatures.unwrap_or_default())?;
    }

    let mut snapshot = source.collect(agent_version)?;
    snapshot.manual_run = forced;

    let response = api.submit_snapshot(&snapshot)?;

    store.update(StateUpdate {
        last_checked_at: response.last_checked_at,
        compliance: response.compliance,
        av_service_signatures: response.av_service_signatures,
        ..Default::default()
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::sync::Arc;

    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    use warden_api::{ApiError, InitDataResponse, RegisterAck, SyncResponse};
    use warden_collector::CollectorError;
    use warden_core::{
        DeviceIdentifiers, PlatformTag, TelemetrySnapshot, UserProfile,
    };

    use super::*;

    const POLICY: ThrottlePolicy = ThrottlePolicy {
        min_minutes_between_syncs: 15,
        min_hours_since_last_sync: 24,
    };

    struct FakeApi {
        store: Option<Arc<StateStore>>,
        init_calls: Cell<usize>,
        sync_calls: Cell<usize>,
        fail_init: bool,
        fail_sync: bool,
        signatures: Option<Vec<String>>,
        seen_snapshot: RefCell<Option<TelemetrySnapshot>>,
        state_at_first_network_call: RefCell<Option<SyncState>>,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                store: None,
                init_calls: Cell::new(0),
                sync_calls: Cell::new(0),
                fail_init: false,
                fail_sync: false,
                signatures: Some(vec!["Defender".to_string()]),
                seen_snapshot: RefCell::new(None),
                state_at_first_network_call: RefCell::new(None),
            }
        }

        fn observing(store: Arc<StateStore>) -> Self {
            Self {
                store: Some(store),
                ..Self::new()
            }
        }

        fn record_state(&self) {
            if let Some(store) = &self.store {
                if self.state_at_first_network_call.borrow().is_none() {
                    *self.state_at_first_network_call.borrow_mut() = Some(store.sync_state());
                }
            }
        }
    }

    impl ComplianceApi for FakeApi {
        fn set_bearer(&mut self, _token: &str) {}
        fn set_correlation_id(&mut self, _id: &str) {}

        fn exchange_bootstrap_token(&self, _token: &str) -> Result<String, ApiError> {
            unreachable!("sync never exchanges tokens")
        }

        fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
            unreachable!("sync never fetches profiles")
        }

        fn register_device(
            &self,
            _identifiers: &DeviceIdentifiers,
        ) -> Result<RegisterAck, ApiError> {
            unreachable!("sync never registers")
        }

        fn submit_snapshot(&self, snapshot: &TelemetrySnapshot) -> Result<SyncResponse, ApiError> {
            self.record_state();
            self.sync_calls.set(self.sync_calls.get() + 1);
            *self.seen_snapshot.borrow_mut() = Some(snapshot.clone());
            if self.fail_sync {
                return Err(ApiError::Network("connection reset".to_string()));
            }
            Ok(SyncResponse {
                last_checked_at: Some(Utc::now()),
                compliance: Some(json!({"checks": [{"id": "screenlock", "passed": true}]})),
                av_service_signatures: None,
            })
        }

        fn init_data(&self) -> Result<InitDataResponse, ApiError> {
            self.record_state();
            self.init_calls.set(self.init_calls.get() + 1);
            if self.fail_init {
                return Err(ApiError::AccountMaintenance);
            }
            Ok(InitDataResponse {
                av_service_signatures: self.signatures.clone(),
            })
        }
    }

    struct FakeSource {
        collect_calls: Cell<usize>,
        fail: bool,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                collect_calls: Cell::new(0),
                fail: false,
            }
        }
    }

    impl TelemetrySource for FakeSource {
        fn collect(&self, agent_version: &str) -> Result<TelemetrySnapshot, CollectorError> {
            self.collect_calls.set(self.collect_calls.get() + 1);
            if self.fail {
                return Err(CollectorError::EngineNotFound {
                    searched: "  - nowhere".to_string(),
                });
            }
            Ok(TelemetrySnapshot::new(agent_version, PlatformTag::Linux))
        }

        fn device_identifiers(&self) -> Result<DeviceIdentifiers, CollectorError> {
            Ok(DeviceIdentifiers::default())
        }
    }

    fn registered_store(home: &TempDir) -> StateStore {
        let store = StateStore::open_at(home.path()).expect("open store");
        store
            .set_access_token(Some("bearer-token".to_string()))
            .expect("token");
        store
    }

    #[test]
    fn unregistered_store_refuses_to_sync() {
        let home = TempDir::new().expect("home");
        let store = StateStore::open_at(home.path()).expect("open");
        let err = run(&store, &FakeApi::new(), &FakeSource::new(), &POLICY, "0.3.2", false)
            .unwrap_err();
        assert!(matches!(err, AgentError::NotRegistered));
    }

    #[test]
    fn forced_sync_runs_full_pipeline_regardless_of_timestamps() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);
        store.set_last_attempt_at(Utc::now()).expect("attempt");
        store.set_last_checked_at(Utc::now()).expect("checked");

        let api = FakeApi::new();
        let source = FakeSource::new();
        let outcome = run(&store, &api, &source, &POLICY, "0.3.2", true).expect("run");

        assert_eq!(outcome, SyncOutcome::Completed);
        assert_eq!(source.collect_calls.get(), 1);
        assert_eq!(api.sync_calls.get(), 1);
        assert_eq!(store.sync_state(), SyncState::Success);
    }

    #[test]
    fn too_soon_skip_makes_zero_collector_and_gateway_calls() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);
        store
            .set_last_attempt_at(Utc::now() - Duration::minutes(5))
            .expect("attempt");

        let api = FakeApi::new();
        let source = FakeSource::new();
        let outcome = run(&store, &api, &source, &POLICY, "0.3.2", false).expect("run");

        assert_eq!(outcome, SyncOutcome::SkippedTooSoon { wait_minutes: 10 });
        assert_eq!(source.collect_calls.get(), 0);
        assert_eq!(api.init_calls.get(), 0);
        assert_eq!(api.sync_calls.get(), 0);
    }

    #[test]
    fn recent_success_skips_quietly() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);
        store
            .set_last_attempt_at(Utc::now() - Duration::minutes(40))
            .expect("attempt");
        store
            .set_last_checked_at(Utc::now() - Duration::hours(2))
            .expect("checked");

        let api = FakeApi::new();
        let source = FakeSource::new();
        let outcome = run(&store, &api, &source, &POLICY, "0.3.2", false).expect("run");

        assert_eq!(outcome, SyncOutcome::SkippedRecentSuccess { hours_since: 2 });
        assert_eq!(api.sync_calls.get(), 0);
    }

    #[test]
    fn running_guard_refuses_even_forced_triggers() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);
        store.set_sync_state(SyncState::Running).expect("state");

        let api = FakeApi::new();
        let source = FakeSource::new();
        for forced in [false, true] {
            let outcome = run(&store, &api, &source, &POLICY, "0.3.2", forced).expect("run");
            assert_eq!(outcome, SyncOutcome::SkippedRunning);
        }
        assert_eq!(source.collect_calls.get(), 0);
        assert_eq!(api.sync_calls.get(), 0);
    }

    #[test]
    fn running_is_set_strictly_before_the_first_network_call() {
        let home = TempDir::new().expect("home");
        let store = Arc::new(registered_store(&home));

        let api = FakeApi::observing(store.clone());
        run(&*store, &api, &FakeSource::new(), &POLICY, "0.3.2", true).expect("run");

        assert_eq!(
            *api.state_at_first_network_call.borrow(),
            Some(SyncState::Running)
        );
    }

    #[test]
    fn state_leaves_running_for_exactly_one_terminal_state() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        // Success path.
        run(&store, &FakeApi::new(), &FakeSource::new(), &POLICY, "0.3.2", true).expect("run");
        assert_eq!(store.sync_state(), SyncState::Success);

        // Error path (upload fails).
        let mut api = FakeApi::new();
        api.fail_sync = true;
        let err = run(&store, &api, &FakeSource::new(), &POLICY, "0.3.2", true).unwrap_err();
        assert!(matches!(err, AgentError::Api(ApiError::Network(_))));
        assert_eq!(store.sync_state(), SyncState::Error);
    }

    #[test]
    fn init_data_failure_aborts_to_error_before_collection() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        let mut api = FakeApi::new();
        api.fail_init = true;
        let source = FakeSource::new();
        let err = run(&store, &api, &source, &POLICY, "0.3.2", true).unwrap_err();

        assert!(matches!(err, AgentError::Api(ApiError::AccountMaintenance)));
        assert_eq!(store.sync_state(), SyncState::Error);
        assert_eq!(source.collect_calls.get(), 0, "must abort before collecting");
    }

    #[test]
    fn collector_failure_aborts_to_error_before_upload() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        let api = FakeApi::new();
        let mut source = FakeSource::new();
        source.fail = true;
        let err = run(&store, &api, &source, &POLICY, "0.3.2", true).unwrap_err();

        assert!(matches!(err, AgentError::Collector(_)));
        assert_eq!(store.sync_state(), SyncState::Error);
        assert_eq!(api.sync_calls.get(), 0, "must abort before uploading");
    }

    #[test]
    fn init_data_is_cached_and_not_refetched() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        let api = FakeApi::new();
        run(&store, &api, &FakeSource::new(), &POLICY, "0.3.2", true).expect("first");
        assert_eq!(api.init_calls.get(), 1);
        assert!(store.is_init_data_ready());

        run(&store, &api, &FakeSource::new(), &POLICY, "0.3.2", true).expect("second");
        assert_eq!(api.init_calls.get(), 1, "cached init data must be reused");
    }

    #[test]
    fn empty_init_list_still_counts_as_cached() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        let mut api = FakeApi::new();
        api.signatures = Some(vec![]);
        run(&store, &api, &FakeSource::new(), &POLICY, "0.3.2", true).expect("run");
        assert!(store.is_init_data_ready());
    }

    #[test]
    fn manual_run_flag_mirrors_forced() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        let api = FakeApi::new();
        run(&store, &api, &FakeSource::new(), &POLICY, "0.3.2", true).expect("run");
        assert!(api.seen_snapshot.borrow().as_ref().unwrap().manual_run);

        store.clear().expect("clear");
        let store = registered_store(&home);
        let api = FakeApi::new();
        run(&store, &api, &FakeSource::new(), &POLICY, "0.3.2", false).expect("run");
        assert!(!api.seen_snapshot.borrow().as_ref().unwrap().manual_run);
    }

    #[test]
    fn success_persists_server_clock_and_compliance_payload() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        run(&store, &FakeApi::new(), &FakeSource::new(), &POLICY, "0.3.2", true).expect("run");

        let snap = store.snapshot();
        assert!(snap.last_checked_at.is_some());
        assert!(snap.compliance.is_some());
    }

    #[test]
    fn attempt_clock_is_monotonically_non_decreasing() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        run(&store, &FakeApi::new(), &FakeSource::new(), &POLICY, "0.3.2", true).expect("first");
        let first = store.last_attempt_at().expect("first attempt");
        run(&store, &FakeApi::new(), &FakeSource::new(), &POLICY, "0.3.2", true).expect("second");
        let second = store.last_attempt_at().expect("second attempt");
        assert!(second >= first);
    }

    #[test]
    fn error_state_is_reenterable_on_the_next_attempt() {
        let home = TempDir::new().expect("home");
        let store = registered_store(&home);

        let mut failing = FakeApi::new();
        failing.fail_sync = true;
        let _ = run(&store, &failing, &FakeSource::new(), &POLICY, "0.3.2", true);
        assert_eq!(store.sync_state(), SyncState::Error);

        let outcome =
            run(&store, &FakeApi::new(), &FakeSource::new(), &POLICY, "0.3.2", true).expect("run");
        assert_eq!(outcome, SyncOutcome::Completed);
        assert_eq!(store.sync_state(), SyncState::Success);
    }
}
