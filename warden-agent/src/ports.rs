//! Consumer-side ports over the collector and the API gateway.
//!
//! The orchestrator and handshake are written against these two traits so
//! the throttle/state-machine properties can be tested with counting fakes;
//! the production impls delegate straight to the concrete types.

use std::path::PathBuf;

use warden_api::{ApiClient, ApiError, InitDataResponse, RegisterAck, SyncResponse};
use warden_collector::{Collector, CollectorError};
use warden_core::{DeviceIdentifiers, TelemetrySnapshot, UserProfile};

/// Produces telemetry snapshots and the registration identity tuple.
pub trait TelemetrySource {
    fn collect(&self, agent_version: &str) -> Result<TelemetrySnapshot, CollectorError>;
    fn device_identifiers(&self) -> Result<DeviceIdentifiers, CollectorError>;
}

/// The backend operations the orchestration layer needs.
pub trait ComplianceApi {
    fn set_bearer(&mut self, token: &str);
    fn set_correlation_id(&mut self, id: &str);
    fn exchange_bootstrap_token(&self, token: &str) -> Result<String, ApiError>;
    fn fetch_profile(&self) -> Result<UserProfile, ApiError>;
    fn register_device(&self, identifiers: &DeviceIdentifiers) -> Result<RegisterAck, ApiError>;
    fn submit_snapshot(&self, snapshot: &TelemetrySnapshot) -> Result<SyncResponse, ApiError>;
    fn init_data(&self) -> Result<InitDataResponse, ApiError>;
}

impl ComplianceApi for ApiClient {
    fn set_bearer(&mut self, token: &str) {
        ApiClient::set_bearer(self, token);
    }

    fn set_correlation_id(&mut self, id: &str) {
        ApiClient::set_correlation_id(self, id);
    }

    fn exchange_bootstrap_token(&self, token: &str) -> Result<String, ApiError> {
        ApiClient::exchange_bootstrap_token(self, token)
    }

    fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        ApiClient::fetch_profile(self)
    }

    fn register_device(&self, identifiers: &DeviceIdentifiers) -> Result<RegisterAck, ApiError> {
        ApiClient::register_device(self, identifiers)
    }

    fn submit_snapshot(&self, snapshot: &TelemetrySnapshot) -> Result<SyncResponse, ApiError> {
        ApiClient::submit_snapshot(self, snapshot)
    }

    fn init_data(&self) -> Result<InitDataResponse, ApiError> {
        ApiClient::init_data(self)
    }
}

/// Locates the engine at collection time rather than up front, so an absent
/// engine binary surfaces inside the sync pipeline (state goes to `ERROR`)
/// instead of failing before the attempt is recorded.
#[derive(Debug, Clone, Default)]
pub struct LazyCollector {
    engine_path: Option<PathBuf>,
}

impl LazyCollector {
    pub fn new(engine_path: Option<PathBuf>) -> Self {
        Self { engine_path }
    }
}

impl TelemetrySource for LazyCollector {
    fn collect(&self, agent_version: &str) -> Result<TelemetrySnapshot, CollectorError> {
        let collector = Collector::new(self.engine_path.as_deref())?;
        Ok(collector.collect(agent_version))
    }

    fn device_identifiers(&self) -> Result<DeviceIdentifiers, CollectorError> {
        let collector = Collector::new(self.engine_path.as_deref())?;
        Ok(collector.device_identifiers())
    }
}
