//! The platform adapter: one entry point over the per-platform probe
//! catalogs.

use std::path::Path;

use serde_json::{json, Value};

use warden_core::telemetry::{DeviceIdentifiers, TelemetrySnapshot};

use crate::engine::Engine;
use crate::error::CollectorError;
use crate::linux::{DebianProbes, RpmProbes};
use crate::macos::MacosProbes;
use crate::platform::{Platform, ProbeCatalog};
use crate::windows::WindowsProbes;

static MACOS: MacosProbes = MacosProbes;
static WINDOWS: WindowsProbes = WindowsProbes;
static LINUX_RPM: RpmProbes = RpmProbes;
static LINUX_DEBIAN: DebianProbes = DebianProbes;

/// Collects telemetry snapshots and device identifiers for the detected
/// platform.
///
/// Construction is the only fallible step: it detects the platform and
/// locates/validates the engine binary. After that, [`Collector::collect`]
/// always produces a snapshot — probes that fail simply leave their fact
/// absent.
#[derive(Debug)]
pub struct Collector {
    engine: Engine,
    platform: Platform,
}

impl Collector {
    /// Detect the platform and locate the engine binary; `engine_path` is an
    /// explicit override from configuration.
    pub fn new(engine_path: Option<&Path>) -> Result<Self, CollectorError> {
        let platform = Platform::detect()?;
        let engine = Engine::locate(engine_path)?;
        Ok(Self { engine, platform })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn catalog(&self) -> &'static dyn ProbeCatalog {
        match self.platform {
            Platform::MacOs => &MACOS,
            Platform::Windows => &WINDOWS,
            Platform::LinuxRpm => &LINUX_RPM,
            Platform::LinuxDebian => &LINUX_DEBIAN,
        }
    }

    /// Run the full probe catalog and return a fresh snapshot.
    pub fn collect(&self, agent_version: &str) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::new(agent_version, self.platform.tag());
        self.catalog().fill_facts(&self.engine, &mut snapshot.facts);
        snapshot
    }

    /// Minimal identity tuple for registration.
    pub fn device_identifiers(&self) -> DeviceIdentifiers {
        self.catalog().identifiers(&self.engine)
    }

    /// Engine/OS/identity overview for `status --verbose`.
    pub fn debug_info(&self) -> Value {
        let mut info = serde_json::Map::new();
        if let Ok(Some(row)) = self.engine.query_first("SELECT version FROM osquery_info") {
            info.insert("engine".to_string(), Value::Object(row));
        }
        if let Ok(Some(row)) = self
            .engine
            .query_first("SELECT version, build, platform FROM os_version")
        {
            info.insert("os".to_string(), Value::Object(row));
        }
        info.insert(
            "identifiers".to_string(),
            json!(self.device_identifiers()),
        );
        Value::Object(info)
    }
}
