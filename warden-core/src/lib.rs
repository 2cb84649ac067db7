//! # warden-core
//!
//! Domain types, configuration, and the persistent agent state store shared
//! by every Warden crate. Nothing in here talks to the network or spawns
//! processes; it is the layer the collector, API gateway, and orchestrator
//! all sit on.

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::AgentConfig;
pub use error::{ConfigError, StoreError};
pub use store::{AgentState, StateStore, StateUpdate};
pub use telemetry::{
    AntivirusFact, AutoUpdateFact, AvProbeResult, DeviceIdentifiers, FactBag, PlatformTag,
    SettingValue, TelemetrySnapshot,
};
pub use types::{Region, SyncState, TargetEnv, UserProfile};

/// Version string reported to the backend and stamped into the user agent.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
