//! # warden-collector
//!
//! Platform adapter over the local telemetry engine (osquery).
//!
//! Call [`Collector::new`] to locate and validate the engine binary, then
//! [`Collector::collect`] for a full posture snapshot or
//! [`Collector::device_identifiers`] for the registration identity tuple.
//! Individual probe failures are logged and leave their fact absent; only a
//! missing/unusable engine binary is fatal.

pub mod adapter;
pub mod engine;
pub mod error;
pub mod platform;
pub mod session;

mod linux;
mod macos;
mod windows;

pub use adapter::Collector;
pub use engine::Engine;
pub use error::{CollectorError, ProbeError};
pub use platform::Platform;
