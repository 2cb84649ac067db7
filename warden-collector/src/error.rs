//! Error types for warden-collector.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal collector errors — the engine binary cannot be located or trusted.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// No usable osquery binary on PATH or in any known location.
    #[error("osquery binary not found in PATH or common locations; searched:\n{searched}")]
    EngineNotFound { searched: String },

    /// A candidate binary failed validation and will not be executed.
    #[error("refusing to execute engine binary at {path}: {reason}")]
    EngineRejected { path: PathBuf, reason: String },

    /// The host OS is not one the probe catalogs cover.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-probe failures. These are recovered inside the probe catalogs — a
/// failed probe logs and leaves its fact absent — and never cross the
/// collector boundary.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("engine query failed: {0}")]
    Query(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("failed to parse engine output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
