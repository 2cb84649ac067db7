//! Agent configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.warden-agent/
//!   config.yaml           (mode 0600 — sync cadence, region, engine path)
//!   data/
//!     agent-state.json    (mode 0600 — owned by the state store)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};
use crate::types::{Region, TargetEnv};

const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.warden-agent/` — pure, no I/O.
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".warden-agent")
}

/// `<home>/.warden-agent/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join(CONFIG_FILE)
}

/// `<home>/.warden-agent/data/` — pure, no I/O.
pub fn data_dir_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("data")
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// Tunable agent settings, persisted as YAML under the config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub region: Region,
    pub target_env: TargetEnv,

    /// Daemon tick cadence in hours.
    pub sync_interval_hours: u64,
    /// Skip a non-forced sync when the last success is fresher than this.
    pub min_hours_since_last_sync: i64,
    /// Skip a non-forced sync when the last attempt is fresher than this.
    pub min_minutes_between_syncs: i64,

    /// Explicit path to the osquery binary; `None` means auto-detect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            region: Region::Na,
            target_env: TargetEnv::Prod,
            sync_interval_hours: 2,
            min_hours_since_last_sync: 24,
            min_minutes_between_syncs: 15,
            engine_path: None,
        }
    }
}

impl AgentConfig {
    /// Load the config from `<home>/.warden-agent/config.yaml`, falling back
    /// to defaults when the file does not exist, then apply `WARDEN_*`
    /// environment overrides.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        let mut cfg = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| config_io_err(&path, e))?;
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    /// Atomically save the config to `<home>/.warden-agent/config.yaml`.
    ///
    /// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
    pub fn save_at(&self, home: &Path) -> Result<(), ConfigError> {
        let dir = config_dir_at(home);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| config_io_err(&dir, e))?;
            set_dir_permissions(&dir)?;
        }
        let path = config_path_at(home);
        let tmp = path.with_extension("yaml.tmp");

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&tmp, yaml).map_err(|e| config_io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, &path).map_err(|e| config_io_err(&path, e))?;
        Ok(())
    }

    /// `save_at` convenience wrapper.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_at(&home()?)
    }

    /// Override fields from `WARDEN_*` environment variables.
    ///
    /// `lookup` is injected so tests don't mutate process-global env state.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("WARDEN_REGION") {
            if let Ok(region) = v.parse() {
                self.region = region;
            }
        }
        if let Some(v) = lookup("WARDEN_TARGET_ENV") {
            if let Ok(env) = v.parse() {
                self.target_env = env;
            }
        }
        if let Some(v) = lookup("WARDEN_SYNC_INTERVAL_HOURS") {
            if let Ok(hours) = v.parse::<u64>() {
                if hours >= 1 {
                    self.sync_interval_hours = hours;
                }
            }
        }
        if let Some(v) = lookup("WARDEN_MIN_HOURS_SINCE_LAST_SYNC") {
            if let Ok(hours) = v.parse::<i64>() {
                if hours >= 0 {
                    self.min_hours_since_last_sync = hours;
                }
            }
        }
        if let Some(v) = lookup("WARDEN_MIN_MINUTES_BETWEEN_SYNCS") {
            if let Ok(minutes) = v.parse::<i64>() {
                if minutes >= 0 {
                    self.min_minutes_between_syncs = minutes;
                }
            }
        }
        if let Some(v) = lookup("WARDEN_ENGINE_PATH") {
            if !v.is_empty() {
                self.engine_path = Some(PathBuf::from(v));
            }
        }
    }

    /// Set a single field from its config-file key and a string value.
    ///
    /// Used by `warden config set`; keys match the YAML field names.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        match key {
            "region" => self.region = value.parse().map_err(|e: String| invalid(&e))?,
            "target_env" => self.target_env = value.parse().map_err(|e: String| invalid(&e))?,
            "sync_interval_hours" => {
                let hours: u64 = value
                    .parse()
                    .map_err(|_| invalid("must be a positive integer"))?;
                if hours < 1 {
                    return Err(invalid("must be a positive integer"));
                }
                self.sync_interval_hours = hours;
            }
            "min_hours_since_last_sync" => {
                let hours: i64 = value
                    .parse()
                    .map_err(|_| invalid("must be a non-negative integer"))?;
                if hours < 0 {
                    return Err(invalid("must be a non-negative integer"));
                }
                self.min_hours_since_last_sync = hours;
            }
            "min_minutes_between_syncs" => {
                let minutes: i64 = value
                    .parse()
                    .map_err(|_| invalid("must be a non-negative integer"))?;
                if minutes < 0 {
                    return Err(invalid("must be a non-negative integer"));
                }
                self.min_minutes_between_syncs = minutes;
            }
            "engine_path" => {
                self.engine_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    key: other.to_string(),
                    reason: "unknown configuration key".to_string(),
                })
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Permission helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| config_io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
