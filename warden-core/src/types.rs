//! Domain types shared across the agent.
//!
//! All enums that cross the process boundary (state file, wire) are
//! serde-serializable with their canonical uppercase spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Geographic partition of the backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[default]
    Na,
    Eu,
    Apac,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Na => write!(f, "NA"),
            Region::Eu => write!(f, "EU"),
            Region::Apac => write!(f, "APAC"),
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NA" => Ok(Region::Na),
            "EU" => Ok(Region::Eu),
            "APAC" => Ok(Region::Apac),
            other => Err(format!("invalid region '{other}' (valid: NA, EU, APAC)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Target environment
// ---------------------------------------------------------------------------

/// Backend environment the agent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetEnv {
    Local,
    Dev,
    Qa,
    #[default]
    Prod,
}

impl fmt::Display for TargetEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetEnv::Local => write!(f, "LOCAL"),
            TargetEnv::Dev => write!(f, "DEV"),
            TargetEnv::Qa => write!(f, "QA"),
            TargetEnv::Prod => write!(f, "PROD"),
        }
    }
}

impl FromStr for TargetEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(TargetEnv::Local),
            "DEV" => Ok(TargetEnv::Dev),
            "QA" => Ok(TargetEnv::Qa),
            "PROD" => Ok(TargetEnv::Prod),
            other => Err(format!(
                "invalid environment '{other}' (valid: LOCAL, DEV, QA, PROD)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// Where the last sync attempt left the agent.
///
/// `Never` is the zero value for a fresh (or cleared) state document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    #[default]
    Never,
    Running,
    Success,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Never => write!(f, "NEVER"),
            SyncState::Running => write!(f, "RUNNING"),
            SyncState::Success => write!(f, "SUCCESS"),
            SyncState::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Cached profile of the account the agent was registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
