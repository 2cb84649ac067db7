//! Persistent agent state store.
//!
//! One JSON document per user account at
//! `<home>/.warden-agent/data/agent-state.json`, mirrored in memory behind a
//! single coarse lock. Every mutating call re-serializes the full document
//! and writes it synchronously (sibling `.tmp` + rename) before the lock is
//! released, so the on-disk state is never more than one mutation behind
//! memory. Lock scope is per call; callers needing several fields written
//! together must go through [`StateStore::update`].
//!
//! Credential material lives here — the data directory is `0700` and the
//! file `0600`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::data_dir_at;
use crate::error::{io_err, StoreError};
use crate::types::{Region, SyncState, UserProfile};

const STATE_FILE: &str = "agent-state.json";

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// The persisted agent state document.
///
/// A cleared state has every field at its zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    pub sync_state: SyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub av_service_signatures: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<Value>,
}

impl AgentState {
    /// A non-empty bearer credential implies "registered".
    pub fn is_registered(&self) -> bool {
        matches!(&self.access_token, Some(token) if !token.is_empty())
    }

    /// The bootstrap/init signal list has been fetched and cached.
    pub fn is_init_data_ready(&self) -> bool {
        self.av_service_signatures.is_some()
    }
}

/// Partial-field update applied atomically in one write.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub correlation_id: Option<Uuid>,
    pub access_token: Option<String>,
    pub region: Option<Region>,
    pub agent_version: Option<String>,
    pub sync_state: Option<SyncState>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub user: Option<UserProfile>,
    pub av_service_signatures: Option<Vec<String>>,
    pub compliance: Option<Value>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Single-document persistent store for registration/sync state.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<AgentState>,
}

impl StateStore {
    /// Open (or create empty) the state store under `<home>/.warden-agent/data/`.
    pub fn open_at(home: &Path) -> Result<Self, StoreError> {
        let dir = data_dir_at(home);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            // Both the agent directory and the data directory hold
            // credential material.
            if let Some(parent) = dir.parent() {
                set_dir_permissions(parent)?;
            }
            set_dir_permissions(&dir)?;
        }
        let path = dir.join(STATE_FILE);
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            serde_json::from_str(&contents).map_err(|e| StoreError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            AgentState::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Self::open_at(&home)
    }

    /// Path of the backing JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- reads --------------------------------------------------------------

    /// Clone of the full document.
    pub fn snapshot(&self) -> AgentState {
        self.lock().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.lock().is_registered()
    }

    pub fn is_init_data_ready(&self) -> bool {
        self.lock().is_init_data_ready()
    }

    pub fn sync_state(&self) -> SyncState {
        self.lock().sync_state
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        self.lock().correlation_id
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn region(&self) -> Option<Region> {
        self.lock().region
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    pub fn av_service_signatures(&self) -> Option<Vec<String>> {
        self.lock().av_service_signatures.clone()
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_checked_at
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_attempt_at
    }

    /// Whole minutes since the last sync attempt; `None` if never attempted.
    pub fn minutes_since_last_attempt(&self) -> Option<i64> {
        self.lock()
            .last_attempt_at
            .map(|t| (Utc::now() - t).num_minutes())
    }

    /// Whole hours since the last successful sync; `None` if never succeeded.
    pub fn hours_since_last_success(&self) -> Option<i64> {
        self.lock()
            .last_checked_at
            .map(|t| (Utc::now() - t).num_hours())
    }

    // -- writes -------------------------------------------------------------

    pub fn set_correlation_id(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(|s| s.correlation_id = Some(id))
    }

    pub fn set_access_token(&self, token: Option<String>) -> Result<(), StoreError> {
        self.mutate(|s| s.access_token = token)
    }

    pub fn set_region(&self, region: Region) -> Result<(), StoreError> {
        self.mutate(|s| s.region = Some(region))
    }

    pub fn set_agent_version(&self, version: impl Into<String>) -> Result<(), StoreError> {
        let version = version.into();
        self.mutate(|s| s.agent_version = Some(version))
    }

    pub fn set_sync_state(&self, state: SyncState) -> Result<(), StoreError> {
        self.mutate(|s| s.sync_state = state)
    }

    pub fn set_last_checked_at(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(|s| s.last_checked_at = Some(at))
    }

    pub fn set_last_attempt_at(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(|s| s.last_attempt_at = Some(at))
    }

    pub fn set_user(&self, user: Option<UserProfile>) -> Result<(), StoreError> {
        self.mutate(|s| s.user = user)
    }

    pub fn set_av_service_signatures(&self, list: Vec<String>) -> Result<(), StoreError> {
        self.mutate(|s| s.av_service_signatures = Some(list))
    }

    /// Apply several fields in one lock acquisition and one write.
    pub fn update(&self, update: StateUpdate) -> Result<(), StoreError> {
        self.mutate(|s| {
            if let Some(v) = update.correlation_id {
                s.correlation_id = Some(v);
            }
            if let Some(v) = update.access_token {
                s.access_token = Some(v);
            }
            if let Some(v) = update.region {
                s.region = Some(v);
            }
            if let Some(v) = update.agent_version {
                s.agent_version = Some(v);
            }
            if let Some(v) = update.sync_state {
                s.sync_state = v;
            }
            if let Some(v) = update.last_checked_at {
                s.last_checked_at = Some(v);
            }
            if let Some(v) = update.last_attempt_at {
                s.last_attempt_at = Some(v);
            }
            if let Some(v) = update.user {
                s.user = Some(v);
            }
            if let Some(v) = update.av_service_signatures {
                s.av_service_signatures = Some(v);
            }
            if let Some(v) = update.compliance {
                s.compliance = Some(v);
            }
        })
    }

    /// Reset every field to its zero value, preserving the file location.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.mutate(|s| *s = AgentState::default())
    }

    // -- internals ----------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, AgentState> {
        // A poisoned lock means a previous writer panicked mid-mutation; the
        // in-memory mirror is still a plain value, so keep serving it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate(&self, f: impl FnOnce(&mut AgentState)) -> Result<(), StoreError> {
        let mut guard = self.lock();
        f(&mut guard);
        persist(&self.path, &guard)
    }
}

/// Serialize the full document and write it atomically: `.tmp` sibling →
/// `chmod 0600` → `rename`.
fn persist(path: &Path, state: &AgentState) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_store(home: &TempDir) -> StateStore {
        StateStore::open_at(home.path()).expect("open store")
    }

    #[test]
    fn fresh_store_is_empty_and_unregistered() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        assert!(!store.is_registered());
        assert!(!store.is_init_data_ready());
        assert_eq!(store.sync_state(), SyncState::Never);
        assert!(store.minutes_since_last_attempt().is_none());
        assert!(store.hours_since_last_success().is_none());
    }

    #[test]
    fn every_mutation_is_visible_after_reopen() {
        let home = TempDir::new().expect("home");
        let id = Uuid::new_v4();
        {
            let store = make_store(&home);
            store.set_correlation_id(id).expect("uuid");
            store
                .set_access_token(Some("tok-123".to_string()))
                .expect("token");
            store.set_region(Region::Eu).expect("region");
            store.set_sync_state(SyncState::Success).expect("state");
        }
        let reopened = make_store(&home);
        assert_eq!(reopened.correlation_id(), Some(id));
        assert_eq!(reopened.access_token().as_deref(), Some("tok-123"));
        assert_eq!(reopened.region(), Some(Region::Eu));
        assert_eq!(reopened.sync_state(), SyncState::Success);
        assert!(reopened.is_registered());
    }

    #[test]
    fn update_writes_all_fields_together() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        let checked = Utc::now();

        store
            .update(StateUpdate {
                last_checked_at: Some(checked),
                compliance: Some(json!({"checks": [{"passed": true}]})),
                av_service_signatures: Some(vec!["Defender".to_string()]),
                sync_state: Some(SyncState::Success),
                ..Default::default()
            })
            .expect("update");

        let snap = store.snapshot();
        assert_eq!(snap.last_checked_at, Some(checked));
        assert_eq!(snap.compliance, Some(json!({"checks": [{"passed": true}]})));
        assert_eq!(
            snap.av_service_signatures,
            Some(vec!["Defender".to_string()])
        );
        assert_eq!(snap.sync_state, SyncState::Success);
    }

    #[test]
    fn clear_resets_every_field_to_zero_value() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        store.set_correlation_id(Uuid::new_v4()).expect("uuid");
        store
            .set_access_token(Some("tok".to_string()))
            .expect("token");
        store.set_region(Region::Apac).expect("region");
        store.set_sync_state(SyncState::Error).expect("state");
        store.set_last_attempt_at(Utc::now()).expect("attempt");
        store
            .set_av_service_signatures(vec!["x".to_string()])
            .expect("signatures");

        store.clear().expect("clear");

        let snap = store.snapshot();
        assert_eq!(snap, AgentState::default());
        assert!(!store.is_registered());

        // And the zero document survives a reload.
        let reopened = make_store(&home);
        assert_eq!(reopened.snapshot(), AgentState::default());
    }

    #[test]
    fn state_file_permissions_restricted_to_owner() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        store.set_region(Region::Na).expect("region");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let file_mode = std::fs::metadata(store.path()).unwrap().permissions().mode() & 0o777;
            let dir_mode = std::fs::metadata(store.path().parent().unwrap())
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(file_mode, 0o600);
            assert_eq!(dir_mode, 0o700);
        }
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn empty_token_does_not_count_as_registered() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        store.set_access_token(Some(String::new())).expect("token");
        assert!(!store.is_registered());
    }

    #[test]
    fn throttle_clocks_measure_elapsed_time() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        store
            .set_last_attempt_at(Utc::now() - Duration::minutes(5))
            .expect("attempt");
        store
            .set_last_checked_at(Utc::now() - Duration::hours(3))
            .expect("checked");

        assert_eq!(store.minutes_since_last_attempt(), Some(5));
        assert_eq!(store.hours_since_last_success(), Some(3));
    }

    #[test]
    fn init_data_ready_even_with_empty_list() {
        let home = TempDir::new().expect("home");
        let store = make_store(&home);
        assert!(!store.is_init_data_ready());
        store.set_av_service_signatures(vec![]).expect("signatures");
        assert!(store.is_init_data_ready());
    }
}
