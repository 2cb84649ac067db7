//! One-time registration handshake.
//!
//! Exchanges a single-use bootstrap token for a durable bearer credential,
//! registers the device identity, and persists the confirmation. Each step
//! is individually failable; a failure in the registration call rolls the
//! persisted credential back so the handshake can be retried cleanly with a
//! fresh token (bootstrap tokens are single-use, so a half-registered
//! credential could never be completed with the same link anyway).

use uuid::Uuid;

use warden_core::{Region, StateStore, UserProfile};

use crate::error::AgentError;
use crate::ports::{ComplianceApi, TelemetrySource};

/// Run the handshake. Returns the authenticated profile on success.
pub fn run(
    store: &StateStore,
    api: &mut impl ComplianceApi,
    source: &impl TelemetrySource,
    token: &str,
    region: Region,
    agent_version: &str,
) -> Result<UserProfile, AgentError> {
    if store.is_registered() {
        return Err(AgentError::AlreadyRegistered);
    }

    store.set_region(region)?;

    // Stable correlation identifier, generated exactly once.
    let correlation_id = match store.correlation_id() {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4();
            store.set_correlation_id(id)?;
            id
        }
    };
    api.set_correlation_id(&correlation_id.to_string());

    // Token exchange. A failure here leaves no credential persisted.
    let access_token = api.exchange_bootstrap_token(token)?;
    store.set_access_token(Some(access_token.clone()))?;
    api.set_bearer(&access_token);

    match complete_registration(store, api, source, agent_version) {
        Ok(profile) => Ok(profile),
        Err(err) => {
            // Roll back to the pre-handshake credential state; region and
            // correlation id survive for the retry.
            let _ = store.set_access_token(None);
            let _ = store.set_user(None);
            api.set_bearer("");
            Err(err)
        }
    }
}

fn complete_registration(
    store: &StateStore,
    api: &impl ComplianceApi,
    source: &impl TelemetrySource,
    agent_version: &str,
) -> Result<UserProfile, AgentError> {
    let profile = api.fetch_profile()?;
    store.set_user(Some(profile.clone()))?;

    let identifiers = source.device_identifiers()?;
    let ack = api.register_device(&identifiers)?;
    if let Some(checked_at) = ack.last_checked_at {
        store.set_last_checked_at(checked_at)?;
    }

    // Persisting the running version confirms a completed bootstrap.
    store.set_agent_version(agent_version)?;
    Ok(profile)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
