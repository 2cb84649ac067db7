//! Blocking HTTP client for the compliance backend.
//!
//! One long timeout covers slow server-side aggregation of a sync upload;
//! there are no automatic retries — the orchestrator's throttle decides when
//! the next attempt happens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use warden_core::{DeviceIdentifiers, Region, TargetEnv, TelemetrySnapshot, UserProfile};

use crate::endpoints::resolve_base_url;
use crate::error::{from_ureq, ApiError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Acknowledgement of a device registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Result of a snapshot upload: server clock, compliance payload, and any
/// refreshed diagnostic signature list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compliance: Option<Value>,
    #[serde(default)]
    pub av_service_signatures: Option<Vec<String>>,
}

/// Bootstrap data fetched once and cached by the orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitDataResponse {
    #[serde(default)]
    pub av_service_signatures: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// API gateway: base-URL resolution plus header plumbing for every call.
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
    bearer: Option<String>,
    correlation_id: Option<String>,
}

impl ApiClient {
    pub fn new(env: TargetEnv, region: Region, agent_version: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base_url: resolve_base_url(env, region).to_string(),
            user_agent: format!("warden-agent/{agent_version} ({})", std::env::consts::OS),
            bearer: None,
            correlation_id: None,
        }
    }

    /// Bearer credential attached to every subsequent request.
    pub fn set_bearer(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.bearer = if token.is_empty() { None } else { Some(token) };
    }

    /// Stable correlation identifier attached to every subsequent request.
    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = Some(id.into());
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let mut req = self
            .agent
            .request(method, &format!("{}{}", self.base_url, path))
            .set("Content-Type", "application/json")
            .set("User-Agent", &self.user_agent);
        if let Some(id) = &self.correlation_id {
            req = req.set("Correlation-Id", id);
        }
        if let Some(token) = &self.bearer {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }
        req
    }

    // -- endpoints ----------------------------------------------------------

    /// `POST /auth/magic-link/{token}` — exchange a one-time bootstrap token
    /// for a bearer credential.
    pub fn exchange_bootstrap_token(&self, token: &str) -> Result<String, ApiError> {
        let response = self
            .request("POST", &format!("/auth/magic-link/{token}"))
            .call()
            .map_err(from_ureq)?;
        let exchanged: TokenExchangeResponse = response.into_json().map_err(ApiError::Decode)?;
        match exchanged.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(access_token),
            _ => Err(ApiError::EmptyCredential),
        }
    }

    /// `GET /users/me` — profile of the account behind the credential.
    pub fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let response = self.request("GET", "/users/me").call().map_err(from_ureq)?;
        response.into_json().map_err(ApiError::Decode)
    }

    /// `POST /agentv2/register` — register device identity.
    pub fn register_device(&self, identifiers: &DeviceIdentifiers) -> Result<RegisterAck, ApiError> {
        let response = self
            .request("POST", "/agentv2/register")
            .send_json(identifiers)
            .map_err(from_ureq)?;
        response.into_json().map_err(ApiError::Decode)
    }

    /// `POST /agentv2/sync` — upload one telemetry snapshot.
    pub fn submit_snapshot(&self, snapshot: &TelemetrySnapshot) -> Result<SyncResponse, ApiError> {
        let response = self
            .request("POST", "/agentv2/sync")
            .send_json(snapshot)
            .map_err(from_ureq)?;
        response.into_json().map_err(ApiError::Decode)
    }

    /// `GET /agentv2/init` — diagnostic signature lists only.
    pub fn init_data(&self) -> Result<InitDataResponse, ApiError> {
        let response = self
            .request("GET", "/agentv2/init")
            .call()
            .map_err(from_ureq)?;
        response.into_json().map_err(ApiError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_resolves_base_url_from_env_and_region() {
        let client = ApiClient::new(TargetEnv::Prod, Region::Eu, "0.3.2");
        assert_eq!(client.base_url(), "https://agent.eu.wardenhq.com");
    }

    #[test]
    fn user_agent_is_version_stamped() {
        let client = ApiClient::new(TargetEnv::Local, Region::Na, "1.2.3");
        assert!(client.user_agent.starts_with("warden-agent/1.2.3"));
    }

    #[test]
    fn empty_bearer_clears_credential() {
        let mut client = ApiClient::new(TargetEnv::Local, Region::Na, "0.3.2");
        client.set_bearer("tok");
        assert!(client.bearer.is_some());
        client.set_bearer("");
        assert!(client.bearer.is_none());
    }

    #[test]
    fn sync_response_tolerates_missing_fields() {
        let parsed: SyncResponse = serde_json::from_str("{}").expect("decode");
        assert!(parsed.last_checked_at.is_none());
        assert!(parsed.compliance.is_none());
        assert!(parsed.av_service_signatures.is_none());
    }

    #[test]
    fn sync_response_decodes_full_payload() {
        let parsed: SyncResponse = serde_json::from_str(
            r#"{
                "lastCheckedAt": "2026-08-01T12:00:00Z",
                "compliance": {"checks": []},
                "avServiceSignatures": ["Defender", "Sophos"]
            }"#,
        )
        .expect("decode");
        assert!(parsed.last_checked_at.is_some());
        assert_eq!(
            parsed.av_service_signatures,
            Some(vec!["Defender".to_string(), "Sophos".to_string()])
        );
    }
}
