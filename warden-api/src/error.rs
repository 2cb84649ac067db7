//! API error classification.
//!
//! Known backend error codes map to specific, user-actionable variants;
//! anything else falls back to HTTP-status classification, then to a
//! generic status + body error.

use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the API gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("registration link not found or expired; request a new registration link")]
    BootstrapTokenInvalid,

    #[error("authorization has expired; register the agent again")]
    CredentialExpired,

    #[error("unauthorized; register the agent or check your credentials")]
    Unauthorized,

    #[error("account configuration is being completed; try again in a few minutes")]
    AccountPending,

    #[error("the service is under maintenance; try again in a few minutes")]
    AccountMaintenance,

    #[error("your company's account is disabled; contact your system administrator")]
    AccountDisabled,

    #[error("your company's account is suspended; contact your system administrator")]
    AccountSuspended,

    #[error("your user account was deleted; contact your system administrator")]
    AccountDeleted,

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("token exchange response carried no credential")]
    EmptyCredential,

    #[error("failed to decode API response: {0}")]
    Decode(#[source] std::io::Error),
}

impl ApiError {
    /// Whether the next scheduled attempt may plausibly succeed without
    /// external action. Account and auth states need an operator; transport
    /// failures and unclassified server errors do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Status { .. }
                | ApiError::Decode(_)
                | ApiError::AccountMaintenance
                | ApiError::AccountPending
        )
    }
}

/// Structured error body returned by the backend.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    secondary_message: Option<String>,
}

/// Classify a non-2xx response from its status and raw body.
pub(crate) fn classify_response(status: u16, body: &str) -> ApiError {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(code) = parsed.code.as_deref() {
            match code {
                "BOOTSTRAP_TOKEN_NOT_FOUND" | "BOOTSTRAP_TOKEN_EXPIRED"
                | "MAGIC_TOKEN_NOT_FOUND" => return ApiError::BootstrapTokenInvalid,
                "TOKEN_EXPIRED" | "REFRESH_TOKEN_NOT_FOUND" => return ApiError::CredentialExpired,
                "ACCOUNT_PENDING" => return ApiError::AccountPending,
                "ACCOUNT_MAINTENANCE" => return ApiError::AccountMaintenance,
                "ACCOUNT_ADMIN_DISABLED" | "ACCOUNT_NON_PAYMENT" => {
                    return ApiError::AccountDisabled
                }
                "ACCOUNT_SUSPENDED" => return ApiError::AccountSuspended,
                "ACCOUNT_USER_DELETED" => return ApiError::AccountDeleted,
                _ => {}
            }
        }
        if status == 401 {
            return ApiError::Unauthorized;
        }
        if let Some(message) = parsed.message {
            let message = match parsed.secondary_message {
                Some(secondary) => format!("{message}: {secondary}"),
                None => message,
            };
            return ApiError::Status { status, message };
        }
    }
    if status == 401 {
        return ApiError::Unauthorized;
    }
    ApiError::Status {
        status,
        message: body.to_string(),
    }
}

/// Map a `ureq` failure into the gateway taxonomy.
pub(crate) fn from_ureq(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            classify_response(status, &body)
        }
        ureq::Error::Transport(transport) => ApiError::Network(transport.to_string()),
    }
}
