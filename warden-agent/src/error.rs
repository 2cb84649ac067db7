//! Error surface for the orchestration layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent is not registered; run 'warden register <token>' first")]
    NotRegistered,

    #[error("agent is already registered; run 'warden unregister' first")]
    AlreadyRegistered,

    #[error(transparent)]
    Store(#[from] warden_core::StoreError),

    #[error(transparent)]
    Api(#[from] warden_api::ApiError),

    #[error(transparent)]
    Collector(#[from] warden_collector::CollectorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
