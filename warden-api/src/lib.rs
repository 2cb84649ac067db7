//! # warden-api
//!
//! Blocking HTTP gateway to the Warden compliance backend: endpoint
//! resolution per environment/region, auth/correlation headers, and
//! classification of structured error responses.
//!
//! The gateway performs no automatic retries and never touches the state
//! store — retry policy and persistence belong to the orchestrator.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::{ApiClient, InitDataResponse, RegisterAck, SyncResponse};
pub use endpoints::resolve_base_url;
pub use error::ApiError;
