//! # warden-agent
//!
//! The orchestration layer: throttled sync state machine, registration
//! handshake, interval scheduler, and the daemon runtime that ties them to a
//! timer.
//!
//! The caller contract exposed to the CLI surface:
//! - [`register::run`] — `register(token, region)`
//! - [`sync::run`] — `sync(forced) -> SyncOutcome`
//! - [`daemon::start_blocking`] — `run_daemon(interval_hours)`
//! - `StateStore::snapshot` / `StateStore::clear` — `status()` / `unregister()`

pub mod daemon;
pub mod error;
pub mod ports;
pub mod register;
pub mod scheduler;
pub mod sync;

pub use error::AgentError;
pub use ports::{ComplianceApi, LazyCollector, TelemetrySource};
pub use scheduler::Scheduler;
pub use sync::{SyncOutcome, ThrottlePolicy};
