//! Generation pipeline: dispatcher, poller and service handle.
//!
//! - [`service::GenerationService`]: the public submit/observe handle.
//! - `dispatcher`: single-owner actor that holds the task queue, enforces
//!   the concurrency limit, and spawns one job runner per admitted task.
//! - [`poller::Poller`]: bounded status polling with transient-fault backoff.
//! - [`artifacts`]: per-item materialization of completed results.
//! - [`entitlement`]: pre-admission and pre-creation usage gate.
//! - [`remix::ExtendRemixAdapter`]: derived (extend/remix) requests.

pub mod artifacts;
pub mod config;
mod dispatcher;
pub mod entitlement;
pub mod poller;
pub mod remix;
pub mod service;

pub use artifacts::{ArtifactError, ArtifactStore, FsArtifactStore};
pub use config::OrchestratorConfig;
pub use dispatcher::{Collaborators, TaskSummary};
pub use entitlement::{CreditGate, Entitlement, EntitlementError, EntitlementGate, Unmetered};
pub use remix::ExtendRemixAdapter;
pub use service::{EnqueueError, GenerationService, ServiceError};
