use std::time::Duration;

use tunegen_core::job_profile::JobProfiles;
use tunegen_core::queue::{DEFAULT_FINISHED_RETENTION, DEFAULT_QUEUE_CAPACITY};
use tunegen_events::DEFAULT_TTL;
use tunegen_provider::backoff::BackoffConfig;

/// Default number of tasks allowed to be processing at once.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Dispatcher configuration.
///
/// All fields have defaults matching the provider's documented limits;
/// tests shrink the poll intervals and TTL to milliseconds.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum tasks in `Processing` at any instant.
    pub concurrency_limit: usize,
    /// Maximum tasks waiting in the queue.
    pub queue_capacity: usize,
    /// Terminal tasks kept for inspection.
    pub finished_retention: usize,
    /// Attempt budgets and poll intervals of both job classes.
    pub profiles: JobProfiles,
    /// Growth of the wait after a transient status-check fault.
    pub backoff: BackoffConfig,
    /// Lifetime of user-facing notifications.
    pub notification_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            finished_retention: DEFAULT_FINISHED_RETENTION,
            profiles: JobProfiles::default(),
            backoff: BackoffConfig::default(),
            notification_ttl: DEFAULT_TTL,
        }
    }
}
