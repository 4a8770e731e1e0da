//! Status polling for one provider job.
//!
//! [`Poller::poll`] checks the job's status until it becomes terminal or
//! the profile's attempt budget runs out. Transient faults on a status
//! check (network, undecodable body, maintenance) are swallowed: they use
//! up one attempt and lengthen the next wait. Only a terminal response is
//! ever fatal.

use tokio_util::sync::CancellationToken;
use tunegen_core::error::GenerationError;
use tunegen_core::job_profile::JobProfile;
use tunegen_core::types::ProviderJobHandle;
use tunegen_provider::backoff::{next_delay, BackoffConfig};
use tunegen_provider::client::{ProviderClient, ResultItem};
use tunegen_provider::status::{interpret, StatusVerdict};

/// Terminal result of polling one job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job completed with at least one usable result.
    Completed(Vec<ResultItem>),
    Failed(GenerationError),
}

pub struct Poller<'a> {
    provider: &'a dyn ProviderClient,
    backoff: &'a BackoffConfig,
}

impl<'a> Poller<'a> {
    pub fn new(provider: &'a dyn ProviderClient, backoff: &'a BackoffConfig) -> Self {
        Self { provider, backoff }
    }

    /// Poll `job` until it is terminal or `profile`'s budget is spent.
    ///
    /// Makes at most `attempt_budget` status checks. `on_attempt` is called
    /// with the attempt number after every non-terminal check. Exhausting
    /// the budget yields `Failed(Timeout)`; cancellation yields
    /// `Failed(Interrupted)`.
    pub async fn poll(
        &self,
        job: &ProviderJobHandle,
        profile: &JobProfile,
        cancel: &CancellationToken,
        mut on_attempt: impl FnMut(u32),
    ) -> PollOutcome {
        let budget = profile.attempt_budget();
        let interval = profile.poll_interval();
        let mut delay = interval;

        for attempt in 1..=budget {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Failed(GenerationError::Interrupted),
                result = self.provider.get_job_status(job) => result,
            };

            match result {
                Ok(report) => {
                    delay = interval;
                    match interpret(report) {
                        StatusVerdict::Completed(items) => {
                            tracing::debug!(job_id = %job, attempt, items = items.len(), "Job completed");
                            return PollOutcome::Completed(items);
                        }
                        StatusVerdict::Failed(error) => {
                            tracing::debug!(job_id = %job, attempt, error = %error, "Job failed");
                            return PollOutcome::Failed(error);
                        }
                        StatusVerdict::Pending => {
                            tracing::trace!(job_id = %job, attempt, budget, "Job still processing");
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    delay = next_delay(delay, self.backoff);
                    tracing::warn!(
                        job_id = %job,
                        attempt,
                        error = %e,
                        next_delay_ms = delay.as_millis() as u64,
                        "Status check failed, will retry",
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id = %job, attempt, error = %e, "Status check rejected");
                    return PollOutcome::Failed(e.into());
                }
            }

            on_attempt(attempt);

            if attempt < budget {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PollOutcome::Failed(GenerationError::Interrupted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        PollOutcome::Failed(GenerationError::Timeout { attempts: budget })
    }
}
