//! Provider job classes and their polling budgets.
//!
//! The provider runs two job classes with very different latency
//! distributions. A [`JobProfile`] is chosen once per request and carries
//! everything the dispatcher and poller need to drive that job.

use std::time::Duration;

use serde::Serialize;

use crate::request::GenerationRequest;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const STANDARD_JOB_TYPE: &str = "generate_music";
pub const STANDARD_ATTEMPT_BUDGET: u32 = 30;
pub const STANDARD_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const EXTENDED_JOB_TYPE: &str = "generate_music_extended";
pub const EXTENDED_ATTEMPT_BUDGET: u32 = 60;
pub const EXTENDED_POLL_INTERVAL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Polling parameters of one job class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileParams {
    /// Job type identifier sent to the provider.
    pub job_type_id: String,
    /// Maximum status checks before the task is abandoned.
    pub attempt_budget: u32,
    /// Wait between status checks.
    pub poll_interval: Duration,
}

impl ProfileParams {
    /// Upper bound on how long a task can spend polling.
    pub fn wall_clock_bound(&self) -> Duration {
        self.poll_interval.saturating_mul(self.attempt_budget)
    }
}

/// The job class a request runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum JobProfile {
    Standard(ProfileParams),
    Extended(ProfileParams),
}

impl JobProfile {
    pub fn params(&self) -> &ProfileParams {
        match self {
            Self::Standard(p) | Self::Extended(p) => p,
        }
    }

    pub fn job_type_id(&self) -> &str {
        &self.params().job_type_id
    }

    pub fn attempt_budget(&self) -> u32 {
        self.params().attempt_budget
    }

    pub fn poll_interval(&self) -> Duration {
        self.params().poll_interval
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

/// The configured parameters of both job classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProfiles {
    pub standard: ProfileParams,
    pub extended: ProfileParams,
}

impl JobProfiles {
    /// Pick the profile for a request from its extended-mode flag.
    pub fn select(&self, request: &GenerationRequest) -> JobProfile {
        if request.extended {
            JobProfile::Extended(self.extended.clone())
        } else {
            JobProfile::Standard(self.standard.clone())
        }
    }
}

impl Default for JobProfiles {
    fn default() -> Self {
        Self {
            standard: ProfileParams {
                job_type_id: STANDARD_JOB_TYPE.to_string(),
                attempt_budget: STANDARD_ATTEMPT_BUDGET,
                poll_interval: STANDARD_POLL_INTERVAL,
            },
            extended: ProfileParams {
                job_type_id: EXTENDED_JOB_TYPE.to_string(),
                attempt_budget: EXTENDED_ATTEMPT_BUDGET,
                poll_interval: EXTENDED_POLL_INTERVAL,
            },
        }
    }
}
