//! Shared stubs for pipeline integration tests.
//!
//! The stub provider names every job after the request prompt
//! (`"job-<prompt>"`) so tests can drive individual tasks by name.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tunegen_core::job_profile::{JobProfiles, ProfileParams};
use tunegen_core::request::GenerationRequest;
use tunegen_core::types::{ArtifactRef, ProviderJobHandle};
use tunegen_pipeline::artifacts::{ArtifactError, ArtifactStore};
use tunegen_pipeline::entitlement::{Entitlement, EntitlementError, EntitlementGate};
use tunegen_pipeline::{Collaborators, GenerationService, OrchestratorConfig, Unmetered};
use tunegen_provider::backoff::BackoffConfig;
use tunegen_provider::client::{
    CreatedJob, JobStatusReport, JobSubmission, ProviderClient, ProviderError, ResultItem,
};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubProvider {
    /// Status returned for a job; jobs without an entry are "processing".
    statuses: Mutex<HashMap<String, Result<JobStatusReport, ProviderError>>>,
    /// Creation failures keyed by prompt.
    create_errors: Mutex<HashMap<String, ProviderError>>,
    submissions: Mutex<Vec<JobSubmission>>,
    polls: Mutex<HashMap<String, u32>>,
    /// Complete every job on its first poll.
    auto_complete: bool,
}

impl StubProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn auto_completing() -> Arc<Self> {
        Arc::new(Self {
            auto_complete: true,
            ..Self::default()
        })
    }

    pub fn set_status(&self, job_id: &str, report: Result<JobStatusReport, ProviderError>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), report);
    }

    /// Complete `job_id` with one result item per reference.
    pub fn complete(&self, job_id: &str, references: &[&str]) {
        let items = references
            .iter()
            .map(|r| ResultItem::with_reference(*r))
            .collect();
        self.set_status(job_id, Ok(JobStatusReport::new("completed").with_items(items)));
    }

    pub fn fail_creation(&self, prompt: &str, error: ProviderError) {
        self.create_errors
            .lock()
            .unwrap()
            .insert(prompt.to_string(), error);
    }

    /// Job ids created so far, in creation order.
    pub fn created(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|s| job_id_for(s.prompt.as_deref()))
            .collect()
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn polls(&self, job_id: &str) -> u32 {
        self.polls.lock().unwrap().get(job_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    async fn create_job(&self, submission: &JobSubmission) -> Result<CreatedJob, ProviderError> {
        let prompt = submission.prompt.clone().unwrap_or_default();
        if let Some(error) = self.create_errors.lock().unwrap().get(&prompt) {
            return Err(error.clone());
        }
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(CreatedJob {
            job_id: job_id_for(Some(&prompt)),
            initial_status: "queued".into(),
        })
    }

    async fn get_job_status(
        &self,
        job: &ProviderJobHandle,
    ) -> Result<JobStatusReport, ProviderError> {
        *self
            .polls
            .lock()
            .unwrap()
            .entry(job.as_str().to_string())
            .or_default() += 1;

        if let Some(report) = self.statuses.lock().unwrap().get(job.as_str()) {
            return report.clone();
        }
        if self.auto_complete {
            let reference = format!("https://cdn.test/{}.mp3", job.as_str());
            return Ok(JobStatusReport::new("completed")
                .with_items(vec![ResultItem::with_reference(reference)]));
        }
        Ok(JobStatusReport::new("processing"))
    }
}

pub fn job_id_for(prompt: Option<&str>) -> String {
    format!("job-{}", prompt.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Artifact store
// ---------------------------------------------------------------------------

/// In-memory store; references listed in `failing` are rejected.
#[derive(Default)]
pub struct StubStore {
    failing: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl StubStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(references: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: references.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for StubStore {
    async fn fetch_and_persist(&self, remote_reference: &str) -> Result<ArtifactRef, ArtifactError> {
        self.fetched
            .lock()
            .unwrap()
            .push(remote_reference.to_string());
        if self.failing.contains(remote_reference) {
            return Err(ArtifactError::Rejected(format!("{remote_reference} is gone")));
        }
        Ok(ArtifactRef::new(format!("local/{remote_reference}")))
    }
}

// ---------------------------------------------------------------------------
// Entitlement
// ---------------------------------------------------------------------------

pub struct DenyAll;

#[async_trait]
impl EntitlementGate for DenyAll {
    async fn can_proceed(&self) -> Entitlement {
        Entitlement::denied("Subscription required")
    }

    async fn consume(&self) -> Result<(), EntitlementError> {
        Err(EntitlementError::Exhausted)
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(5);
pub const TEST_TTL: Duration = Duration::from_millis(250);

/// Millisecond-scale configuration.
pub fn test_config(concurrency_limit: usize, attempt_budget: u32) -> OrchestratorConfig {
    let params = |job_type: &str| ProfileParams {
        job_type_id: job_type.to_string(),
        attempt_budget,
        poll_interval: TEST_POLL_INTERVAL,
    };
    OrchestratorConfig {
        concurrency_limit,
        profiles: JobProfiles {
            standard: params("generate_music"),
            extended: params("generate_music_extended"),
        },
        backoff: BackoffConfig {
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        },
        notification_ttl: TEST_TTL,
        ..OrchestratorConfig::default()
    }
}

pub fn start(
    config: OrchestratorConfig,
    provider: Arc<StubProvider>,
    store: Arc<StubStore>,
) -> GenerationService {
    start_with_gate(config, provider, store, Arc::new(Unmetered))
}

pub fn start_with_gate(
    config: OrchestratorConfig,
    provider: Arc<StubProvider>,
    store: Arc<StubStore>,
    gate: Arc<dyn EntitlementGate>,
) -> GenerationService {
    GenerationService::start(
        config,
        Collaborators {
            provider,
            artifacts: store,
            gate,
        },
    )
}

pub fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new("Lo-fi", "Calm", 60).with_prompt(prompt)
}

/// Wait until `condition` holds, panicking after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 2s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
