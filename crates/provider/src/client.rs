//! Provider contract and its payload types.
//!
//! The provider exposes two logical operations: create a job, and read
//! the status of a job. Status values are free text; see
//! [`crate::status`] for how they are interpreted.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tunegen_core::error::GenerationError;
use tunegen_core::job_profile::JobProfile;
use tunegen_core::request::GenerationRequest;
use tunegen_core::types::ProviderJobHandle;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Body of a create-job call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSubmission {
    pub job_type: String,
    pub genre: String,
    pub mood: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub duration_secs: u32,
    pub instrumental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_reference: Option<String>,
}

impl JobSubmission {
    /// Encode a request for the job class chosen by `profile`.
    pub fn new(request: &GenerationRequest, profile: &JobProfile) -> Self {
        Self {
            job_type: profile.job_type_id().to_string(),
            genre: request.genre.clone(),
            mood: request.mood.clone(),
            prompt: request.prompt.clone(),
            duration_secs: request.duration_secs,
            instrumental: request.instrumental,
            lyrics: if request.instrumental {
                None
            } else {
                request.lyrics.clone()
            },
            style_reference: request
                .style_reference
                .as_ref()
                .map(|r| r.as_str().to_string()),
        }
    }
}

/// Response of a create-job call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedJob {
    #[serde(alias = "id")]
    pub job_id: String,
    #[serde(default, alias = "status")]
    pub initial_status: String,
}

impl CreatedJob {
    pub fn handle(&self) -> ProviderJobHandle {
        ProviderJobHandle::new(self.job_id.clone())
    }
}

/// One output listed by a completed job.
///
/// Every field is optional on the wire; an item without a non-blank
/// `reference` is not a usable result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(default, alias = "audio_url", alias = "url")]
    pub reference: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "duration")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default, alias = "image_url")]
    pub cover_image: Option<String>,
}

impl ResultItem {
    /// A result item pointing at `reference`, with no other metadata.
    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    /// The trimmed remote reference, if it is usable.
    pub fn remote_reference(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Response of a get-status call.
///
/// Only `status` must decode. A malformed result list never fails the
/// whole report: malformed items are dropped, so a terminal "completed"
/// report with nothing usable is judged by its status, not retried as a
/// decode fault.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: String,
    #[serde(default, alias = "results", deserialize_with = "lenient_items")]
    pub result_items: Option<Vec<ResultItem>>,
    #[serde(default, alias = "error")]
    pub error_payload: Option<serde_json::Value>,
}

impl JobStatusReport {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_items(mut self, items: Vec<ResultItem>) -> Self {
        self.result_items = Some(items);
        self
    }

    pub fn with_error(mut self, payload: serde_json::Value) -> Self {
        self.error_payload = Some(payload);
        self
    }
}

/// Decode a result list item by item, dropping items that do not fit
/// [`ResultItem`]. A non-list value decodes as an empty list.
fn lenient_items<'de, D>(deserializer: D) -> Result<Option<Vec<ResultItem>>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<serde_json::Value>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(serde_json::Value::Array(values)) => values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<ResultItem>(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed result item");
                    None
                }
            })
            .collect(),
        Some(other) => {
            tracing::debug!(value = %other, "Result list is not an array");
            Vec::new()
        }
    };
    Ok(Some(items))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the request as malformed.
    #[error("Provider rejected request: {0}")]
    InvalidRequest(String),

    /// Credentials missing, expired or lacking permission.
    #[error("Provider rejected credentials: {0}")]
    Unauthorized(String),

    /// The provider is under maintenance.
    #[error("Provider unavailable: {0}")]
    ServiceUnavailable(String),

    /// Transport failure or unexpected status code.
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("Malformed provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether polling should keep going after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Decode(_) | Self::ServiceUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<ProviderError> for GenerationError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidRequest(message) => Self::InvalidRequest { message },
            ProviderError::Unauthorized(message) => Self::Unauthorized { message },
            ProviderError::ServiceUnavailable(message) => Self::ServiceUnavailable { message },
            ProviderError::Network(message) => Self::Network { message },
            ProviderError::Decode(message) => Self::Network {
                message: format!("malformed response: {message}"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderClient
// ---------------------------------------------------------------------------

/// The external generation service.
///
/// Per-call timeouts are the implementation's responsibility.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit a new job.
    async fn create_job(&self, submission: &JobSubmission) -> Result<CreatedJob, ProviderError>;

    /// Read the current status of a job.
    async fn get_job_status(
        &self,
        job: &ProviderJobHandle,
    ) -> Result<JobStatusReport, ProviderError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
