//! HTTP implementation of the provider contract.
//!
//! Wraps the provider's REST endpoints using [`reqwest`]:
//!
//! | Operation      | Request                 |
//! |----------------|-------------------------|
//! | create job     | `POST {base}/jobs`      |
//! | get job status | `GET {base}/jobs/{id}`  |

use std::time::Duration;

use async_trait::async_trait;
use tunegen_core::types::ProviderJobHandle;

use crate::client::{CreatedJob, JobStatusReport, JobSubmission, ProviderClient, ProviderError};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the generation provider.
pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProviderClient {
    /// Create a client with its own connection pool and a per-request
    /// timeout.
    ///
    /// * `base_url` - e.g. `https://api.example.com/v1`.
    /// * `api_key`  - sent as a bearer token when present.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Check the status code, then decode the body as `T`.
    ///
    /// The body is read as text first so that a decode failure is
    /// reported as [`ProviderError::Decode`] rather than a transport error.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body));
        }
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn create_job(&self, submission: &JobSubmission) -> Result<CreatedJob, ProviderError> {
        let request = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(submission);

        let response = self.authorize(request).send().await?;
        let created: CreatedJob = Self::parse_response(response).await?;

        tracing::debug!(
            job_id = %created.job_id,
            job_type = %submission.job_type,
            initial_status = %created.initial_status,
            "Provider accepted job",
        );
        Ok(created)
    }

    async fn get_job_status(
        &self,
        job: &ProviderJobHandle,
    ) -> Result<JobStatusReport, ProviderError> {
        let request = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job.as_str()));

        let response = self.authorize(request).send().await?;
        Self::parse_response(response).await
    }
}

/// Map a non-2xx status code onto the error taxonomy.
///
/// - 400, 413, 422 -> `InvalidRequest`
/// - 401, 403 -> `Unauthorized`
/// - 503 -> `ServiceUnavailable` (maintenance)
/// - anything else -> `Network`
pub fn classify_status(status: u16, body: String) -> ProviderError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    match status {
        400 | 413 | 422 => ProviderError::InvalidRequest(detail),
        401 | 403 => ProviderError::Unauthorized(detail),
        503 => ProviderError::ServiceUnavailable(detail),
        _ => ProviderError::Network(detail),
    }
}
