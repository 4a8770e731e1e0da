use serde::Serialize;

/// Why a task ended up `Failed`.
///
/// Stored on the task as its error descriptor, so it must be cloneable
/// and serializable for observers.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Generation service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    /// The provider reported completion without a usable result.
    #[error("Generation completed without any usable result")]
    NoData,

    #[error("Generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// The provider reported the job as failed.
    #[error("Generation failed: {message}")]
    ProviderFailed {
        message: String,
        payload: Option<serde_json::Value>,
    },

    #[error("Not entitled to generate: {reason}")]
    NotEntitled { reason: String },

    /// The dispatcher shut down while the task was in flight.
    #[error("Generation interrupted by shutdown")]
    Interrupted,
}

impl GenerationError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Transient faults are absorbed by continued polling; everything
    /// else is surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::ServiceUnavailable { .. })
    }

    /// Short machine-readable label, used in logs and lifecycle events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Network { .. } => "network",
            Self::NoData => "no_data",
            Self::Timeout { .. } => "timeout",
            Self::ProviderFailed { .. } => "provider_failed",
            Self::NotEntitled { .. } => "not_entitled",
            Self::Interrupted => "interrupted",
        }
    }
}
