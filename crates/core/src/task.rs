//! Task lifecycle state machine.
//!
//! A task moves `Queued -> Processing -> {Completed, Failed}`. The
//! transition methods on [`Task`] are the only way to change its status
//! and they keep the outcome fields consistent with it:
//!
//! - a provider job handle is present only while `Processing`;
//! - `Completed` iff the track list is non-empty;
//! - `Failed` iff an error descriptor is present.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::request::GenerationRequest;
use crate::types::{ArtifactRef, ProviderJobHandle, TaskId, Timestamp};

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle edge.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Attempted an edge the lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal task transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

// ---------------------------------------------------------------------------
// ResultTrack
// ---------------------------------------------------------------------------

/// One materialized output of a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTrack {
    pub title: String,
    pub duration_secs: f64,
    pub tags: Vec<String>,
    /// Local handle returned by the artifact store.
    pub artifact: ArtifactRef,
    pub lyrics: Option<String>,
    pub cover_image: Option<String>,
    pub genre: String,
    pub mood: String,
    pub instrumental: bool,
}

impl ResultTrack {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub request: GenerationRequest,
    status: TaskStatus,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    job: Option<ProviderJobHandle>,
    tracks: Option<Vec<ResultTrack>>,
    error: Option<GenerationError>,
}

impl Task {
    /// Create a freshly queued task.
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            id: TaskId::new(),
            request,
            status: TaskStatus::Queued,
            submitted_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            job: None,
            tracks: None,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn job(&self) -> Option<&ProviderJobHandle> {
        self.job.as_ref()
    }

    pub fn tracks(&self) -> Option<&[ResultTrack]> {
        self.tracks.as_deref()
    }

    pub fn error(&self) -> Option<&GenerationError> {
        self.error.as_ref()
    }

    /// `Queued -> Processing`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Processing)?;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Record the provider job backing a processing task.
    pub fn attach_job(&mut self, handle: ProviderJobHandle) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Processing {
            return Err(TransitionError {
                from: self.status,
                to: TaskStatus::Processing,
            });
        }
        self.job = Some(handle);
        Ok(())
    }

    /// `Processing -> Completed`, or `Processing -> Failed(NoData)` when
    /// `tracks` is empty.
    pub fn complete(&mut self, tracks: Vec<ResultTrack>) -> Result<(), TransitionError> {
        if tracks.is_empty() {
            return self.fail(GenerationError::NoData);
        }
        self.transition(TaskStatus::Completed)?;
        self.tracks = Some(tracks);
        self.finish();
        Ok(())
    }

    /// `Processing -> Failed`.
    pub fn fail(&mut self, error: GenerationError) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error);
        self.finish();
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn finish(&mut self) {
        self.job = None;
        self.finished_at = Some(chrono::Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
