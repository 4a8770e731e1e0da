//! Interpretation of provider status reports.
//!
//! Status strings are matched case-insensitively against two synonym
//! sets; anything unrecognized means the job is still running. A
//! "completed" label alone is not success: the report must also list at
//! least one usable result.

use tunegen_core::error::GenerationError;

use crate::client::{JobStatusReport, ResultItem};

/// Status labels meaning the job finished successfully.
pub const COMPLETED_STATUSES: &[&str] = &["completed", "success", "finished"];
/// Status labels meaning the job failed.
pub const FAILED_STATUSES: &[&str] = &["failed", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedStatus {
    Completed,
    Failed,
    Processing,
}

impl NormalizedStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Map a free-text provider status onto [`NormalizedStatus`].
pub fn normalize_status(raw: &str) -> NormalizedStatus {
    let status = raw.trim().to_ascii_lowercase();
    if COMPLETED_STATUSES.contains(&status.as_str()) {
        NormalizedStatus::Completed
    } else if FAILED_STATUSES.contains(&status.as_str()) {
        NormalizedStatus::Failed
    } else {
        NormalizedStatus::Processing
    }
}

/// What a single status report means for the task.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusVerdict {
    /// Terminal success with at least one usable result.
    Completed(Vec<ResultItem>),
    /// Terminal failure.
    Failed(GenerationError),
    /// Not terminal yet.
    Pending,
}

/// Interpret a status report.
///
/// - completed + usable results -> `Completed` with only the usable items;
/// - completed without usable results -> `Failed(NoData)`;
/// - failed -> `Failed(ProviderFailed)` carrying the error payload;
/// - anything else -> `Pending`.
pub fn interpret(report: JobStatusReport) -> StatusVerdict {
    match normalize_status(&report.status) {
        NormalizedStatus::Completed => {
            let items: Vec<ResultItem> = report
                .result_items
                .unwrap_or_default()
                .into_iter()
                .filter(|item| item.remote_reference().is_some())
                .collect();
            if items.is_empty() {
                StatusVerdict::Failed(GenerationError::NoData)
            } else {
                StatusVerdict::Completed(items)
            }
        }
        NormalizedStatus::Failed => StatusVerdict::Failed(GenerationError::ProviderFailed {
            message: failure_message(report.error_payload.as_ref()),
            payload: report.error_payload,
        }),
        NormalizedStatus::Processing => StatusVerdict::Pending,
    }
}

/// Pull a human-readable message out of an error payload.
///
/// Accepts a bare string, or an object with a `message`/`error`/`detail`
/// field; anything else is rendered as JSON.
pub fn failure_message(payload: Option<&serde_json::Value>) -> String {
    let Some(payload) = payload else {
        return "provider reported failure without details".to_string();
    };
    if let Some(s) = payload.as_str() {
        return s.to_string();
    }
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}
