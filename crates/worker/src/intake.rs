//! Newline-delimited JSON request intake.
//!
//! Each non-blank line is one [`GenerationRequest`] object. Lines starting
//! with `#` are comments.

use tunegen_core::request::GenerationRequest;

#[derive(Debug, thiserror::Error)]
#[error("line {line}: {source}")]
pub struct IntakeError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Parse one input line; `Ok(None)` for blank and comment lines.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<GenerationRequest>, IntakeError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| IntakeError {
            line: line_no,
            source,
        })
}
