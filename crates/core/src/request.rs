//! Generation request value type and validation.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::types::ArtifactRef;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum length of a genre or mood label.
pub const MAX_LABEL_LEN: usize = 64;
/// Maximum length of the free-text prompt.
pub const MAX_PROMPT_LEN: usize = 3000;
/// Longest track the provider will render, in seconds.
pub const MAX_DURATION_SECS: u32 = 480;

// ---------------------------------------------------------------------------
// Lineage
// ---------------------------------------------------------------------------

/// How a derived request relates to the track it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageKind {
    Extension,
    Remix,
}

impl LineageKind {
    /// Tag attached to every track produced by a request of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Extension => "extended",
            Self::Remix => "remix",
        }
    }

    /// Suffix appended to the source title.
    pub fn title_suffix(self) -> &'static str {
        match self {
            Self::Extension => "Extended",
            Self::Remix => "Remix",
        }
    }
}

/// Provenance of a derived request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub kind: LineageKind,
    pub source_title: String,
    pub source_artifact: ArtifactRef,
}

impl Lineage {
    /// Title for a track derived from the source, e.g. `"Night Drive (Remix)"`.
    pub fn derived_title(&self) -> String {
        format!("{} ({})", self.source_title, self.kind.title_suffix())
    }
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// An immutable request for one generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub genre: String,
    pub mood: String,
    #[serde(default)]
    pub prompt: Option<String>,
    pub duration_secs: u32,
    #[serde(default)]
    pub instrumental: bool,
    #[serde(default)]
    pub lyrics: Option<String>,
    /// Existing artifact used to bias the generation.
    #[serde(default)]
    pub style_reference: Option<ArtifactRef>,
    /// Selects the extended job profile.
    #[serde(default)]
    pub extended: bool,
    #[serde(default)]
    pub lineage: Option<Lineage>,
}

impl GenerationRequest {
    /// Create a plain request; optional fields start empty.
    pub fn new(genre: impl Into<String>, mood: impl Into<String>, duration_secs: u32) -> Self {
        Self {
            genre: genre.into(),
            mood: mood.into(),
            prompt: None,
            duration_secs,
            instrumental: false,
            lyrics: None,
            style_reference: None,
            extended: false,
            lineage: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_lyrics(mut self, lyrics: impl Into<String>) -> Self {
        self.lyrics = Some(lyrics.into());
        self
    }

    pub fn instrumental(mut self) -> Self {
        self.instrumental = true;
        self.lyrics = None;
        self
    }

    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    /// One-line description for queue displays, e.g. `"Lo-fi / Calm, 120s"`.
    pub fn descriptor(&self) -> String {
        let base = format!("{} / {}, {}s", self.genre, self.mood, self.duration_secs);
        match &self.lineage {
            Some(lineage) => format!("{base} ({} of {})", lineage.kind.tag(), lineage.source_title),
            None => base,
        }
    }

    /// Validate the request before it is queued.
    ///
    /// Rules:
    /// - Genre and mood must not be blank and must not exceed `MAX_LABEL_LEN`.
    /// - The prompt must not exceed `MAX_PROMPT_LEN`.
    /// - Duration must be in `1..=MAX_DURATION_SECS`.
    /// - Instrumental requests must not carry lyrics.
    pub fn validate(&self) -> Result<(), GenerationError> {
        validate_label("genre", &self.genre)?;
        validate_label("mood", &self.mood)?;

        if let Some(prompt) = &self.prompt {
            if prompt.chars().count() > MAX_PROMPT_LEN {
                return Err(GenerationError::invalid_request(format!(
                    "Prompt must not exceed {MAX_PROMPT_LEN} characters"
                )));
            }
        }

        if self.duration_secs == 0 || self.duration_secs > MAX_DURATION_SECS {
            return Err(GenerationError::invalid_request(format!(
                "Duration must be between 1 and {MAX_DURATION_SECS} seconds, got {}",
                self.duration_secs
            )));
        }

        if self.instrumental && self.lyrics.as_deref().is_some_and(|l| !l.trim().is_empty()) {
            return Err(GenerationError::invalid_request(
                "Instrumental requests must not include lyrics",
            ));
        }

        Ok(())
    }
}

fn validate_label(field: &str, value: &str) -> Result<(), GenerationError> {
    if value.trim().is_empty() {
        return Err(GenerationError::invalid_request(format!(
            "{field} must not be empty"
        )));
    }
    if value.chars().count() > MAX_LABEL_LEN {
        return Err(GenerationError::invalid_request(format!(
            "{field} must not exceed {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
