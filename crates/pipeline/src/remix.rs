//! Derived generation: extending and remixing finished tracks.
//!
//! Both operations build an ordinary [`GenerationRequest`] that points at
//! the source track's artifact as a style reference and records its
//! [`Lineage`], then submit it through the same service as any first-time
//! request. Provenance tags and titles are applied when the resulting
//! tracks are materialized.

use std::time::Duration;

use tunegen_core::error::GenerationError;
use tunegen_core::request::{GenerationRequest, Lineage, LineageKind, MAX_DURATION_SECS};
use tunegen_core::task::ResultTrack;
use tunegen_core::types::TaskId;

use crate::service::{EnqueueError, GenerationService};

pub struct ExtendRemixAdapter {
    service: GenerationService,
}

impl ExtendRemixAdapter {
    pub fn new(service: GenerationService) -> Self {
        Self { service }
    }

    /// Queue a longer version of `original`.
    pub async fn extend_track(
        &self,
        original: &ResultTrack,
        additional: Duration,
    ) -> Result<TaskId, EnqueueError> {
        let request =
            extend_request(original, additional).map_err(EnqueueError::InvalidRequest)?;
        tracing::info!(
            source = %original.artifact,
            duration_secs = request.duration_secs,
            "Submitting track extension",
        );
        self.service.enqueue(request).await
    }

    /// Queue a remix of `original` in a new genre and mood.
    pub async fn remix_track(
        &self,
        original: &ResultTrack,
        new_genre: &str,
        new_mood: &str,
        extra_prompt: Option<&str>,
    ) -> Result<TaskId, EnqueueError> {
        let request = remix_request(original, new_genre, new_mood, extra_prompt);
        tracing::info!(
            source = %original.artifact,
            genre = %new_genre,
            mood = %new_mood,
            "Submitting track remix",
        );
        self.service.enqueue(request).await
    }
}

/// Build the request that extends `original` by `additional`.
///
/// The target duration is the original's (rounded up to whole seconds)
/// plus `additional`, capped at `MAX_DURATION_SECS`. An extension of
/// less than a whole second, or one whose capped target would not be
/// longer than the original, is rejected as `InvalidRequest`.
pub fn extend_request(
    original: &ResultTrack,
    additional: Duration,
) -> Result<GenerationRequest, GenerationError> {
    if additional.as_secs() == 0 {
        return Err(GenerationError::invalid_request(
            "extension must add at least one second",
        ));
    }
    let base = original.duration_secs.max(0.0).ceil() as u64;
    let target = base
        .saturating_add(additional.as_secs())
        .min(u64::from(MAX_DURATION_SECS)) as u32;
    if f64::from(target) <= original.duration_secs {
        return Err(GenerationError::invalid_request(format!(
            "\"{}\" is already at the {MAX_DURATION_SECS}s maximum",
            original.title
        )));
    }

    Ok(derive(
        original,
        LineageKind::Extension,
        original.genre.clone(),
        original.mood.clone(),
        target,
        format!("Continue \"{}\" seamlessly", original.title),
    ))
}

/// Build the request that remixes `original` as `new_genre` / `new_mood`.
pub fn remix_request(
    original: &ResultTrack,
    new_genre: &str,
    new_mood: &str,
    extra_prompt: Option<&str>,
) -> GenerationRequest {
    let mut prompt = format!("Remix of \"{}\" as {new_mood} {new_genre}", original.title);
    if let Some(extra) = extra_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(". ");
        prompt.push_str(extra);
    }

    let duration = (original.duration_secs.max(1.0).ceil() as u32).min(MAX_DURATION_SECS);
    derive(
        original,
        LineageKind::Remix,
        new_genre.to_string(),
        new_mood.to_string(),
        duration,
        prompt,
    )
}

// ---- private helpers ----

fn derive(
    original: &ResultTrack,
    kind: LineageKind,
    genre: String,
    mood: String,
    duration_secs: u32,
    prompt: String,
) -> GenerationRequest {
    GenerationRequest {
        genre,
        mood,
        prompt: Some(prompt),
        duration_secs,
        instrumental: original.instrumental,
        lyrics: if original.instrumental {
            None
        } else {
            original.lyrics.clone()
        },
        style_reference: Some(original.artifact.clone()),
        extended: true,
        lineage: Some(Lineage {
            kind,
            source_title: original.title.clone(),
            source_artifact: original.artifact.clone(),
        }),
    }
}
