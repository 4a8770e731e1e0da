//! Artifact materialization.
//!
//! Each result reference of a completed job is handed to an
//! [`ArtifactStore`] on its own. One item failing does not affect its
//! siblings; the caller only sees the tracks that made it to storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tunegen_core::request::GenerationRequest;
use tunegen_core::task::ResultTrack;
use tunegen_core::types::ArtifactRef;
use tunegen_provider::client::ResultItem;

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to fetch artifact: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Failed to persist artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact rejected: {0}")]
    Rejected(String),
}

/// Durable storage for generated outputs.
///
/// Delivery is at-least-once: implementations must tolerate being asked
/// for the same reference more than once.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the bytes behind `remote_reference`, persist them, and return
    /// a local handle.
    async fn fetch_and_persist(&self, remote_reference: &str) -> Result<ArtifactRef, ArtifactError>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Stores artifacts as files under a root directory.
///
/// Files are named by the SHA-256 of their remote reference, so a repeated
/// fetch of the same reference is a no-op.
pub struct FsArtifactStore {
    client: reqwest::Client,
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(client: reqwest::Client, root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path an artifact for `remote_reference` is stored at.
    pub fn path_for(&self, remote_reference: &str) -> PathBuf {
        let digest = Sha256::digest(remote_reference.as_bytes());
        let name = format!("{digest:x}.{}", file_extension(remote_reference));
        self.root.join(name)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn fetch_and_persist(&self, remote_reference: &str) -> Result<ArtifactRef, ArtifactError> {
        let path = self.path_for(remote_reference);
        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(path = %path.display(), "Artifact already stored");
            return Ok(ArtifactRef::new(path.display().to_string()));
        }

        let bytes = self
            .client
            .get(remote_reference)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if bytes.is_empty() {
            return Err(ArtifactError::Rejected(format!(
                "empty body for {remote_reference}"
            )));
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let partial = path.with_extension(format!("part-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        tracing::info!(
            path = %path.display(),
            size_bytes = bytes.len(),
            "Artifact stored",
        );
        Ok(ArtifactRef::new(path.display().to_string()))
    }
}

/// Extension of the last path segment, or `bin` when there is no
/// plausible one.
fn file_extension(reference: &str) -> &str {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "bin",
    }
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

/// Materialize every result item and build a track for each success.
///
/// Items are fetched concurrently. Failed items are logged and skipped;
/// the returned list is empty only if every item failed.
pub async fn materialize(
    store: &dyn ArtifactStore,
    request: &GenerationRequest,
    items: Vec<ResultItem>,
) -> Vec<ResultTrack> {
    let total = items.len();
    let fetches = items.into_iter().enumerate().map(|(index, item)| async move {
        let reference = item.remote_reference()?.to_string();
        match store.fetch_and_persist(&reference).await {
            Ok(artifact) => Some(build_track(request, &item, artifact, index, total)),
            Err(e) => {
                tracing::warn!(
                    reference = %reference,
                    error = %e,
                    "Artifact materialization failed",
                );
                None
            }
        }
    });
    join_all(fetches).await.into_iter().flatten().collect()
}

/// Build the track for one materialized item.
///
/// Derived requests title every track after the source track and add the
/// provenance tag (`extended` / `remix`).
pub fn build_track(
    request: &GenerationRequest,
    item: &ResultItem,
    artifact: ArtifactRef,
    index: usize,
    total: usize,
) -> ResultTrack {
    let base_title = match &request.lineage {
        Some(lineage) => lineage.derived_title(),
        None => item
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", request.mood, request.genre)),
    };
    let title = if total > 1 && (request.lineage.is_some() || item.title.is_none()) {
        format!("{base_title} #{}", index + 1)
    } else {
        base_title
    };

    let mut tags: Vec<String> = Vec::new();
    let candidates = item
        .tags
        .iter()
        .flatten()
        .map(String::as_str)
        .chain([request.genre.as_str(), request.mood.as_str()])
        .chain(request.lineage.as_ref().map(|l| l.kind.tag()));
    for tag in candidates {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }

    let lyrics = if request.instrumental {
        None
    } else {
        item.lyrics.clone().or_else(|| request.lyrics.clone())
    };

    ResultTrack {
        title,
        duration_secs: item
            .duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(request.duration_secs as f64),
        tags,
        artifact,
        lyrics,
        cover_image: item.cover_image.clone(),
        genre: request.genre.clone(),
        mood: request.mood.clone(),
        instrumental: request.instrumental,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
