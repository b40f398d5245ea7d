//! Catalog
//!
//! Gallery and form logic on top of the index repository and the media
//! resolver:
//!
//! - **session**: per-session selected position, clamped on every reload
//! - **submission**: form validation and media path derivation
//!
//! # Submission
//!
//! ```text
//! validate form ─► load index ─► duplicate? ─► upload image ─► upload audio? ─► add + sort + save index
//!     (0%)                                        (30%)           (60%)                (80%)         (100%)
//! ```
//!
//! Nothing is rolled back: a failure after a media upload leaves that
//! file in the store without an index entry pointing at it.

pub mod session;
pub mod submission;

pub use session::{clamp_index, Session, SessionRegistry};
pub use submission::{validate, Submission, SubmissionPlan, Upload};

use crate::index::{add_entry, Entry, IndexError, IndexRepository, IndexSnapshot};
use crate::media::MediaResolver;
use crate::store::StoreError;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced to the user by catalog operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Form input rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Submission reuses an existing id
    #[error("Id {0} already exists")]
    DuplicateId(String),

    /// Browse session unknown or expired
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Entry id not in the index
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Index document unreadable
    #[error("{0}")]
    Index(IndexError),

    /// Remote store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IndexError> for CatalogError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DuplicateId(id) => CatalogError::DuplicateId(id),
            IndexError::Store(e) => CatalogError::Store(e),
            other => CatalogError::Index(other),
        }
    }
}

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Submission progress checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connecting,
    UploadingImage,
    UploadingAudio,
    WritingIndex,
    Done,
}

impl Stage {
    pub fn percent(self) -> u8 {
        match self {
            Stage::Connecting => 0,
            Stage::UploadingImage => 30,
            Stage::UploadingAudio => 60,
            Stage::WritingIndex => 80,
            Stage::Done => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Connecting => "Connecting to the catalog repository...",
            Stage::UploadingImage => "Uploading image...",
            Stage::UploadingAudio => "Uploading audio...",
            Stage::WritingIndex => "Writing index...",
            Stage::Done => "Done",
        }
    }
}

/// Outcome of a successful submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub entry: Entry,
    pub stages: Vec<Stage>,
    pub total_entries: usize,
}

/// An entry with its media resolved for display
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub entry: Entry,
    pub label: String,
    /// Image data URI, or the placeholder
    pub image: Arc<str>,
    /// Audio data URI; absent when the entry has none or it failed to load
    pub audio: Option<Arc<str>>,
}

/// What a browse session currently shows
#[derive(Debug, Clone, Serialize)]
pub struct GalleryView {
    pub session_id: Uuid,
    pub labels: Vec<String>,
    pub selected_index: usize,
    /// `None` when the catalog is empty
    pub selected: Option<EntryView>,
}

/// Gallery/form controller
pub struct Catalog {
    index: IndexRepository,
    media: Arc<MediaResolver>,
    sessions: SessionRegistry,
}

impl Catalog {
    pub fn new(index: IndexRepository, media: Arc<MediaResolver>, sessions: SessionRegistry) -> Self {
        Self {
            index,
            media,
            sessions,
        }
    }

    pub fn index(&self) -> &IndexRepository {
        &self.index
    }

    pub fn media(&self) -> &Arc<MediaResolver> {
        &self.media
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Current index contents
    pub async fn list(&self) -> CatalogResult<IndexSnapshot> {
        Ok(self.index.load().await?)
    }

    /// One entry with media resolved
    pub async fn show(&self, id: &str) -> CatalogResult<EntryView> {
        let snapshot = self.index.load().await?;
        let entry = snapshot
            .find(id)
            .cloned()
            .ok_or_else(|| CatalogError::EntryNotFound(id.to_string()))?;
        Ok(self.view(entry).await)
    }

    /// Resolve media for display; failures become placeholders
    pub async fn view(&self, entry: Entry) -> EntryView {
        let image = self.media.resolve_image(&entry.img_path).await;
        let audio = if entry.has_audio() {
            self.media.resolve_as_data_uri(&entry.audio_path).await
        } else {
            None
        };

        EntryView {
            label: entry.label(),
            entry,
            image,
            audio,
        }
    }

    /// Start a browse session
    pub async fn open_session(&self) -> Uuid {
        self.sessions.create().await
    }

    /// Reload the index and render the session's current selection
    pub async fn browse(&self, session_id: Uuid) -> CatalogResult<GalleryView> {
        self.render(session_id, None).await
    }

    /// Change the session's selection and render it
    pub async fn select(&self, session_id: Uuid, index: usize) -> CatalogResult<GalleryView> {
        self.render(session_id, Some(index)).await
    }

    async fn render(&self, session_id: Uuid, select: Option<usize>) -> CatalogResult<GalleryView> {
        // Reject unknown sessions before touching the store.
        self.sessions
            .get(session_id)
            .await
            .ok_or(CatalogError::SessionNotFound(session_id))?;

        let snapshot = self.index.load().await?;
        let len = snapshot.entries.len();

        let selected_index = self
            .sessions
            .update(session_id, |session| match select {
                Some(index) => session.select(index, len),
                None => session.reload(len),
            })
            .await
            .ok_or(CatalogError::SessionNotFound(session_id))?;

        let labels = snapshot.entries.iter().map(Entry::label).collect();
        let selected = match snapshot.entries.into_iter().nth(selected_index) {
            Some(entry) => Some(self.view(entry).await),
            None => None,
        };

        Ok(GalleryView {
            session_id,
            labels,
            selected_index,
            selected,
        })
    }

    /// Validate and store a new entry
    pub async fn submit(&self, submission: Submission) -> CatalogResult<SubmissionReport> {
        self.submit_with_progress(submission, |_| {}).await
    }

    /// [`submit`](Self::submit), reporting each stage as it starts
    pub async fn submit_with_progress<F>(
        &self,
        submission: Submission,
        mut progress: F,
    ) -> CatalogResult<SubmissionReport>
    where
        F: FnMut(Stage) + Send,
    {
        let plan = validate(submission).map_err(CatalogError::Validation)?;
        let entry = plan.entry.clone();
        let mut stages = Vec::with_capacity(5);
        let mut reach = |stage: Stage, stages: &mut Vec<Stage>| {
            tracing::debug!(id = %entry.id, stage = ?stage, percent = stage.percent(), "Submission progress");
            stages.push(stage);
            progress(stage);
        };

        reach(Stage::Connecting, &mut stages);
        let snapshot = self.index.load().await?;
        if snapshot.contains_id(&entry.id) {
            tracing::info!(id = %entry.id, "Rejected duplicate id");
            return Err(CatalogError::DuplicateId(entry.id.clone()));
        }

        let store = self.index.store();
        let branch = self.index.branch();

        reach(Stage::UploadingImage, &mut stages);
        store
            .create_file(&entry.img_path, &plan.image, &plan.image_message(), branch)
            .await
            .map_err(|e| media_failure(&entry, &entry.img_path, e))?;

        if let Some(audio) = &plan.audio {
            reach(Stage::UploadingAudio, &mut stages);
            store
                .create_file(&entry.audio_path, audio, &plan.audio_message(), branch)
                .await
                .map_err(|e| media_failure(&entry, &entry.audio_path, e))?;
        }

        reach(Stage::WritingIndex, &mut stages);
        let entries = self
            .index
            .modify_from(snapshot, &plan.index_message(), |entries| {
                add_entry(entries, entry.clone())
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    id = %entry.id,
                    error = %e,
                    "Index update failed after media upload; uploaded files are orphaned"
                );
                CatalogError::from(e)
            })?;

        reach(Stage::Done, &mut stages);
        tracing::info!(id = %entry.id, name = %entry.name, total = entries.len(), "Entry added");

        Ok(SubmissionReport {
            total_entries: entries.len(),
            entry,
            stages,
        })
    }
}

fn media_failure(entry: &Entry, path: &str, err: StoreError) -> CatalogError {
    tracing::error!(id = %entry.id, path = %path, error = %err, "Media upload failed");
    CatalogError::Store(err)
}
