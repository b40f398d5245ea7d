//! Index Repository
//!
//! The catalog index is a single JSON array stored at a fixed path in the
//! remote store. Each load returns the entries together with the revision
//! they were read at; each save writes back against that revision, so a
//! concurrent writer turns into an explicit `Conflict` instead of a silent
//! overwrite.
//!
//! ```text
//! load()                      -> IndexSnapshot { entries, revision? }
//! add_entry(entries, entry)   -> entries + entry, sorted by id
//! save(entries, revision?)    -> update_file (revision) | create_file (none)
//! ```
//!
//! The load → mutate → save cycle spans two remote calls and is not
//! transactional. [`IndexRepository::modify`] can reload and reapply a
//! mutation on conflict when `conflict_retries` is non-zero.

use crate::store::{RemoteStore, Revision, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Default location of the index in the repository
pub const DEFAULT_INDEX_PATH: &str = "data.json";

/// One catalog record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Fixed-format code such as "0001"; unique, sorted lexicographically
    pub id: String,
    /// Display name
    pub name: String,
    /// Repository-relative image path
    pub img_path: String,
    /// Repository-relative audio path, empty when absent
    #[serde(default)]
    pub audio_path: String,
}

impl Entry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        img_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            img_path: img_path.into(),
            audio_path: String::new(),
        }
    }

    pub fn audio(mut self, path: impl Into<String>) -> Self {
        self.audio_path = path.into();
        self
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_path.is_empty()
    }

    /// Selector label, "0001 Bulbasaur"
    pub fn label(&self) -> String {
        format!("{} {}", self.id, self.name)
    }
}

/// Index contents as read from the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub entries: Vec<Entry>,
    /// `None` when the index does not exist yet
    pub revision: Option<Revision>,
}

impl IndexSnapshot {
    pub fn contains_id(&self, id: &str) -> bool {
        contains_id(&self.entries, id)
    }

    pub fn find(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// Errors from index operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// An entry with this id already exists
    #[error("Duplicate id: {0} already exists")]
    DuplicateId(String),

    /// The stored document is not a valid index
    #[error("Corrupt index at {path}: {error}")]
    Corrupt { path: String, error: String },

    /// Failed to serialize the index
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

pub fn contains_id(entries: &[Entry], id: &str) -> bool {
    entries.iter().any(|e| e.id == id)
}

/// Append `entry` and return the sequence sorted ascending by id
///
/// Leaves `entries` untouched on `DuplicateId`.
pub fn add_entry(entries: &[Entry], entry: Entry) -> IndexResult<Vec<Entry>> {
    if contains_id(entries, &entry.id) {
        return Err(IndexError::DuplicateId(entry.id));
    }

    let mut next = Vec::with_capacity(entries.len() + 1);
    next.extend_from_slice(entries);
    next.push(entry);
    next.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(next)
}

/// Render entries as pretty UTF-8 JSON (4-space indent, non-ASCII verbatim)
pub fn serialize_entries(entries: &[Entry]) -> IndexResult<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    entries
        .serialize(&mut serializer)
        .map_err(|e| IndexError::Serialization(e.to_string()))?;
    Ok(out)
}

/// Parse a stored index document
pub fn parse_entries(path: &str, bytes: &[u8]) -> IndexResult<Vec<Entry>> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::Corrupt {
        path: path.to_string(),
        error: e.to_string(),
    })
}

/// Loads and saves the catalog index through a remote store
#[derive(Clone)]
pub struct IndexRepository {
    store: Arc<dyn RemoteStore>,
    path: String,
    branch: String,
    conflict_retries: u32,
}

impl IndexRepository {
    /// Create a repository for the index at `path` on `branch`
    pub fn new(store: Arc<dyn RemoteStore>, path: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            branch: branch.into(),
            conflict_retries: 0,
        }
    }

    /// Reload-and-reapply attempts `modify` makes after a conflict
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Read the index; a missing index is the empty bootstrap state
    pub async fn load(&self) -> IndexResult<IndexSnapshot> {
        match self.store.read_file(&self.path, &self.branch).await {
            Ok(file) => {
                let entries = parse_entries(&self.path, &file.bytes)?;
                tracing::debug!(
                    path = %self.path,
                    entries = entries.len(),
                    revision = %file.revision,
                    "Loaded index"
                );
                Ok(IndexSnapshot {
                    entries,
                    revision: Some(file.revision),
                })
            }
            Err(StoreError::NotFound(_)) => {
                tracing::info!(path = %self.path, branch = %self.branch, "Index not found, starting empty");
                Ok(IndexSnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write `entries` against the revision they were loaded at
    pub async fn save(
        &self,
        entries: &[Entry],
        revision: Option<&Revision>,
        message: &str,
    ) -> IndexResult<()> {
        let bytes = serialize_entries(entries)?;

        match revision {
            Some(rev) => {
                self.store
                    .update_file(&self.path, &bytes, rev, message, &self.branch)
                    .await?
            }
            None => {
                // A concurrent first write shows up as AlreadyExists.
                self.store
                    .create_file(&self.path, &bytes, message, &self.branch)
                    .await
                    .map_err(|e| match e {
                        StoreError::AlreadyExists(path) => StoreError::Conflict(path),
                        other => other,
                    })?
            }
        }

        tracing::info!(path = %self.path, entries = entries.len(), message = %message, "Saved index");
        Ok(())
    }

    /// Load, apply `mutation`, save; reapply on conflict up to the configured retries
    pub async fn modify<F>(&self, message: &str, mutation: F) -> IndexResult<Vec<Entry>>
    where
        F: FnMut(&[Entry]) -> IndexResult<Vec<Entry>>,
    {
        let snapshot = self.load().await?;
        self.modify_from(snapshot, message, mutation).await
    }

    /// Like [`modify`](Self::modify), starting from an already loaded snapshot
    pub async fn modify_from<F>(
        &self,
        mut snapshot: IndexSnapshot,
        message: &str,
        mut mutation: F,
    ) -> IndexResult<Vec<Entry>>
    where
        F: FnMut(&[Entry]) -> IndexResult<Vec<Entry>>,
    {
        let mut retries_left = self.conflict_retries;

        loop {
            let next = mutation(&snapshot.entries)?;

            match self.save(&next, snapshot.revision.as_ref(), message).await {
                Err(IndexError::Store(StoreError::Conflict(path))) if retries_left > 0 => {
                    retries_left -= 1;
                    tracing::warn!(
                        path = %path,
                        retries_left,
                        "Index changed since load, reapplying"
                    );
                    snapshot = self.load().await?;
                }
                Err(e) => return Err(e),
                Ok(()) => return Ok(next),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn entry(id: &str) -> Entry {
        Entry::new(id, format!("mon{}", id), format!("pic/{}_mon{}.png", id, id))
    }

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    fn repo(store: Arc<InMemoryStore>) -> IndexRepository {
        IndexRepository::new(store, DEFAULT_INDEX_PATH, "main")
    }

    #[test]
    fn test_add_entry_keeps_sorted() {
        let entries = vec![entry("0001"), entry("0004")];
        let next = add_entry(&entries, entry("0002")).unwrap();
        assert_eq!(ids(&next), vec!["0001", "0002", "0004"]);
    }

    #[test]
    fn test_add_entry_many_distinct_ids() {
        let mut entries = Vec::new();
        for id in ["0150", "0025", "0001", "0133", "0007", "0100"] {
            entries = add_entry(&entries, entry(id)).unwrap();
        }
        assert_eq!(
            ids(&entries),
            vec!["0001", "0007", "0025", "0100", "0133", "0150"]
        );
    }

    #[test]
    fn test_add_entry_duplicate_rejected() {
        let entries = vec![entry("0001"), entry("0004")];
        let err = add_entry(&entries, entry("0001")).unwrap_err();
        assert_eq!(err, IndexError::DuplicateId("0001".into()));
        assert_eq!(ids(&entries), vec!["0001", "0004"]);
    }

    #[test]
    fn test_sort_is_lexicographic() {
        let next = add_entry(&[entry("10")], entry("9")).unwrap();
        assert_eq!(ids(&next), vec!["10", "9"]);
    }

    #[test]
    fn test_serialization_preserves_non_ascii() {
        let entries = vec![Entry::new("0001", "妙蛙種子", "pic/0001_妙蛙種子.png")];
        let bytes = serialize_entries(&entries).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("妙蛙種子"));
        assert!(text.contains("\n    {"));
        assert_eq!(parse_entries("data.json", &bytes).unwrap(), entries);
    }

    #[test]
    fn test_missing_audio_path_defaults_to_empty() {
        let json = br#"[{"id": "0001", "name": "Bulbasaur", "img_path": "pic/0001_Bulbasaur.png"}]"#;
        let entries = parse_entries("data.json", json).unwrap();
        assert_eq!(entries[0].audio_path, "");
        assert!(!entries[0].has_audio());
    }

    #[test]
    fn test_corrupt_index_is_an_error() {
        let err = parse_entries("data.json", b"{not json").unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_load_missing_index_is_empty() {
        let repo = repo(Arc::new(InMemoryStore::new()));
        let snapshot = repo.load().await.unwrap();
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.revision.is_none());
    }

    #[tokio::test]
    async fn test_load_propagates_auth_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next(StoreError::AuthFailure("bad".into())).await;
        let err = repo(store).load().await.unwrap_err();
        assert!(matches!(err, IndexError::Store(StoreError::AuthFailure(_))));
    }

    #[tokio::test]
    async fn test_first_save_creates_then_round_trips() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repo(Arc::clone(&store));

        let entries = vec![
            Entry::new("0001", "Bulbasaur", "pic/0001_Bulbasaur.png"),
            Entry::new("0004", "小火龍", "pic/0004_小火龍.jpg").audio("wav/0004_小火龍.mp3"),
        ];
        repo.save(&entries, None, "Add entry 0004").await.unwrap();

        let snapshot = repo.load().await.unwrap();
        assert_eq!(snapshot.entries, entries);
        assert!(snapshot.revision.is_some());
        assert_eq!(store.commits().await, vec!["Add entry 0004"]);
    }

    #[tokio::test]
    async fn test_save_with_stale_revision_conflicts() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repo(Arc::clone(&store));
        repo.save(&[entry("0001")], None, "init").await.unwrap();

        let a = repo.load().await.unwrap();
        let b = repo.load().await.unwrap();

        let a_next = add_entry(&a.entries, entry("0002")).unwrap();
        repo.save(&a_next, a.revision.as_ref(), "a").await.unwrap();
        let stored = store.get(DEFAULT_INDEX_PATH, "main").await.unwrap();

        let b_next = add_entry(&b.entries, entry("0003")).unwrap();
        let err = repo.save(&b_next, b.revision.as_ref(), "b").await.unwrap_err();
        assert_eq!(err, IndexError::Store(StoreError::Conflict("data.json".into())));
        assert_eq!(store.get(DEFAULT_INDEX_PATH, "main").await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_racing_first_writes_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repo(Arc::clone(&store));

        repo.save(&[entry("0001")], None, "a").await.unwrap();
        let err = repo.save(&[entry("0002")], None, "b").await.unwrap_err();
        assert!(matches!(err, IndexError::Store(StoreError::Conflict(_))));
    }

    /// Overwrite the index from "another session" while a mutation runs
    fn race_writer(store: &Arc<InMemoryStore>, entries: &[Entry]) {
        let bytes = serialize_entries(entries).unwrap();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let current = store.read_file(DEFAULT_INDEX_PATH, "main").await.unwrap();
                store
                    .update_file(DEFAULT_INDEX_PATH, &bytes, &current.revision, "race", "main")
                    .await
                    .unwrap();
            })
        });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_modify_without_retries_surfaces_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repo(Arc::clone(&store));
        repo.save(&[entry("0001")], None, "init").await.unwrap();

        let result = repo
            .modify("Add entry 0003", |entries| {
                race_writer(&store, &[entry("0001"), entry("0002")]);
                add_entry(entries, entry("0003"))
            })
            .await;

        assert!(matches!(
            result,
            Err(IndexError::Store(StoreError::Conflict(_)))
        ));
        let stored = repo.load().await.unwrap();
        assert_eq!(ids(&stored.entries), vec!["0001", "0002"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_modify_with_retries_reapplies_after_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repo(Arc::clone(&store)).with_conflict_retries(2);
        repo.save(&[entry("0001")], None, "init").await.unwrap();

        let mut raced = false;
        let next = repo
            .modify("Add entry 0003", |entries| {
                if !raced {
                    raced = true;
                    race_writer(&store, &[entry("0001"), entry("0002")]);
                }
                add_entry(entries, entry("0003"))
            })
            .await
            .unwrap();

        assert_eq!(ids(&next), vec!["0001", "0002", "0003"]);
        let stored = repo.load().await.unwrap();
        assert_eq!(ids(&stored.entries), vec!["0001", "0002", "0003"]);
    }

    #[tokio::test]
    async fn test_modify_duplicate_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repo(Arc::clone(&store));
        repo.save(&[entry("0001")], None, "init").await.unwrap();

        let err = repo
            .modify("Add entry 0001", |entries| add_entry(entries, entry("0001")))
            .await
            .unwrap_err();
        assert_eq!(err, IndexError::DuplicateId("0001".into()));
        assert_eq!(store.commits().await, vec!["init"]);
    }
}
