//! In-Memory Store
//!
//! A `RemoteStore` kept entirely in process. Branches are independent
//! namespaces. Revisions are derived from a per-file write counter and a
//! CRC of the content, so every write yields a fresh marker.
//!
//! Failures can be queued with [`InMemoryStore::fail_next`],
//! [`InMemoryStore::fail_write`] and [`InMemoryStore::fail_after_write`]
//! to exercise the error paths of callers.

use super::*;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Failure {
    /// Only writes to this path trigger it; `None` matches any call
    write_path: Option<String>,
    /// Reported after the write has been applied
    applied: bool,
    error: StoreError,
}

#[derive(Debug, Clone)]
struct StoredFile {
    bytes: Vec<u8>,
    revision: Revision,
    writes: u64,
}

/// In-process implementation of the store contract
#[derive(Debug, Default)]
pub struct InMemoryStore {
    files: RwLock<HashMap<(String, String), StoredFile>>,
    failures: RwLock<VecDeque<Failure>>,
    commits: RwLock<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without recording a commit
    pub async fn insert(&self, path: &str, branch: &str, bytes: impl Into<Vec<u8>>) -> Revision {
        let bytes = bytes.into();
        let mut files = self.files.write().await;
        let key = (branch.to_string(), path.to_string());
        let writes = files.get(&key).map(|f| f.writes + 1).unwrap_or(1);
        let revision = revision_for(&bytes, writes);
        files.insert(
            key,
            StoredFile {
                bytes,
                revision: revision.clone(),
                writes,
            },
        );
        revision
    }

    /// Content of a file, if present
    pub async fn get(&self, path: &str, branch: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .await
            .get(&(branch.to_string(), path.to_string()))
            .map(|f| f.bytes.clone())
    }

    /// Paths present on a branch, sorted
    pub async fn paths(&self, branch: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == branch)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Commit messages of successful writes, oldest first
    pub async fn commits(&self) -> Vec<String> {
        self.commits.read().await.clone()
    }

    /// Make the next call (of any kind) fail with `error`
    pub async fn fail_next(&self, error: StoreError) {
        self.failures.write().await.push_back(Failure {
            write_path: None,
            applied: false,
            error,
        });
    }

    /// Make the next create or update of `path` fail with `error`
    pub async fn fail_write(&self, path: &str, error: StoreError) {
        self.failures.write().await.push_back(Failure {
            write_path: Some(path.to_string()),
            applied: false,
            error,
        });
    }

    /// Apply the next successful create or update of `path`, then report
    /// `error` anyway, like a request that timed out after the commit
    pub async fn fail_after_write(&self, path: &str, error: StoreError) {
        self.failures.write().await.push_back(Failure {
            write_path: Some(path.to_string()),
            applied: true,
            error,
        });
    }

    async fn take_failure(&self, written: Option<&str>, applied: bool) -> StoreResult<()> {
        let mut failures = self.failures.write().await;
        let position = failures.iter().position(|f| {
            f.applied == applied
                && match &f.write_path {
                    None => true,
                    Some(path) => written == Some(path.as_str()),
                }
        });

        match position.and_then(|i| failures.remove(i)) {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}

fn revision_for(bytes: &[u8], writes: u64) -> Revision {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&writes.to_le_bytes());
    hasher.update(bytes);
    Revision::new(format!("{:08x}{:04x}", hasher.finalize(), writes))
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn read_file(&self, path: &str, branch: &str) -> StoreResult<FileContent> {
        self.take_failure(None, false).await?;

        let files = self.files.read().await;
        files
            .get(&(branch.to_string(), path.to_string()))
            .map(|f| FileContent {
                bytes: f.bytes.clone(),
                revision: f.revision.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn create_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        branch: &str,
    ) -> StoreResult<()> {
        self.take_failure(Some(path), false).await?;

        {
            let mut files = self.files.write().await;
            let key = (branch.to_string(), path.to_string());
            if files.contains_key(&key) {
                return Err(StoreError::AlreadyExists(path.to_string()));
            }

            files.insert(
                key,
                StoredFile {
                    bytes: bytes.to_vec(),
                    revision: revision_for(bytes, 1),
                    writes: 1,
                },
            );
            self.commits.write().await.push(message.to_string());
        }

        self.take_failure(Some(path), true).await
    }

    async fn update_file(
        &self,
        path: &str,
        bytes: &[u8],
        revision: &Revision,
        message: &str,
        branch: &str,
    ) -> StoreResult<()> {
        self.take_failure(Some(path), false).await?;

        {
            let mut files = self.files.write().await;
            let file = files
                .get_mut(&(branch.to_string(), path.to_string()))
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

            if &file.revision != revision {
                return Err(StoreError::Conflict(path.to_string()));
            }

            file.writes += 1;
            file.bytes = bytes.to_vec();
            file.revision = revision_for(bytes, file.writes);
            self.commits.write().await.push(message.to_string());
        }

        self.take_failure(Some(path), true).await
    }
}
