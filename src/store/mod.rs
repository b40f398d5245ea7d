//! Remote Store
//!
//! The catalog keeps no state of its own: the entry index and every media
//! file live in a version-controlled repository reached through its
//! hosting provider's content API.
//!
//! - **github**: GitHub contents API client
//! - **memory**: In-process store with the same contract (tests, demos)
//! - **retry**: Bounded exponential backoff for transient failures
//!
//! # Contract
//!
//! ```text
//! read_file(path, branch)                     -> (bytes, revision)
//! create_file(path, bytes, message, branch)   -> ()   AlreadyExists if present
//! update_file(path, bytes, rev, msg, branch)  -> ()   Conflict if rev is stale
//! ```

pub mod github;
pub mod memory;
pub mod retry;

pub use github::{GitHubStore, GitHubStoreConfig};
pub use memory::InMemoryStore;
pub use retry::{RetryPolicy, RetryingStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque token identifying one stored version of a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File content together with the revision it was read at
#[derive(Debug, Clone)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub revision: Revision,
}

/// Read/write surface of the remote store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the current content and revision of `path` on `branch`
    async fn read_file(&self, path: &str, branch: &str) -> StoreResult<FileContent>;

    /// Create a new file; fails with `AlreadyExists` if `path` is taken
    async fn create_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        branch: &str,
    ) -> StoreResult<()>;

    /// Replace a file only if `revision` is still the current one
    async fn update_file(
        &self,
        path: &str,
        bytes: &[u8],
        revision: &Revision,
        message: &str,
        branch: &str,
    ) -> StoreResult<()>;
}

/// Errors surfaced by a remote store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Path does not exist on the branch
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials missing, invalid or lacking permission
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Network error, timeout, rate limit or server-side failure
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Create targeted a path that already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Update carried a stale revision
    #[error("Conflict: {0} was modified concurrently")]
    Conflict(String),

    /// The store answered with something we could not decode
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Conflict("data.json".to_string());
        assert_eq!(err.to_string(), "Conflict: data.json was modified concurrently");

        let err = StoreError::NotFound("pic/0001_a.png".to_string());
        assert_eq!(err.to_string(), "Not found: pic/0001_a.png");
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StoreError::Transient("timeout".into()).is_transient());
        assert!(!StoreError::AuthFailure("bad token".into()).is_transient());
        assert!(!StoreError::Conflict("x".into()).is_transient());
    }

    #[test]
    fn test_revision_serializes_as_plain_string() {
        let rev = Revision::new("abc123");
        assert_eq!(serde_json::to_string(&rev).unwrap(), "\"abc123\"");
        assert_eq!(rev.to_string(), "abc123");
    }
}
