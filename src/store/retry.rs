//! Retry Decorator
//!
//! Wraps any [`RemoteStore`] and retries calls that fail with
//! [`StoreError::Transient`]. Every other error is returned on the first
//! attempt. Delays grow exponentially: base, 2*base, 4*base, ... capped
//! at `max_delay_ms`.

use super::*;
use std::future::Future;
use std::time::Duration;

/// Backoff settings for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first (1 disables retries)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Upper bound on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after `attempt` (1-based) has failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.run_counted(what, op).await.0
    }

    /// Like [`RetryPolicy::run`], also returning the number of attempts made
    pub async fn run_counted<T, F, Fut>(&self, what: &str, mut op: F) -> (StoreResult<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation = %what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return (result, attempt),
            }
        }
    }
}

/// Store decorator applying a [`RetryPolicy`] to every call.
///
/// A write that times out may still have been committed. When a retried
/// create then finds the file already there, or a retried update finds its
/// revision stale, the file is read back: identical content means an
/// earlier attempt landed and the write is reported as done.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolve a write rejected after a transient failure
    async fn confirm_landed(
        &self,
        path: &str,
        bytes: &[u8],
        branch: &str,
        rejection: StoreError,
    ) -> StoreResult<()> {
        match self.policy.run("read_file", || self.inner.read_file(path, branch)).await {
            Ok(file) if file.bytes == bytes => {
                tracing::info!(
                    path = %path,
                    branch = %branch,
                    "Earlier attempt had already written the file"
                );
                Ok(())
            }
            Ok(_) => Err(rejection),
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "Could not read back rejected write");
                Err(rejection)
            }
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    async fn read_file(&self, path: &str, branch: &str) -> StoreResult<FileContent> {
        self.policy
            .run("read_file", || self.inner.read_file(path, branch))
            .await
    }

    async fn create_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        branch: &str,
    ) -> StoreResult<()> {
        let (result, attempts) = self
            .policy
            .run_counted("create_file", || {
                self.inner.create_file(path, bytes, message, branch)
            })
            .await;

        match result {
            Err(err @ StoreError::AlreadyExists(_)) if attempts > 1 => {
                self.confirm_landed(path, bytes, branch, err).await
            }
            result => result,
        }
    }

    async fn update_file(
        &self,
        path: &str,
        bytes: &[u8],
        revision: &Revision,
        message: &str,
        branch: &str,
    ) -> StoreResult<()> {
        let (result, attempts) = self
            .policy
            .run_counted("update_file", || {
                self.inner.update_file(path, bytes, revision, message, branch)
            })
            .await;

        match result {
            Err(err @ StoreError::Conflict(_)) if attempts > 1 => {
                self.confirm_landed(path, bytes, branch, err).await
            }
            result => result,
        }
    }
}
