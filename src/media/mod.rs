//! Media Resolver
//!
//! Turns repository-relative media paths into embeddable `data:` URIs.
//! Media files are written once under unique names and never rewritten,
//! so resolved URIs are cached per path for a fixed time window without
//! any invalidation.

use crate::store::RemoteStore;
use base64::{engine::general_purpose, Engine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Shown in place of an image that could not be resolved
pub const PLACEHOLDER_IMAGE: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAxMDAgMTAwIj48cmVjdCB3aWR0aD0iMTAwIiBoZWlnaHQ9IjEwMCIgZmlsbD0iIzExMSIvPjx0ZXh0IHg9IjUwIiB5PSI1OCIgZm9udC1zaXplPSIzMCIgdGV4dC1hbmNob3I9Im1pZGRsZSIgZmlsbD0iIzMwYTdkNyI+PzwvdGV4dD48L3N2Zz4=";

const FALLBACK_MIME: &str = "application/octet-stream";

/// Repository directories media files are written under
pub const MEDIA_DIRS: &[&str] = &["pic", "wav"];

/// Whether `path` names a file directly inside one of [`MEDIA_DIRS`]
pub fn is_media_path(path: &str) -> bool {
    match path.split_once('/') {
        Some((dir, file)) => {
            MEDIA_DIRS.contains(&dir)
                && !file.is_empty()
                && !file.contains(['/', '\\'])
                && file != "."
                && file != ".."
        }
        None => false,
    }
}

/// MIME type for a path, by extension (case-insensitive)
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => ext.to_ascii_lowercase(),
        _ => return FALLBACK_MIME,
    };

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "opus" => "audio/ogg",
        _ => FALLBACK_MIME,
    }
}

/// Encode bytes as `data:{mime};base64,{payload}`
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// Cache settings for the resolver
#[derive(Debug, Clone)]
pub struct MediaCacheConfig {
    /// How long a resolved URI stays valid
    pub ttl: Duration,
    /// Maximum number of cached paths
    pub capacity: usize,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedUri {
    uri: Arc<str>,
    inserted_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedUri>,
    hits: u64,
    misses: u64,
}

/// Resolves media paths to data URIs through the remote store
pub struct MediaResolver {
    store: Arc<dyn RemoteStore>,
    branch: String,
    config: MediaCacheConfig,
    cache: RwLock<CacheState>,
}

impl MediaResolver {
    pub fn new(store: Arc<dyn RemoteStore>, branch: impl Into<String>, config: MediaCacheConfig) -> Self {
        Self {
            store,
            branch: branch.into(),
            config,
            cache: RwLock::new(CacheState::default()),
        }
    }

    /// Fetch `path` and render it as a data URI
    ///
    /// Returns `None` when the fetch fails for any reason; the caller
    /// substitutes a placeholder.
    pub async fn resolve_as_data_uri(&self, path: &str) -> Option<Arc<str>> {
        if path.is_empty() {
            return None;
        }

        if let Some(uri) = self.cached(path).await {
            return Some(uri);
        }

        let file = match self.store.read_file(path, &self.branch).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Media unavailable");
                return None;
            }
        };

        let uri: Arc<str> = encode_data_uri(mime_for_path(path), &file.bytes).into();
        self.insert(path, Arc::clone(&uri)).await;
        Some(uri)
    }

    /// Resolve an image, falling back to [`PLACEHOLDER_IMAGE`]
    pub async fn resolve_image(&self, path: &str) -> Arc<str> {
        self.resolve_as_data_uri(path)
            .await
            .unwrap_or_else(|| Arc::from(PLACEHOLDER_IMAGE))
    }

    pub async fn stats(&self) -> MediaCacheStats {
        let cache = self.cache.read().await;
        MediaCacheStats {
            entries: cache.entries.len(),
            hits: cache.hits,
            misses: cache.misses,
        }
    }

    async fn cached(&self, path: &str) -> Option<Arc<str>> {
        let mut cache = self.cache.write().await;
        let fresh = cache
            .entries
            .get(path)
            .filter(|c| c.inserted_at.elapsed() < self.config.ttl)
            .map(|c| Arc::clone(&c.uri));

        match fresh {
            Some(uri) => {
                cache.hits += 1;
                Some(uri)
            }
            None => {
                cache.entries.remove(path);
                cache.misses += 1;
                None
            }
        }
    }

    async fn insert(&self, path: &str, uri: Arc<str>) {
        if self.config.capacity == 0 {
            return;
        }

        let mut cache = self.cache.write().await;
        let ttl = self.config.ttl;
        cache.entries.retain(|_, c| c.inserted_at.elapsed() < ttl);

        while cache.entries.len() >= self.config.capacity {
            let oldest = cache
                .entries
                .iter()
                .min_by_key(|(_, c)| c.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    cache.entries.remove(&key);
                }
                None => break,
            }
        }

        cache.entries.insert(
            path.to_string(),
            CachedUri {
                uri,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreError};

    fn resolver(store: Arc<InMemoryStore>, config: MediaCacheConfig) -> MediaResolver {
        MediaResolver::new(store, "main", config)
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path("pic/0001_a.png"), "image/png");
        assert_eq!(mime_for_path("pic/0001_a.JPG"), "image/jpeg");
        assert_eq!(mime_for_path("pic/0001_a.jpeg"), "image/jpeg");
        assert_eq!(mime_for_path("wav/0001_a.mp3"), "audio/mpeg");
        assert_eq!(mime_for_path("wav/0001_a.wav"), "audio/wav");
        assert_eq!(mime_for_path("wav/0001_a.opus"), "audio/ogg");
        assert_eq!(mime_for_path("wav/0001_a.flac"), "application/octet-stream");
        assert_eq!(mime_for_path("pic.d/noext"), "application/octet-stream");
        assert_eq!(mime_for_path(".png"), "application/octet-stream");
    }

    #[test]
    fn test_is_media_path() {
        assert!(is_media_path("pic/0001_Bulbasaur.png"));
        assert!(is_media_path("wav/0004_小火龍.opus"));
        assert!(!is_media_path("data.json"));
        assert!(!is_media_path("pic/"));
        assert!(!is_media_path("pic/.."));
        assert!(!is_media_path("pic/../data.json"));
        assert!(!is_media_path("../../other/private-repo/contents/secrets.env"));
        assert!(!is_media_path("src/main.rs"));
    }

    #[test]
    fn test_encode_data_uri() {
        assert_eq!(
            encode_data_uri("image/png", b"hello"),
            "data:image/png;base64,aGVsbG8="
        );
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("wav/0001_a.mp3", "main", b"ID3".to_vec()).await;

        let resolver = resolver(store, MediaCacheConfig::default());
        let uri = resolver.resolve_as_data_uri("wav/0001_a.mp3").await.unwrap();
        assert_eq!(&*uri, "data:audio/mpeg;base64,SUQz");
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let resolver = resolver(Arc::new(InMemoryStore::new()), MediaCacheConfig::default());
        assert!(resolver.resolve_as_data_uri("pic/nope.png").await.is_none());
        assert!(resolver.resolve_as_data_uri("").await.is_none());
        assert_eq!(&*resolver.resolve_image("pic/nope.png").await, PLACEHOLDER_IMAGE);
    }

    #[tokio::test]
    async fn test_store_failure_is_none_and_not_cached() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("pic/0001_a.png", "main", b"png".to_vec()).await;
        store.fail_next(StoreError::Transient("down".into())).await;

        let resolver = resolver(Arc::clone(&store), MediaCacheConfig::default());
        assert!(resolver.resolve_as_data_uri("pic/0001_a.png").await.is_none());
        assert!(resolver.resolve_as_data_uri("pic/0001_a.png").await.is_some());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("pic/0001_a.png", "main", b"png".to_vec()).await;

        let resolver = resolver(Arc::clone(&store), MediaCacheConfig::default());
        let first = resolver.resolve_as_data_uri("pic/0001_a.png").await.unwrap();

        // A queued failure would surface if the store were consulted again.
        store.fail_next(StoreError::Transient("down".into())).await;
        let second = resolver.resolve_as_data_uri("pic/0001_a.png").await.unwrap();
        assert_eq!(first, second);

        let stats = resolver.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("pic/0001_a.png", "main", b"png".to_vec()).await;

        let resolver = resolver(
            Arc::clone(&store),
            MediaCacheConfig {
                ttl: Duration::ZERO,
                capacity: 8,
            },
        );
        assert!(resolver.resolve_as_data_uri("pic/0001_a.png").await.is_some());

        store.fail_next(StoreError::Transient("down".into())).await;
        assert!(resolver.resolve_as_data_uri("pic/0001_a.png").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..3 {
            store.insert(&format!("pic/{}.png", i), "main", vec![i as u8]).await;
        }

        let resolver = resolver(
            Arc::clone(&store),
            MediaCacheConfig {
                ttl: Duration::from_secs(60),
                capacity: 2,
            },
        );
        for i in 0..3 {
            resolver.resolve_as_data_uri(&format!("pic/{}.png", i)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(resolver.stats().await.entries, 2);

        // pic/0.png was evicted, so the store is consulted and fails.
        store.fail_next(StoreError::Transient("down".into())).await;
        assert!(resolver.resolve_as_data_uri("pic/0.png").await.is_none());
    }
}
