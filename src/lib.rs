//! # Pokedex
//!
//! A small catalog service whose entries and media live in a GitHub
//! repository. The service holds no storage of its own: every read goes
//! to the repository's contents API and every change is a commit.
//!
//! ## Modules
//!
//! - [`store`]: Remote store contract, GitHub client, in-memory double, retries
//! - [`index`]: The `data.json` entry list and its optimistic-concurrency writes
//! - [`media`]: Data URI rendering with a TTL cache
//! - [`catalog`]: Browse sessions and the new-entry submission flow
//! - [`api`]: REST API server and browser UI with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pokedex::catalog::{Catalog, SessionRegistry, Submission, Upload};
//! use pokedex::index::{IndexRepository, DEFAULT_INDEX_PATH};
//! use pokedex::media::{MediaCacheConfig, MediaResolver};
//! use pokedex::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let index = IndexRepository::new(store.clone(), DEFAULT_INDEX_PATH, "main");
//!     let media = Arc::new(MediaResolver::new(store, "main", MediaCacheConfig::default()));
//!     let catalog = Catalog::new(index, media, SessionRegistry::default());
//!
//!     catalog
//!         .submit(Submission {
//!             id: "0001".into(),
//!             name: "Bulbasaur".into(),
//!             image: Some(Upload::new("bulbasaur.png", std::fs::read("bulbasaur.png")?)),
//!             audio: None,
//!         })
//!         .await?;
//!
//!     let session = catalog.open_session().await;
//!     let view = catalog.browse(session).await?;
//!     println!("{:?}", view.labels);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod index;
pub mod media;
pub mod store;

// Re-export top-level types for convenience
pub use store::{
    FileContent, GitHubStore, GitHubStoreConfig, InMemoryStore, RemoteStore, RetryPolicy,
    RetryingStore, Revision, StoreError, StoreResult,
};

pub use index::{Entry, IndexError, IndexRepository, IndexResult, IndexSnapshot};

pub use media::{MediaCacheConfig, MediaResolver, PLACEHOLDER_IMAGE};

pub use catalog::{
    Catalog, CatalogError, CatalogResult, EntryView, GalleryView, SessionRegistry, Stage,
    Submission, SubmissionReport, Upload,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig};
