//! Pokedex Server
//!
//! Run with: cargo run --bin pokedex
//!
//! # Configuration
//!
//! Settings come from a TOML file (`--config`, or the first of
//! `~/.config/pokedex/config.toml`, `/etc/pokedex/config.toml`,
//! `./config.toml`) with environment overrides:
//! - `POKEDEX_GITHUB_TOKEN`: GitHub token (required)
//! - `POKEDEX_GITHUB_REPO`: Repository, `owner/name` (required)
//! - `POKEDEX_GITHUB_BRANCH`: Branch (required)
//! - `POKEDEX_API_HOST` / `POKEDEX_API_PORT`: Bind address (default: 0.0.0.0:8082)
//! - `POKEDEX_LOG_LEVEL` / `POKEDEX_LOG_FORMAT`: Logging (default: info, pretty)
//! - `RUST_LOG`: Full filter, takes precedence over the log level

use clap::Parser;
use pokedex::api::{serve, AppState};
use pokedex::catalog::{Catalog, SessionRegistry};
use pokedex::config::{Config, ConfigError, LoggingConfig};
use pokedex::index::IndexRepository;
use pokedex::media::MediaResolver;
use pokedex::store::{GitHubStore, RemoteStore, RetryingStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pokedex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pokedex catalog server backed by a GitHub repository")]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_tracing(&config.logging);

    tracing::info!("Starting Pokedex server v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    tracing::info!(
        repo = %config.store.repo,
        branch = %config.store.branch,
        index = %config.store.index_path,
        "Using catalog repository"
    );

    // Remote store with transient-failure retries
    let github = GitHubStore::new(config.store.github())?;
    let store: Arc<dyn RemoteStore> =
        Arc::new(RetryingStore::new(github, config.store.retry_policy()));

    let index = IndexRepository::new(
        Arc::clone(&store),
        config.store.index_path.clone(),
        config.store.branch.clone(),
    )
    .with_conflict_retries(config.store.conflict_retries);

    let media = Arc::new(MediaResolver::new(
        store,
        config.store.branch.clone(),
        config.media.cache(),
    ));

    let sessions = SessionRegistry::new(config.api.session_idle());
    let catalog = Arc::new(Catalog::new(index, media, sessions));

    // Surface bad credentials at startup; the server still starts
    match catalog.list().await {
        Ok(snapshot) => tracing::info!(entries = snapshot.entries.len(), "Index reachable"),
        Err(e) => tracing::warn!("Index not reachable yet: {}", e),
    }

    serve(AppState::new(catalog, config.api.clone())).await?;

    tracing::info!("Pokedex server stopped");
    Ok(())
}

/// Load the config with a stderr logger in place. The configured
/// subscriber depends on the config, so it is installed afterwards.
fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_logging_to(explicit, std::io::stderr)
}

fn load_config_logging_to<W>(explicit: Option<&Path>, writer: W) -> Result<Config, ConfigError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt().with_writer(writer).finish();
    tracing::subscriber::with_default(subscriber, || Config::load_default(explicit))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("pokedex={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
