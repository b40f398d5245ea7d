//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The store token, repository and branch have no usable defaults and
//! must be supplied by one of the two; [`Config::validate`] checks them.

use crate::media::MediaCacheConfig;
use crate::store::{GitHubStoreConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote store configuration
#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    /// GitHub personal access token
    #[serde(default)]
    pub token: String,

    /// Repository identifier, `owner/name`
    #[serde(default)]
    pub repo: String,

    /// Branch holding the catalog
    #[serde(default)]
    pub branch: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_index_path")]
    pub index_path: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attempts per store call for transient failures (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Reload-and-reapply attempts after an index conflict (0 = surface it)
    #[serde(default)]
    pub conflict_retries: u32,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_index_path() -> String {
    crate::index::DEFAULT_INDEX_PATH.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_retry_max_delay() -> u64 {
    8_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: String::new(),
            branch: String::new(),
            api_url: default_api_url(),
            index_path: default_index_path(),
            request_timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            conflict_retries: 0,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("index_path", &self.index_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("conflict_retries", &self.conflict_retries)
            .finish()
    }
}

impl StoreConfig {
    pub fn github(&self) -> GitHubStoreConfig {
        GitHubStoreConfig {
            token: self.token.clone(),
            repo: self.repo.clone(),
            api_url: self.api_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = permissive)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Largest accepted request body (uploads are base64 in JSON)
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Browse sessions expire after this much inactivity
    #[serde(default = "default_session_idle")]
    pub session_idle_hours: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_max_body() -> usize {
    50 * 1024 * 1024 // 50 MB
}

fn default_session_idle() -> u64 {
    24
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body(),
            session_idle_hours: default_session_idle(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_hours.saturating_mul(3600))
    }
}

/// Media cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl MediaConfig {
    pub fn cache(&self) -> MediaCacheConfig {
        MediaCacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            capacity: self.cache_capacity,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, default locations, or environment
    pub fn load_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_with_env(path)?;
            tracing::info!("Loaded config from {:?}", path);
            return Ok(config);
        }

        let config_paths = [
            dirs::config_dir().map(|p| p.join("pokedex").join("config.toml")),
            Some(PathBuf::from("/etc/pokedex/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Ok(Self::from_env())
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Store overrides
        if let Some(token) = lookup("POKEDEX_GITHUB_TOKEN") {
            self.store.token = token;
        }
        if let Some(repo) = lookup("POKEDEX_GITHUB_REPO") {
            self.store.repo = repo;
        }
        if let Some(branch) = lookup("POKEDEX_GITHUB_BRANCH") {
            self.store.branch = branch;
        }

        // API overrides
        if let Some(host) = lookup("POKEDEX_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("POKEDEX_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("POKEDEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("POKEDEX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check that the required store settings are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("store.token", &self.store.token),
            ("store.repo", &self.store.repo),
            ("store.branch", &self.store.branch),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        if !self.store.repo.contains('/') {
            return Err(ConfigError::Invalid {
                key: "store.repo",
                error: format!("expected owner/name, got '{}'", self.store.repo),
            });
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {error}")]
    Invalid { key: &'static str, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Pokedex Configuration
#
# Environment variables override these settings:
# - POKEDEX_GITHUB_TOKEN
# - POKEDEX_GITHUB_REPO
# - POKEDEX_GITHUB_BRANCH
# - POKEDEX_API_HOST
# - POKEDEX_API_PORT
# - POKEDEX_LOG_LEVEL
# - POKEDEX_LOG_FORMAT

[store]
# GitHub personal access token with contents read/write permission
token = ""

# Repository holding the catalog, owner/name
repo = ""

# Branch holding the catalog
branch = "main"

# GitHub API base URL
api_url = "https://api.github.com"

# Path of the index document in the repository
index_path = "data.json"

# Request timeout in seconds
request_timeout_secs = 30

# Attempts per call for network errors and rate limits (1 disables retries)
max_attempts = 3
retry_base_delay_ms = 500
retry_max_delay_ms = 8000

# Reload-and-reapply attempts when another session changed the index
# between load and save (0 reports the conflict instead)
conflict_retries = 0

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8082

# Allowed CORS origins (empty allows any)
cors_origins = []

# Maximum request body size in bytes
max_body_bytes = 52428800

# Browse sessions expire after this many idle hours
session_idle_hours = 24

[media]
# How long resolved media stays cached (seconds)
cache_ttl_secs = 3600

# Maximum number of cached media files
cache_capacity = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
