//! GitHub Store
//!
//! `RemoteStore` over the GitHub repository contents API:
//! - `GET  /repos/{repo}/contents/{path}?ref={branch}` for reads
//! - `PUT  /repos/{repo}/contents/{path}` for creates and updates
//!
//! The blob `sha` returned by the API is the revision marker.

use super::*;
use base64::{engine::general_purpose, Engine};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// GitHub contents API client
pub struct GitHubStore {
    client: Client,
    config: GitHubStoreConfig,
}

/// Configuration for the GitHub store
#[derive(Debug, Clone)]
pub struct GitHubStoreConfig {
    /// Personal access token
    pub token: String,
    /// Repository identifier, `owner/name`
    pub repo: String,
    /// API base URL (override for GitHub Enterprise)
    pub api_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for GitHubStoreConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: String::new(),
            api_url: "https://api.github.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl GitHubStore {
    /// Create a new GitHub store
    pub fn new(config: GitHubStoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("Pokedex/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::InvalidResponse(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &GitHubStoreConfig {
        &self.config
    }

    /// Contents endpoint for a repository-relative path
    fn contents_url(&self, path: &str) -> StoreResult<String> {
        Ok(format!(
            "{}/repos/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.repo,
            encode_path(path)?
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> StoreResult<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| transport_error(e, path))
    }

    async fn put_contents(
        &self,
        path: &str,
        bytes: &[u8],
        sha: Option<&Revision>,
        message: &str,
        branch: &str,
        creating: bool,
    ) -> StoreResult<()> {
        let body = PutContentsRequest {
            message,
            content: general_purpose::STANDARD.encode(bytes),
            branch,
            sha: sha.map(Revision::as_str),
        };

        let request = self
            .client
            .put(self.contents_url(path)?)
            .header("Accept", JSON_MEDIA_TYPE)
            .json(&body);
        let response = self.send(request, path).await?;

        if response.status().is_success() {
            tracing::debug!(path = %path, branch = %branch, bytes = bytes.len(), "Wrote file to GitHub");
            return Ok(());
        }

        let status = response.status().as_u16();
        if status == 422 {
            // GitHub answers 422 when a create omits the sha of an existing
            // file, or when an update's sha no longer matches.
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(path = %path, status, body = %text, "GitHub rejected write");
            return Err(if creating {
                StoreError::AlreadyExists(path.to_string())
            } else {
                StoreError::Conflict(path.to_string())
            });
        }

        Err(status_error(response, path).await)
    }
}

#[async_trait]
impl RemoteStore for GitHubStore {
    async fn read_file(&self, path: &str, branch: &str) -> StoreResult<FileContent> {
        let url = self.contents_url(path)?;
        let request = self
            .client
            .get(&url)
            .query(&[("ref", branch)])
            .header("Accept", JSON_MEDIA_TYPE);
        let response = self.send(request, path).await?;

        if !response.status().is_success() {
            return Err(status_error(response, path).await);
        }

        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("{}: {}", path, e)))?;

        if contents.kind != "file" {
            return Err(StoreError::InvalidResponse(format!(
                "{} is a {}, not a file",
                path, contents.kind
            )));
        }

        let revision = Revision::new(contents.sha);

        let bytes = match (contents.encoding.as_deref(), contents.content) {
            (Some("base64"), Some(content)) if !content.is_empty() || contents.size == 0 => {
                decode_content(&content)
                    .map_err(|e| StoreError::InvalidResponse(format!("{}: {}", path, e)))?
            }
            _ => {
                // Files over 1 MB come back without inline content.
                tracing::debug!(path = %path, size = contents.size, "Fetching raw content");
                let request = self
                    .client
                    .get(&url)
                    .query(&[("ref", branch)])
                    .header("Accept", RAW_MEDIA_TYPE);
                let response = self.send(request, path).await?;
                if !response.status().is_success() {
                    return Err(status_error(response, path).await);
                }
                response
                    .bytes()
                    .await
                    .map_err(|e| transport_error(e, path))?
                    .to_vec()
            }
        };

        Ok(FileContent { bytes, revision })
    }

    async fn create_file(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        branch: &str,
    ) -> StoreResult<()> {
        self.put_contents(path, bytes, None, message, branch, true).await
    }

    async fn update_file(
        &self,
        path: &str,
        bytes: &[u8],
        revision: &Revision,
        message: &str,
        branch: &str,
    ) -> StoreResult<()> {
        self.put_contents(path, bytes, Some(revision), message, branch, false)
            .await
    }
}

/// Percent-encode each segment of a repository path, keeping separators.
///
/// Dot segments are resolved by the URL parser, so a path containing them
/// could address another repository. Those paths, and empty segments, are
/// reported as not found.
fn encode_path(path: &str) -> StoreResult<String> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        tracing::warn!(path = %path, "Rejected path outside the repository contents");
        return Err(StoreError::NotFound(path.to_string()));
    }

    Ok(segments
        .iter()
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Inline content is base64 wrapped at 60 columns
fn decode_content(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD.decode(compact)
}

fn transport_error(err: reqwest::Error, path: &str) -> StoreError {
    if err.is_timeout() {
        StoreError::Transient(format!("{}: request timed out", path))
    } else if err.is_decode() {
        StoreError::InvalidResponse(format!("{}: {}", path, err))
    } else {
        StoreError::Transient(format!("{}: {}", path, err))
    }
}

/// Map a non-success response onto the store error taxonomy
async fn status_error(response: Response, path: &str) -> StoreError {
    let status = response.status().as_u16();
    let rate_limited = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(false);
    let reset_in = response
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .map(|ts| (ts - Utc::now().timestamp()).max(0));

    let text = response.text().await.unwrap_or_default();
    classify_status(status, rate_limited, reset_in, path, &text)
}

fn classify_status(
    status: u16,
    rate_limited: bool,
    reset_in: Option<i64>,
    path: &str,
    body: &str,
) -> StoreError {
    match status {
        401 => StoreError::AuthFailure("Invalid GitHub token".to_string()),
        403 | 429 if rate_limited || status == 429 => StoreError::Transient(format!(
            "GitHub rate limited, retry after {} seconds",
            reset_in.unwrap_or(60)
        )),
        403 => StoreError::AuthFailure(format!("Access to {} denied", path)),
        404 => StoreError::NotFound(path.to_string()),
        409 => StoreError::Conflict(path.to_string()),
        500..=599 => StoreError::Transient(format!("GitHub API returned {} for {}", status, path)),
        _ => StoreError::InvalidResponse(format!(
            "GitHub API returned {} for {}: {}",
            status, path, body
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}
