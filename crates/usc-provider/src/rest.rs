//! Shared REST plumbing behind the GitHub and Gitea [`crate::Provider`]
//! implementations — they differ only in URL shape and auth header
//! composition, so that is the only thing [`HostConfig`] varies.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use usc_rate_limiter::RateLimiter;
use usc_types::{CoreError, Modality, RepoRef, Result};

use crate::token_source::TokenSource;
use crate::types::{FileContent, FileEntry, PutResult};
use crate::Provider;

/// Upper bound for single-file operations.
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for directory listings.
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// What differs between git hosting backends behind the same REST shape.
pub trait HostConfig: Send + Sync {
    /// API origin, e.g. `https://api.github.com`.
    fn api_base(&self) -> &str;
    /// Attach this host's bearer-token header convention to a request.
    fn authorize(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.bearer_auth(token)
    }
    /// Which [`usc_types::RepoHost`] a repo created through this config
    /// belongs to.
    fn repo_host(&self) -> usc_types::RepoHost;
}

/// GitHub.com's API origin, used by [`GitHubHost::default`].
const GITHUB_DOTCOM_API: &str = "https://api.github.com";

/// GitHub.com or a GitHub Enterprise instance, identified by its API
/// origin (defaults to GitHub.com itself).
#[derive(Debug, Clone)]
pub struct GitHubHost {
    api_base: String,
}

impl Default for GitHubHost {
    fn default() -> Self {
        Self { api_base: GITHUB_DOTCOM_API.to_string() }
    }
}

impl GitHubHost {
    /// Point at a specific API origin (GitHub Enterprise, or a test
    /// double).
    pub fn new(api_base: impl Into<String>) -> Self {
        Self { api_base: api_base.into() }
    }
}

impl HostConfig for GitHubHost {
    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn repo_host(&self) -> usc_types::RepoHost {
        usc_types::RepoHost::GitHub
    }
}

/// A Gitea instance, identified by its own API origin.
#[derive(Debug, Clone)]
pub struct GiteaHost {
    api_base: String,
}

impl GiteaHost {
    /// Build a Gitea host config pointed at `api_base` (e.g.
    /// `https://gitea.example.invalid/api/v1`).
    pub fn new(api_base: impl Into<String>) -> Self {
        Self { api_base: api_base.into() }
    }
}

impl HostConfig for GiteaHost {
    fn api_base(&self) -> &str {
        &self.api_base
    }

    fn authorize(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("token {token}"))
    }

    fn repo_host(&self) -> usc_types::RepoHost {
        usc_types::RepoHost::Gitea
    }
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    sha: String,
    size: u64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    content: String,
    sha: String,
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsResponseEntry,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponseEntry {
    sha: String,
}

#[derive(Debug, Serialize)]
struct DeleteContentsBody<'a> {
    message: &'a str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
    private: bool,
}

#[derive(Debug, Deserialize)]
struct CreateRepoResponse {
    name: String,
    owner: RepoOwner,
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

/// A [`Provider`] over any [`HostConfig`] sharing the github-style contents
/// API shape.
pub struct RestGitProvider<H: HostConfig> {
    client: Client,
    host: H,
    owner: String,
    repo: String,
    modality: Modality,
    token_source: Arc<dyn TokenSource>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl<H: HostConfig> RestGitProvider<H> {
    /// Build a provider for `owner/repo`, authenticating as `modality`.
    pub fn new(
        host: H,
        owner: impl Into<String>,
        repo: impl Into<String>,
        modality: Modality,
        token_source: Arc<dyn TokenSource>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            client: Client::builder()
                .user_agent("universe-sync-core/0.1")
                .build()
                .expect("reqwest client always builds with the default TLS backend"),
            host,
            owner: owner.into(),
            repo: repo.into(),
            modality,
            token_source,
            rate_limiter,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/contents/{}", self.host.api_base(), self.owner, self.repo, path)
    }

    async fn authorized_request(
        &self,
        method: reqwest::Method,
        url: &str,
        timeout: Duration,
    ) -> Result<reqwest::RequestBuilder> {
        let deadline = Utc::now() + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(30));
        self.rate_limiter
            .acquire(self.modality, Some(deadline))
            .await
            .map_err(|_| CoreError::RateLimited { retry_after: timeout })?;

        let token = self.token_source.get_token(self.modality).await?;
        let builder = self.client.request(method, url).timeout(timeout);
        Ok(self.host.authorize(builder, &token))
    }

    fn map_status(status: StatusCode, body: String) -> CoreError {
        match status {
            StatusCode::UNAUTHORIZED => CoreError::Unauthorized,
            StatusCode::FORBIDDEN => CoreError::Forbidden(body),
            StatusCode::NOT_FOUND => CoreError::NotFound(body),
            StatusCode::CONFLICT => CoreError::Conflict,
            StatusCode::TOO_MANY_REQUESTS => CoreError::RateLimited { retry_after: Duration::from_secs(60) },
            s if s.is_server_error() => CoreError::Server(body),
            s if s.as_u16() == 422 => CoreError::BadRequest(body),
            _ => CoreError::Server(format!("unexpected status {status}: {body}")),
        }
    }
}

#[async_trait::async_trait]
impl<H: HostConfig> Provider for RestGitProvider<H> {
    async fn is_available(&self) -> bool {
        let url = format!("{}/user", self.host.api_base());
        match self.authorized_request(reqwest::Method::GET, &url, FILE_OP_TIMEOUT).await {
            Ok(builder) => builder.send().await.map(|r| r.status().is_success()).unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>> {
        let url = self.contents_url(path);
        let response = self
            .authorized_request(reqwest::Method::GET, &url, LIST_TIMEOUT)
            .await?
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let entries: Vec<ContentsEntry> = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "file")
            .map(|e| FileEntry { name: e.name, sha: e.sha, size: e.size })
            .collect())
    }

    async fn list_directories(&self, path: &str) -> Result<Vec<String>> {
        let url = self.contents_url(path);
        let response = self
            .authorized_request(reqwest::Method::GET, &url, LIST_TIMEOUT)
            .await?
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let entries: Vec<ContentsEntry> = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        Ok(entries.into_iter().filter(|e| e.kind == "dir").map(|e| e.name).collect())
    }

    async fn get_file(&self, path: &str) -> Result<FileContent> {
        let url = self.contents_url(path);
        let response = self
            .authorized_request(reqwest::Method::GET, &url, FILE_OP_TIMEOUT)
            .await?
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let file: ContentsFile = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        if file.encoding != "base64" {
            return Err(CoreError::Server(format!("unsupported content encoding '{}'", file.encoding)));
        }
        let cleaned: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| CoreError::Server(format!("invalid base64 content: {e}")))?;

        Ok(FileContent { bytes, sha: file.sha })
    }

    async fn put_file(&self, path: &str, bytes: Vec<u8>, expected_sha: Option<&str>) -> Result<PutResult> {
        let url = self.contents_url(path);
        let body = PutContentsBody {
            message: "update via Universe Synchronization Core",
            content: base64::engine::general_purpose::STANDARD.encode(&bytes),
            sha: expected_sha,
        };

        let response = self
            .authorized_request(reqwest::Method::PUT, &url, FILE_OP_TIMEOUT)
            .await?
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let response_body = response.text().await.unwrap_or_default();
            if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
                debug!(path, "put_file sha mismatch, surfacing as conflict");
                return Err(CoreError::Conflict);
            }
            return Err(Self::map_status(status, response_body));
        }

        let parsed: PutContentsResponse = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        Ok(PutResult { new_sha: parsed.content.sha })
    }

    async fn delete_file(&self, path: &str, expected_sha: Option<&str>) -> Result<()> {
        let Some(sha) = expected_sha else {
            return Err(CoreError::BadRequest("delete_file requires expected_sha on this host".into()));
        };
        let url = self.contents_url(path);
        let body = DeleteContentsBody { message: "delete via Universe Synchronization Core", sha };

        let response = self
            .authorized_request(reqwest::Method::DELETE, &url, FILE_OP_TIMEOUT)
            .await?
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let response_body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, response_body));
        }
        Ok(())
    }

    async fn create_repo(&self, name: &str, private: bool) -> Result<RepoRef> {
        if self.modality == Modality::AppInstallation {
            return Err(CoreError::Forbidden(
                "installation credentials cannot create repositories".into(),
            ));
        }

        let url = format!("{}/user/repos", self.host.api_base());
        let body = CreateRepoBody { name, private };
        let response = self
            .authorized_request(reqwest::Method::POST, &url, FILE_OP_TIMEOUT)
            .await?
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let response_body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, response_body));
        }

        let created: CreateRepoResponse = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        Ok(RepoRef {
            host: self.host.repo_host(),
            owner: created.owner.login,
            repo: created.name,
        })
    }

    async fn initialize_empty_repo(&self) -> Result<()> {
        match self.get_file("schema/README.md").await {
            Ok(_) => {
                debug!("repo already initialized, initialize_empty_repo is a no-op");
                Ok(())
            }
            Err(CoreError::NotFound(_)) => {
                self.put_file(
                    "schema/README.md",
                    b"# Universe schema\n\nManaged by the Universe Synchronization Core.\n".to_vec(),
                    None,
                )
                .await
                .map(|_| ())
            }
            Err(e) => {
                warn!(error = %e, "could not determine whether repo is already initialized");
                Err(e)
            }
        }
    }
}
