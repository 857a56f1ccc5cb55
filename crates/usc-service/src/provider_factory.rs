//! Wires `usc-manager`'s [`ProviderFactory`] seam to the real REST hosts,
//! the one place this binary picks GitHub vs. Gitea.

use std::sync::Arc;

use async_trait::async_trait;

use usc_manager::ProviderFactory;
use usc_provider::{FileContent, FileEntry, GitHubHost, GiteaHost, Provider, PutResult, RestGitProvider, TokenSource};
use usc_rate_limiter::RateLimiter;
use usc_types::{CoreError, Modality, RepoHost, RepoRef, Result};

/// Builds [`RestGitProvider`]s against the real GitHub/Gitea contents API.
pub struct RestProviderFactory {
    token_source: Arc<dyn TokenSource>,
    rate_limiter: Arc<dyn RateLimiter>,
    gitea_api_base: Option<String>,
}

impl RestProviderFactory {
    /// Build a factory. `gitea_api_base` is `None` when no Gitea instance
    /// has been configured — linking a Gitea repo then fails cleanly
    /// through [`UnconfiguredProvider`] instead of this call panicking.
    pub fn new(token_source: Arc<dyn TokenSource>, rate_limiter: Arc<dyn RateLimiter>, gitea_api_base: Option<String>) -> Self {
        Self { token_source, rate_limiter, gitea_api_base }
    }
}

impl ProviderFactory for RestProviderFactory {
    fn build(&self, repo: &RepoRef, modality: Modality) -> Arc<dyn Provider> {
        match repo.host {
            RepoHost::GitHub => Arc::new(RestGitProvider::new(
                GitHubHost::default(),
                repo.owner.clone(),
                repo.repo.clone(),
                modality,
                self.token_source.clone(),
                self.rate_limiter.clone(),
            )),
            RepoHost::Gitea => match &self.gitea_api_base {
                Some(api_base) => Arc::new(RestGitProvider::new(
                    GiteaHost::new(api_base.clone()),
                    repo.owner.clone(),
                    repo.repo.clone(),
                    modality,
                    self.token_source.clone(),
                    self.rate_limiter.clone(),
                )),
                None => Arc::new(UnconfiguredProvider),
            },
        }
    }
}

/// Stands in for a provider this process has no host configuration for.
/// Every call fails with [`CoreError::NotSupported`] rather than this
/// factory panicking at repo-link time.
struct UnconfiguredProvider;

#[async_trait]
impl Provider for UnconfiguredProvider {
    async fn is_available(&self) -> bool {
        false
    }
    async fn list_files(&self, _path: &str) -> Result<Vec<FileEntry>> {
        Err(unconfigured())
    }
    async fn get_file(&self, _path: &str) -> Result<FileContent> {
        Err(unconfigured())
    }
    async fn put_file(&self, _path: &str, _bytes: Vec<u8>, _expected_sha: Option<&str>) -> Result<PutResult> {
        Err(unconfigured())
    }
    async fn delete_file(&self, _path: &str, _expected_sha: Option<&str>) -> Result<()> {
        Err(unconfigured())
    }
    async fn create_repo(&self, _name: &str, _private: bool) -> Result<RepoRef> {
        Err(unconfigured())
    }
    async fn initialize_empty_repo(&self) -> Result<()> {
        Err(unconfigured())
    }
}

fn unconfigured() -> CoreError {
    CoreError::NotSupported("no Gitea host is configured for this process".into())
}
