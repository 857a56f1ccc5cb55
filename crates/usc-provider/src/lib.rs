#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-provider** – Remote git provider capability. A [`Provider`] is the
//! only thing in this system that speaks HTTP to a git host. It does not
//! retry — that policy lives in the sync engine — and it does not cache
//! tokens (it asks a [`TokenSource`] — backed by `usc-auth` — before every
//! call) or bypass the [`usc_rate_limiter::RateLimiter`] gate.

use async_trait::async_trait;
use usc_types::{CoreError, RepoRef, Result};

pub mod rest;
pub mod token_source;
pub mod types;

pub use rest::{GiteaHost, GitHubHost, HostConfig, RestGitProvider};
pub use token_source::TokenSource;
pub use types::{FileContent, FileEntry, PutResult};

/// A git hosting capability: list, read, write, and delete files in one
/// repository, plus repo lifecycle.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Cheap reachability + auth probe.
    async fn is_available(&self) -> bool;

    /// List files directly under `path`.
    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// List subdirectory names directly under `path` (the Universe Manager's
    /// `discover_in_repo` walks `universes/*/` this way). Default reports
    /// unsupported; concrete REST providers override it with a real
    /// directory listing.
    async fn list_directories(&self, _path: &str) -> Result<Vec<String>> {
        Err(CoreError::NotSupported(
            "list_directories is not implemented by this provider".into(),
        ))
    }

    /// Fetch a file's bytes and current sha.
    async fn get_file(&self, path: &str) -> Result<FileContent>;

    /// Write `bytes` to `path`. If `expected_sha` is given and does not
    /// match the host's current sha, fails with
    /// [`usc_types::CoreError::Conflict`].
    async fn put_file(&self, path: &str, bytes: Vec<u8>, expected_sha: Option<&str>) -> Result<PutResult>;

    /// Delete `path`.
    async fn delete_file(&self, path: &str, expected_sha: Option<&str>) -> Result<()>;

    /// Create a new repository. Fails with
    /// [`usc_types::CoreError::Forbidden`] when the credential modality
    /// cannot create repositories (e.g. an installation token).
    async fn create_repo(&self, name: &str, private: bool) -> Result<RepoRef>;

    /// Ensure the repo has a minimal schema folder and README. Idempotent.
    async fn initialize_empty_repo(&self) -> Result<()>;
}

/// A [`Provider`] talking to GitHub.com or GitHub Enterprise.
pub type GitHubProvider = RestGitProvider<GitHubHost>;

/// A [`Provider`] talking to a Gitea instance.
pub type GiteaProvider = RestGitProvider<GiteaHost>;
