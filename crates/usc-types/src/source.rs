//! Auxiliary `Source` descriptors.

use serde::{Deserialize, Serialize};

use crate::universe::RepoRef;

/// The kind of auxiliary source attached to a universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// An additional GitHub repository mirror.
    GitHub,
    /// An additional Gitea repository mirror.
    Gitea,
    /// A cache-or-read-through URL. Never written.
    Url,
    /// An additional local mirror path.
    Local,
}

/// A read-only (except when promoted to primary) auxiliary backing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable identifier within the owning universe's `sources` list.
    pub id: String,
    /// Kind of source.
    pub kind: SourceKind,
    /// Whether this source is currently active.
    pub enabled: bool,
    /// Human-readable label.
    pub name: String,
    /// Owner, for `github`/`gitea` sources.
    pub owner: Option<String>,
    /// Repository name, for `github`/`gitea` sources.
    pub repo: Option<String>,
    /// URL, for `url` sources.
    pub url: Option<String>,
}

impl Source {
    /// Whether this source describes the same `(owner, repo)` as `repo_ref`.
    pub fn matches_repo(&self, repo_ref: &RepoRef) -> bool {
        self.owner.as_deref() == Some(repo_ref.owner.as_str())
            && self.repo.as_deref() == Some(repo_ref.repo.as_str())
    }

    /// `type=url` sources are cache-or-read-through and are never written;
    /// every other non-primary source is read-only except when explicitly
    /// promoted to primary by the Manager.
    pub fn is_writable(&self) -> bool {
        !matches!(self.kind, SourceKind::Url)
    }
}
