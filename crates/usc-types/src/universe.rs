//! The `Universe` data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::source::Source;

/// A stable, URL-safe identifier. Immutable after creation.
///
/// `Slug` enforces its shape once, at construction, and is never
/// re-validated by code that already holds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Build a slug, rejecting anything that is not lowercase
    /// alphanumerics and hyphens.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !raw.starts_with('-')
            && !raw.ends_with('-');
        if !valid {
            return Err(CoreError::BadRequest(format!(
                "'{raw}' is not a valid slug (lowercase alphanumerics and hyphens only)"
            )));
        }
        Ok(Self(raw))
    }

    /// Borrow the slug as a plain string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which backing wins on conflict for a given universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOfTruth {
    /// The local file is authoritative.
    Local,
    /// The linked git repository is authoritative.
    Git,
}

/// A reference to a specific remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Which provider hosts this repository.
    pub host: RepoHost,
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

/// The concrete git hosting provider behind a [`RepoRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoHost {
    /// GitHub.com or GitHub Enterprise.
    GitHub,
    /// A Gitea instance.
    Gitea,
}

/// Local file backing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalFile {
    /// Whether this backing is in use.
    pub enabled: bool,
    /// User-facing path the file was last written to (advisory; the
    /// authoritative reference is the opaque `handle`).
    pub path: String,
    /// Opaque handle obtained from `usc-local-file`, serialized as an
    /// identifier the platform can later resolve back to a live handle.
    pub handle: Option<String>,
}

/// Git repository backing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRepo {
    /// Whether this backing is in use.
    pub enabled: bool,
    /// The primary linked repository, once linked.
    pub linked_repo: Option<RepoRef>,
    /// Folder under the repo root holding `universes/{slug}/…`.
    pub universe_folder: String,
    /// The `.redstring` filename within `universe_folder/{slug}/`.
    pub universe_file: String,
    /// Folder holding optional additional schema files.
    pub schema_path: String,
}

impl Default for GitRepo {
    fn default() -> Self {
        Self {
            enabled: false,
            linked_repo: None,
            universe_folder: "universes".to_string(),
            universe_file: String::new(),
            schema_path: "schema".to_string(),
        }
    }
}

/// Derived, non-authoritative counters surfaced to the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Number of node prototypes in the document.
    pub node_count: u64,
    /// Number of spatial graphs in the document.
    pub graph_count: u64,
    /// Number of edges in the document.
    pub edge_count: u64,
    /// When the universe was last made active.
    pub last_opened_at: Option<DateTime<Utc>>,
    /// When the universe was last successfully saved to any backing.
    pub last_saved_at: Option<DateTime<Utc>>,
}

/// One logical knowledge graph, persisted as a single document, with zero or
/// more backings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    /// Stable identifier, unique, URL-safe. Immutable after creation.
    pub slug: Slug,
    /// Human label; editable; drives default filenames but never `slug`.
    pub name: String,
    /// Authoritative side for conflicts.
    pub source_of_truth: SourceOfTruth,
    /// Local file backing.
    pub local_file: LocalFile,
    /// Git repository backing.
    pub git_repo: GitRepo,
    /// Auxiliary, read-only (except-when-promoted) source descriptors.
    pub sources: Vec<Source>,
    /// Derived counters.
    pub metadata: Metadata,
}

impl Universe {
    /// Validate every invariant checkable from the struct alone
    /// (registry-wide invariants like slug uniqueness are the Manager's
    /// responsibility).
    pub fn validate_invariants(&self) -> Result<()> {
        if !self.local_file.enabled && !self.git_repo.enabled {
            return Err(CoreError::InvariantViolation(
                "at least one of localFile.enabled or gitRepo.enabled must be true".into(),
            ));
        }
        if self.source_of_truth == SourceOfTruth::Git
            && (!self.git_repo.enabled || self.git_repo.linked_repo.is_none())
        {
            return Err(CoreError::InvariantViolation(
                "sourceOfTruth=git requires gitRepo.enabled and a linkedRepo".into(),
            ));
        }
        if let Some(primary) = &self.git_repo.linked_repo {
            let primary_matches = |s: &Source| {
                s.matches_repo(primary)
            };
            if self.sources.iter().filter(|s| primary_matches(s)).count() > 1 {
                return Err(CoreError::InvariantViolation(
                    "sources may contain at most one entry matching gitRepo.linkedRepo".into(),
                ));
            }
        }
        Ok(())
    }

    /// Force git-only mode: the host platform cannot grant durable local
    /// file access, so every universe's source of truth collapses to git.
    /// This is an explicit lifecycle-boundary transition, never a silent
    /// background mutation.
    pub fn force_git_only(&mut self) {
        self.source_of_truth = SourceOfTruth::Git;
        self.local_file.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    fn base_universe() -> Universe {
        Universe {
            slug: Slug::new("alpha").unwrap(),
            name: "Alpha".into(),
            source_of_truth: SourceOfTruth::Local,
            local_file: LocalFile {
                enabled: true,
                path: "alpha.redstring".into(),
                handle: None,
            },
            git_repo: GitRepo::default(),
            sources: vec![],
            metadata: Metadata::default(),
        }
    }

    #[test]
    fn rejects_slug_with_uppercase_or_symbols() {
        assert!(Slug::new("Alpha").is_err());
        assert!(Slug::new("alpha_beta").is_err());
        assert!(Slug::new("-alpha").is_err());
        assert!(Slug::new("alpha").is_ok());
    }

    #[test]
    fn requires_at_least_one_enabled_backing() {
        let mut u = base_universe();
        u.local_file.enabled = false;
        u.git_repo.enabled = false;
        assert!(u.validate_invariants().is_err());
    }

    #[test]
    fn git_authoritative_requires_linked_repo() {
        let mut u = base_universe();
        u.source_of_truth = SourceOfTruth::Git;
        u.git_repo.enabled = true;
        u.git_repo.linked_repo = None;
        assert!(u.validate_invariants().is_err());

        u.git_repo.linked_repo = Some(RepoRef {
            host: RepoHost::GitHub,
            owner: "o".into(),
            repo: "r".into(),
        });
        assert!(u.validate_invariants().is_ok());
    }

    #[test]
    fn at_most_one_source_matches_primary_repo() {
        let mut u = base_universe();
        let primary = RepoRef {
            host: RepoHost::GitHub,
            owner: "o".into(),
            repo: "r".into(),
        };
        u.git_repo.enabled = true;
        u.git_repo.linked_repo = Some(primary.clone());
        u.sources = vec![
            Source {
                id: "s1".into(),
                kind: SourceKind::GitHub,
                enabled: true,
                name: "mirror".into(),
                owner: Some("o".into()),
                repo: Some("r".into()),
                url: None,
            },
            Source {
                id: "s2".into(),
                kind: SourceKind::GitHub,
                enabled: true,
                name: "mirror-dup".into(),
                owner: Some("o".into()),
                repo: Some("r".into()),
                url: None,
            },
        ];
        assert!(u.validate_invariants().is_err());
    }

    #[test]
    fn force_git_only_flips_truth_and_disables_local() {
        let mut u = base_universe();
        u.git_repo.enabled = true;
        u.git_repo.linked_repo = Some(RepoRef {
            host: RepoHost::GitHub,
            owner: "o".into(),
            repo: "r".into(),
        });
        u.force_git_only();
        assert_eq!(u.source_of_truth, SourceOfTruth::Git);
        assert!(!u.local_file.enabled);
    }
}
