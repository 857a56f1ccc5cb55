//! Discovering universes already living in a remote repository, and linking
//! one of them into the local registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use usc_codec::DocumentStats;
use usc_provider::Provider;
use usc_types::{
    CoreError, GitRepo, LocalFile, Metadata, RepoRef, Result, Slug, SourceOfTruth, Universe,
};

/// One universe found while walking `universes/*/` in a remote repo,
/// before it has been linked into the local registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUniverse {
    /// The slug read from the discovered document's `universe.slug`.
    pub slug: Slug,
    /// The display name read from the document.
    pub name: String,
    /// Which repository this was found in.
    pub repo: RepoRef,
    /// Content sha of the `.redstring` file at discovery time.
    pub sha: String,
    /// Cheap stats extracted without a full decode.
    pub stats: DocumentStats,
}

/// Walk `{universe_folder}/*/` in `provider`'s repo, reading each
/// `*.redstring` document found and returning its identity + stats. Two
/// discovered universes may legitimately share a `slug` if they live in
/// different repos — both are returned; it is [`link`] that decides which
/// (if any) to bind locally.
pub async fn discover_in_repo(
    provider: &dyn Provider,
    repo: RepoRef,
    universe_folder: &str,
) -> Result<Vec<DiscoveredUniverse>> {
    let folder_names = match provider.list_directories(universe_folder).await {
        Ok(names) => names,
        Err(CoreError::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut discovered = Vec::with_capacity(folder_names.len());
    for folder in folder_names {
        let doc_path = format!("{universe_folder}/{folder}/{folder}.redstring");
        let file = match provider.get_file(&doc_path).await {
            Ok(file) => file,
            Err(CoreError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };

        let stats = usc_codec::extract_stats(&file.bytes)
            .map_err(|e| CoreError::Server(format!("'{doc_path}' is not a valid document: {e}")))?;
        let value: serde_json::Value = serde_json::from_slice(&file.bytes)
            .map_err(|e| CoreError::Server(format!("'{doc_path}' is not valid JSON: {e}")))?;
        let slug_str = value
            .get("universe")
            .and_then(|u| u.get("slug"))
            .and_then(|s| s.as_str())
            .unwrap_or(&folder);
        let name = value
            .get("universe")
            .and_then(|u| u.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or(&folder)
            .to_string();

        discovered.push(DiscoveredUniverse {
            slug: Slug::new(slug_str)?,
            name,
            repo: repo.clone(),
            sha: file.sha,
            stats,
        });
    }

    Ok(discovered)
}

/// Build the local [`Universe`] entry that binds `discovered` as a
/// primary git-authoritative universe. Does not touch the registry itself
/// — callers persist it through [`crate::UniverseManager::link_discovered`]
/// so the slug-uniqueness check happens in one place.
pub fn link(discovered: &DiscoveredUniverse, universe_folder: &str, schema_path: &str) -> Universe {
    Universe {
        slug: discovered.slug.clone(),
        name: discovered.name.clone(),
        source_of_truth: SourceOfTruth::Git,
        local_file: LocalFile::default(),
        git_repo: GitRepo {
            enabled: true,
            linked_repo: Some(discovered.repo.clone()),
            universe_folder: universe_folder.to_string(),
            universe_file: format!("{}.redstring", discovered.slug),
            schema_path: schema_path.to_string(),
        },
        sources: vec![],
        metadata: Metadata {
            node_count: discovered.stats.node_count,
            graph_count: discovered.stats.graph_count,
            edge_count: discovered.stats.edge_count,
            last_opened_at: None,
            last_saved_at: None,
        },
    }
}

/// Placeholder type alias kept for call sites that only need the provider
/// capability, not a concrete implementation — avoids every caller writing
/// out `Arc<dyn Provider>` themselves.
pub type DynProvider = Arc<dyn Provider>;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use usc_provider::{FileContent, FileEntry, PutResult};
    use usc_types::RepoHost;

    struct FakeRepo {
        dirs: Vec<&'static str>,
        files: std::collections::HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Provider for FakeRepo {
        async fn is_available(&self) -> bool {
            true
        }
        async fn list_files(&self, _path: &str) -> Result<Vec<FileEntry>> {
            Ok(vec![])
        }
        async fn list_directories(&self, _path: &str) -> Result<Vec<String>> {
            Ok(self.dirs.iter().map(|s| s.to_string()).collect())
        }
        async fn get_file(&self, path: &str) -> Result<FileContent> {
            self.files
                .get(path)
                .cloned()
                .map(|bytes| FileContent { bytes, sha: "sha-1".into() })
                .ok_or_else(|| CoreError::NotFound(path.to_string()))
        }
        async fn put_file(&self, _path: &str, _bytes: Vec<u8>, _expected_sha: Option<&str>) -> Result<PutResult> {
            unimplemented!()
        }
        async fn delete_file(&self, _path: &str, _expected_sha: Option<&str>) -> Result<()> {
            unimplemented!()
        }
        async fn create_repo(&self, _name: &str, _private: bool) -> Result<RepoRef> {
            unimplemented!()
        }
        async fn initialize_empty_repo(&self) -> Result<()> {
            unimplemented!()
        }
    }

    fn sample_document(slug: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "formatVersion": 1,
            "universe": {"slug": slug, "name": "Alpha", "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"},
            "prototypeSpace": {"p1": {}},
            "spatialGraphs": {},
            "edges": {},
            "openGraphIds": [],
            "activeGraphId": null,
            "metadata": {"nodeCount": 1, "graphCount": 0, "edgeCount": 0}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn discovers_every_universe_folder_with_a_readable_document() {
        let mut files = std::collections::HashMap::new();
        files.insert("universes/alpha/alpha.redstring".to_string(), sample_document("alpha"));
        let provider = FakeRepo { dirs: vec!["alpha", "ghost"], files };

        let repo = RepoRef { host: RepoHost::GitHub, owner: "o".into(), repo: "r".into() };
        let found = discover_in_repo(&provider, repo, "universes").await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug.as_str(), "alpha");
        assert_eq!(found[0].stats.node_count, 1);
    }

    #[test]
    fn link_builds_a_git_authoritative_universe_bound_to_the_discovery() {
        let repo = RepoRef { host: RepoHost::GitHub, owner: "o".into(), repo: "r".into() };
        let discovered = DiscoveredUniverse {
            slug: Slug::new("alpha").unwrap(),
            name: "Alpha".into(),
            repo: repo.clone(),
            sha: "sha-1".into(),
            stats: DocumentStats { node_count: 1, graph_count: 0, edge_count: 0 },
        };

        let universe = link(&discovered, "universes", "schema");
        assert_eq!(universe.source_of_truth, SourceOfTruth::Git);
        assert_eq!(universe.git_repo.linked_repo, Some(repo));
        assert!(universe.validate_invariants().is_ok());
    }
}
