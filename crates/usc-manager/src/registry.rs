//! The durable universe registry.
//!
//! Mutation is serialized behind the owning [`Registry`]'s `DashMap` entry
//! API so reads observe a consistent snapshot, and every write is
//! persisted to `usc-store` so the registry survives a process restart —
//! every other durable concept in this system goes through a store, so
//! the registry does too.

use std::sync::Arc;

use dashmap::DashMap;
use usc_store::{put_json, Store};
use usc_types::{CoreError, Result, Slug, Universe};

const REGISTRY_KEY_PREFIX: &str = "universe:";

fn storage_key(slug: &Slug) -> String {
    format!("{REGISTRY_KEY_PREFIX}{slug}")
}

/// In-memory registry of every known [`Universe`], mirrored to a durable
/// [`Store`] on every mutation.
pub struct Registry<St: Store + 'static> {
    store: Arc<St>,
    universes: DashMap<Slug, Universe>,
}

impl<St: Store + 'static> Registry<St> {
    /// Build an empty registry. Call [`Self::load`] once at startup to
    /// repopulate it from the durable store.
    pub fn new(store: Arc<St>) -> Self {
        Self {
            store,
            universes: DashMap::new(),
        }
    }

    /// Repopulate the in-memory registry from every `universe:*` entry the
    /// store holds.
    pub async fn load(&self) -> Result<()> {
        let keys = self
            .store
            .list_keys(REGISTRY_KEY_PREFIX)
            .await
            .map_err(|e| CoreError::Server(e.to_string()))?;
        for key in keys {
            let universe: Option<Universe> = usc_store::get_json(self.store.as_ref(), &key)
                .await
                .map_err(|e| CoreError::Server(e.to_string()))?;
            if let Some(universe) = universe {
                self.universes.insert(universe.slug.clone(), universe);
            }
        }
        Ok(())
    }

    /// Insert or replace a universe, validating its invariants and
    /// persisting it. Does not check registry-wide invariants (slug
    /// uniqueness is guaranteed by construction — `DashMap::insert`
    /// replaces, it never duplicates a key).
    pub async fn put(&self, universe: Universe) -> Result<()> {
        universe.validate_invariants()?;
        put_json(self.store.as_ref(), &storage_key(&universe.slug), &universe)
            .await
            .map_err(|e| CoreError::Server(e.to_string()))?;
        self.universes.insert(universe.slug.clone(), universe);
        Ok(())
    }

    /// Fetch a snapshot of one universe.
    pub fn get(&self, slug: &Slug) -> Option<Universe> {
        self.universes.get(slug).map(|e| e.value().clone())
    }

    /// Snapshot of every universe currently registered.
    pub fn all(&self) -> Vec<Universe> {
        self.universes.iter().map(|e| e.value().clone()).collect()
    }

    /// How many universes are registered. Used by [`Self::remove`] to
    /// enforce "refuses if only one universe remains".
    pub fn len(&self) -> usize {
        self.universes.len()
    }

    /// Whether the registry holds no universes.
    pub fn is_empty(&self) -> bool {
        self.universes.is_empty()
    }

    /// Remove a universe from both the in-memory map and the durable
    /// store. Callers enforce the "at least one universe must remain"
    /// invariant before calling this.
    pub async fn remove(&self, slug: &Slug) -> Result<()> {
        self.store
            .delete(&storage_key(slug))
            .await
            .map_err(|e| CoreError::Server(e.to_string()))?;
        self.universes.remove(slug);
        Ok(())
    }

    /// Whether any registered universe already uses `slug`.
    pub fn contains(&self, slug: &Slug) -> bool {
        self.universes.contains_key(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usc_store::MemoryStore;
    use usc_types::{GitRepo, LocalFile, Metadata, SourceOfTruth};

    fn sample(slug: &str) -> Universe {
        Universe {
            slug: Slug::new(slug).unwrap(),
            name: slug.to_string(),
            source_of_truth: SourceOfTruth::Local,
            local_file: LocalFile { enabled: true, path: format!("{slug}.redstring"), handle: None },
            git_repo: GitRepo::default(),
            sources: vec![],
            metadata: Metadata::default(),
        }
    }

    #[tokio::test]
    async fn put_then_load_from_a_fresh_registry_recovers_state() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(store.clone());
        registry.put(sample("alpha")).await.unwrap();

        let reloaded = Registry::new(store);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get(&Slug::new("alpha").unwrap()).is_some());
    }

    #[tokio::test]
    async fn put_rejects_invariant_violation_and_does_not_mutate() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(store);
        let mut bad = sample("alpha");
        bad.local_file.enabled = false;
        bad.git_repo.enabled = false;

        assert!(registry.put(bad).await.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn remove_drops_from_both_map_and_store() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(store);
        registry.put(sample("alpha")).await.unwrap();
        registry.remove(&Slug::new("alpha").unwrap()).await.unwrap();
        assert!(registry.is_empty());
    }
}
