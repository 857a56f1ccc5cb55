#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-manager** – Universe registry, active-universe state machine, and
//! the Save/Startup coordinators. [`UniverseManager`] is the sole owner of
//! every [`Universe`] and every running [`EngineHandle`] — Engines, file
//! handles, and coordinators are borrowed references obtained through it,
//! never reached into directly.

pub mod discover;
pub mod provider_factory;
pub mod registry;
pub mod save_coordinator;
pub mod startup_coordinator;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use usc_bus::StatusBus;
use usc_codec::{DocumentUniverseInfo, GraphStoreState, RedstringDocument};
use usc_local_file::{Handle, LocalFileBacking};
use usc_provider::{Provider, TokenSource};
use usc_rate_limiter::RateLimiter;
use usc_store::Store;
use usc_sync_engine::{EngineConfig, EngineHandle};
use usc_types::{
    CoreError, EventSource, GitRepo, LocalFile, Metadata, Modality, RepoRef, Result, Slug,
    SourceOfTruth, StatusEvent, StatusKind, Universe,
};

pub use discover::{discover_in_repo, DiscoveredUniverse};
pub use provider_factory::ProviderFactory;
pub use registry::Registry;
pub use save_coordinator::{is_error_hold, SaveCoordinator, SaveRequest};
pub use startup_coordinator::StartupCoordinator;

/// Options accepted by [`UniverseManager::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Which side is authoritative for conflicts. Defaults to `git` if a
    /// repo is linked at creation time, otherwise `local`.
    pub source_of_truth: Option<SourceOfTruth>,
    /// Link a remote repository immediately. When [`Self::create_remote_repo`]
    /// is also set, this names the owner/repo to create rather than an
    /// already-existing one to link.
    pub linked_repo: Option<RepoRef>,
    /// Enable the local file backing (a handle is picked lazily through
    /// the platform's file picker, not at creation time).
    pub enable_local_file: bool,
    /// Create `linked_repo` as a brand-new remote repository before linking
    /// it, rather than linking one that already exists.
    pub create_remote_repo: Option<CreateRemoteRepo>,
}

/// Parameters for creating the linked repo itself, rather than linking one
/// that already exists.
#[derive(Debug, Clone)]
pub struct CreateRemoteRepo {
    /// Whether the created repository should be private.
    pub private: bool,
}

/// A validated, partial update to apply to an existing [`Universe`]. Only
/// the fields set to `Some` are changed; `slug` is never part of a patch.
#[derive(Debug, Clone, Default)]
pub struct UniversePatch {
    /// New display name.
    pub name: Option<String>,
    /// New authoritative side.
    pub source_of_truth: Option<SourceOfTruth>,
    /// Enable/disable the local file backing.
    pub local_file_enabled: Option<bool>,
}

/// Outcome of [`UniverseManager::switch_active`].
pub struct SwitchOutcome {
    /// The graph state now active in memory for the incoming universe.
    pub store_state: GraphStoreState,
}

/// Per-universe runtime collaborators the Manager hands to a freshly spawned
/// `usc_sync_engine::Engine`.
pub struct EngineDeps {
    /// Builds the `Provider` for a universe's linked repo.
    pub provider_factory: Arc<dyn ProviderFactory>,
    /// Process-wide rate limiter gate.
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Process-wide token source (backed by `usc-auth::PersistentAuth`).
    pub token_source: Arc<dyn TokenSource>,
    /// Local file backing used for the mirror side of a save and for
    /// reading a universe's local state on `switch_active`.
    pub local_backing: Arc<dyn LocalFileBacking>,
}

/// Owns the universe registry and the active-universe state machine.
/// Delegates save de-duplication to [`SaveCoordinator`] and duplicate-Engine
/// prevention to [`StartupCoordinator`].
pub struct UniverseManager<St: Store + 'static> {
    registry: Registry<St>,
    engines: DashMap<Slug, EngineHandle>,
    save_coordinator: SaveCoordinator,
    startup_coordinator: StartupCoordinator,
    bus: Arc<dyn StatusBus>,
    deps: EngineDeps,
    active: RwLock<Option<Slug>>,
}

/// Bounded wait for an in-flight commit before a forced Engine stop.
const DELETE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

impl<St: Store + 'static> UniverseManager<St> {
    /// Build a manager over an already-constructed registry store. Call
    /// [`Self::load`] once at startup to repopulate the registry.
    pub fn new(store: Arc<St>, bus: Arc<dyn StatusBus>, deps: EngineDeps) -> Self {
        Self {
            registry: Registry::new(store),
            engines: DashMap::new(),
            save_coordinator: SaveCoordinator::new(),
            startup_coordinator: StartupCoordinator::default(),
            bus,
            deps,
            active: RwLock::new(None),
        }
    }

    /// Repopulate the registry from durable storage.
    pub async fn load(&self) -> Result<()> {
        self.registry.load().await
    }

    fn emit(&self, kind: StatusKind, message: impl Into<String>) {
        let _ = self.bus.publish(StatusEvent::new(EventSource::Manager, kind, message.into()));
    }

    /// List every registered universe.
    pub fn list(&self) -> Vec<Universe> {
        self.registry.all()
    }

    /// Fetch one universe by slug.
    pub fn get(&self, slug: &Slug) -> Option<Universe> {
        self.registry.get(slug)
    }

    /// The currently active universe's slug, if any universe has been
    /// switched to since startup.
    pub fn active_slug(&self) -> Option<Slug> {
        self.active.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Register a running Engine for `slug`.
    pub fn set_engine(&self, slug: Slug, engine: EngineHandle) {
        self.engines.insert(slug, engine);
    }

    /// Look up the running Engine for `slug`, if any.
    pub fn get_engine(&self, slug: &Slug) -> Option<dashmap::mapref::one::Ref<'_, Slug, EngineHandle>> {
        self.engines.get(slug)
    }

    /// Register a new universe.
    pub async fn create(&self, name: impl Into<String>, options: CreateOptions) -> Result<Universe> {
        let name = name.into();
        let slug = Slug::new(slugify(&name))?;
        if self.registry.contains(&slug) {
            return Err(CoreError::InvariantViolation(format!("a universe with slug '{slug}' already exists")));
        }

        let mut linked_repo = options.linked_repo;

        if let Some(create_opts) = options.create_remote_repo {
            let target = linked_repo.clone().ok_or_else(|| {
                CoreError::InvariantViolation("create_remote_repo requires linked_repo to name the desired owner/repo".into())
            })?;
            let create_provider = self.deps.provider_factory.build(&target, Modality::OAuth);
            let created = create_provider.create_repo(&target.repo, create_opts.private).await?;
            let init_provider = self.deps.provider_factory.build(&created, Modality::OAuth);
            init_provider.initialize_empty_repo().await?;
            info!(universe = %slug, owner = %created.owner, repo = %created.repo, "created and initialized a new remote repo");
            linked_repo = Some(created);
        } else if let Some(repo) = &linked_repo {
            let provider = self.deps.provider_factory.build(repo, Modality::OAuth);
            provider.initialize_empty_repo().await?;
        }

        let git_enabled = linked_repo.is_some();
        let local_enabled = options.enable_local_file || !git_enabled;
        let source_of_truth = options.source_of_truth.unwrap_or(if git_enabled {
            SourceOfTruth::Git
        } else {
            SourceOfTruth::Local
        });

        let mut universe = Universe {
            slug: slug.clone(),
            name: name.clone(),
            source_of_truth,
            local_file: LocalFile { enabled: local_enabled, path: format!("{slug}.redstring"), handle: None },
            git_repo: GitRepo {
                enabled: git_enabled,
                linked_repo,
                ..GitRepo::default()
            },
            sources: vec![],
            metadata: Metadata::default(),
        };

        if universe.local_file.enabled && !self.deps.local_backing.is_durable() {
            if !universe.git_repo.enabled || universe.git_repo.linked_repo.is_none() {
                return Err(CoreError::NotSupported(
                    "this platform has no durable local file access; link a git repo to create a universe".into(),
                ));
            }
            universe.force_git_only();
            info!(universe = %slug, "forced sourceOfTruth=git: platform has no durable local file access");
        }

        universe.validate_invariants()?;
        self.registry.put(universe.clone()).await?;
        info!(universe = %slug, "universe created");
        Ok(universe)
    }

    /// Remove a universe. Refuses if it is the last one registered, or if
    /// it is currently active (switch away first).
    pub async fn delete(&self, slug: &Slug) -> Result<()> {
        if self.registry.len() <= 1 {
            return Err(CoreError::InvariantViolation("at least one universe must remain registered".into()));
        }
        if self.active_slug().as_ref() == Some(slug) {
            return Err(CoreError::InvariantViolation("cannot delete the active universe; switch away first".into()));
        }

        if let Some((_, engine)) = self.engines.remove(slug) {
            let _ = engine.stop().await;
            if tokio::time::timeout(DELETE_DRAIN_TIMEOUT, engine.join()).await.is_err() {
                warn!(universe = %slug, "engine did not exit within the delete drain timeout; proceeding anyway");
            }
        }

        self.registry.remove(slug).await
    }

    /// Apply a validated partial update.
    pub async fn update(&self, slug: &Slug, patch: UniversePatch) -> Result<Universe> {
        let mut universe = self.registry.get(slug).ok_or_else(|| CoreError::NotFound(slug.to_string()))?;

        if let Some(name) = patch.name {
            universe.name = name;
        }
        if let Some(source_of_truth) = patch.source_of_truth {
            universe.source_of_truth = source_of_truth;
        }
        if let Some(enabled) = patch.local_file_enabled {
            universe.local_file.enabled = enabled;
        }

        if universe.local_file.enabled && !self.deps.local_backing.is_durable() {
            if !universe.git_repo.enabled || universe.git_repo.linked_repo.is_none() {
                return Err(CoreError::NotSupported(
                    "this platform has no durable local file access; link a git repo before enabling it".into(),
                ));
            }
            universe.force_git_only();
            info!(universe = %slug, "forced sourceOfTruth=git: platform has no durable local file access");
        }

        universe.validate_invariants()?;
        self.registry.put(universe.clone()).await?;
        if let Some(engine) = self.engines.get(slug) {
            engine.set_source_of_truth(universe.source_of_truth).await?;
        }
        Ok(universe)
    }

    async fn read_local(&self, universe: &Universe) -> Result<GraphStoreState> {
        let Some(token) = universe.local_file.handle.as_deref() else {
            return Ok(GraphStoreState::default());
        };
        let handle = Handle::from_token(token)?;
        let bytes = match self.deps.local_backing.read(&handle).await {
            Ok(bytes) => bytes,
            Err(CoreError::NotFound(_)) => return Ok(GraphStoreState::default()),
            Err(CoreError::NotSupported(reason)) => {
                if universe.git_repo.enabled && universe.git_repo.linked_repo.is_some() {
                    let mut forced = universe.clone();
                    forced.force_git_only();
                    match self.registry.put(forced).await {
                        Ok(()) => warn!(universe = %universe.slug, "local backing has no durable access; forced sourceOfTruth=git"),
                        Err(e) => warn!(universe = %universe.slug, error = %e, "could not persist forced git-only universe"),
                    }
                }
                return Err(CoreError::NotSupported(reason));
            }
            Err(e) => return Err(e),
        };
        let doc: RedstringDocument = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Server(format!("local document is not valid JSON: {e}")))?;
        Ok(usc_codec::decode(&doc).0)
    }

    async fn read_git(&self, universe: &Universe) -> Result<GraphStoreState> {
        let Some(repo) = universe.git_repo.linked_repo.clone() else {
            return Ok(GraphStoreState::default());
        };
        let provider = self.deps.provider_factory.build(&repo, Modality::OAuth);
        let path = format!("{}/{}", universe.git_repo.universe_folder, universe.git_repo.universe_file);
        let file = match provider.get_file(&path).await {
            Ok(file) => file,
            Err(CoreError::NotFound(_)) => return Ok(GraphStoreState::default()),
            Err(e) => return Err(e),
        };
        let doc: RedstringDocument = serde_json::from_slice(&file.bytes)
            .map_err(|e| CoreError::Server(format!("remote document is not valid JSON: {e}")))?;
        Ok(usc_codec::decode(&doc).0)
    }

    /// Read a universe's current state from whichever backing its
    /// `sourceOfTruth` prefers, falling back to the other enabled backing if
    /// the preferred one is unreachable. A backing simply having no content
    /// yet (`NotFound`) is not a failure — it is folded into an empty
    /// [`GraphStoreState`] by [`Self::read_local`]/[`Self::read_git`] rather
    /// than triggering a fallback, matching the Engine's own startup-merge
    /// treatment of a missing remote document.
    async fn load_preferred_state(&self, universe: &Universe) -> Result<GraphStoreState> {
        let local_enabled = universe.local_file.enabled;
        let git_enabled = universe.git_repo.enabled;
        if !local_enabled && !git_enabled {
            return Ok(GraphStoreState::default());
        }

        let prefer_local = match universe.source_of_truth {
            SourceOfTruth::Local => local_enabled,
            SourceOfTruth::Git => !git_enabled,
        };

        if prefer_local {
            match self.read_local(universe).await {
                Ok(state) => Ok(state),
                Err(primary_err) if git_enabled => {
                    warn!(universe = %universe.slug, error = %primary_err, "local backing unreachable, trying the linked repo");
                    self.read_git(universe).await
                }
                Err(e) => Err(e),
            }
        } else {
            match self.read_git(universe).await {
                Ok(state) => Ok(state),
                Err(primary_err) if local_enabled => {
                    warn!(universe = %universe.slug, error = %primary_err, "linked repo unreachable, trying the local backing");
                    self.read_local(universe).await
                }
                Err(e) => Err(e),
            }
        }
    }

    fn engine_config_for(universe: &Universe) -> EngineConfig {
        EngineConfig {
            universe_slug: universe.slug.to_string(),
            universe_name: universe.name.clone(),
            content_path: format!("{}/{}", universe.git_repo.universe_folder, universe.git_repo.universe_file),
            modality: Modality::OAuth,
            source_of_truth: universe.source_of_truth,
            ..EngineConfig::default()
        }
    }

    async fn start_engine_for(&self, universe: &Universe, initial_state: Option<GraphStoreState>) -> Result<()> {
        let Some(repo) = universe.git_repo.linked_repo.clone() else {
            return Ok(());
        };
        if !self.startup_coordinator.request_initialization(&universe.slug, "universe-manager") {
            return Ok(());
        }
        let provider = self.deps.provider_factory.build(&repo, Modality::OAuth);
        let config = Self::engine_config_for(universe);
        let handle = usc_sync_engine::spawn(
            config,
            provider,
            self.deps.rate_limiter.clone(),
            self.deps.token_source.clone(),
            self.bus.clone(),
            initial_state,
        );
        self.set_engine(universe.slug.clone(), handle);
        self.startup_coordinator.release(&universe.slug, "universe-manager");
        Ok(())
    }

    /// The heart of the active-universe state machine. The incoming
    /// universe's state is loaded *before* the outgoing Engine is stopped,
    /// so a load failure leaves the outgoing universe fully running —
    /// exactly the "if both fail, surface error and keep outgoing active"
    /// edge case, which a stop-then-load order would violate.
    pub async fn switch_active(&self, slug: &Slug, save_current: bool) -> Result<SwitchOutcome> {
        let incoming = self.registry.get(slug).ok_or_else(|| CoreError::NotFound(slug.to_string()))?;
        let outgoing_slug = self.active_slug();

        if save_current {
            if let Some(outgoing_slug) = &outgoing_slug {
                if let Some(outgoing) = self.registry.get(outgoing_slug) {
                    let engine = self.engines.get(outgoing_slug);
                    let state = self.load_preferred_state(&outgoing).await.unwrap_or_default();
                    self.save_coordinator
                        .save_active(SaveRequest {
                            universe: &outgoing,
                            state,
                            engine: engine.as_deref(),
                            local_backing: Some(self.deps.local_backing.as_ref()),
                            force: false,
                        })
                        .await?;
                }
            }
        }

        let store_state = self.load_preferred_state(&incoming).await?;

        if let Some(outgoing_slug) = &outgoing_slug {
            if let Some((_, engine)) = self.engines.remove(outgoing_slug) {
                let _ = engine.stop().await;
            }
        }

        self.start_engine_for(&incoming, Some(store_state.clone())).await?;

        *self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(slug.clone());
        self.emit(StatusKind::ActiveChanged { slug: slug.to_string() }, format!("switched active universe to '{slug}'"));

        Ok(SwitchOutcome { store_state })
    }

    /// Walk `universes/*/` in `repo` and return every universe found.
    pub async fn discover_in_repo(&self, repo: RepoRef) -> Result<Vec<DiscoveredUniverse>> {
        let provider = self.deps.provider_factory.build(&repo, Modality::OAuth);
        discover::discover_in_repo(provider.as_ref(), repo, "universes").await
    }

    /// Bind a [`DiscoveredUniverse`] into the registry as a new, local
    /// universe entry. Two discovered universes sharing a slug across
    /// different repos are both surfaced by [`Self::discover_in_repo`];
    /// linking one never overwrites the other — a slug already registered is
    /// rejected rather than silently replaced.
    pub async fn link_discovered(&self, discovered: &DiscoveredUniverse) -> Result<Universe> {
        if self.registry.contains(&discovered.slug) {
            return Err(CoreError::InvariantViolation(format!(
                "a universe with slug '{}' is already registered; rename before linking another",
                discovered.slug
            )));
        }
        let universe = discover::link(discovered, "universes", "schema");
        self.registry.put(universe.clone()).await?;
        info!(universe = %discovered.slug, repo = ?discovered.repo, "discovered universe linked");
        Ok(universe)
    }

    /// Explicit, user-driven conflict resolution: reload from
    /// `sourceOfTruth`, discarding the other side.
    pub async fn resolve_sync_conflict(&self, slug: &Slug) -> Result<GraphStoreState> {
        let universe = self.registry.get(slug).ok_or_else(|| CoreError::NotFound(slug.to_string()))?;
        let state = match universe.source_of_truth {
            SourceOfTruth::Local => self.read_local(&universe).await?,
            SourceOfTruth::Git => self.read_git(&universe).await?,
        };
        if let Some(engine) = self.engines.get(slug) {
            engine.update_state(state.clone(), false).await?;
        }
        self.emit(
            StatusKind::Conflict { resolution: Some(format!("reloaded from {:?}", universe.source_of_truth)) },
            format!("resolved conflict for '{slug}' by reloading from its source of truth"),
        );
        Ok(state)
    }

    /// Save the currently active universe through the [`SaveCoordinator`].
    pub async fn save_active(&self, state: GraphStoreState, force: bool) -> Result<()> {
        let slug = self.active_slug().ok_or_else(|| CoreError::InvariantViolation("no universe is active".into()))?;
        let universe = self.registry.get(&slug).ok_or_else(|| CoreError::NotFound(slug.to_string()))?;
        let engine = self.engines.get(&slug);
        self.save_coordinator
            .save_active(SaveRequest {
                universe: &universe,
                state,
                engine: engine.as_deref(),
                local_backing: Some(self.deps.local_backing.as_ref()),
                force,
            })
            .await
    }
}

/// Derive a slug candidate from a display name (lowercase, hyphenate
/// whitespace, strip anything [`Slug::new`] would reject).
fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("universe");
    }
    out
}

/// Build the `universe_info` header embedded in an encoded document, given
/// a universe's identity and its original creation time.
pub fn document_universe_info(universe: &Universe, created_at: chrono::DateTime<chrono::Utc>) -> DocumentUniverseInfo {
    DocumentUniverseInfo {
        slug: universe.slug.to_string(),
        name: universe.name.clone(),
        created_at,
        updated_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use usc_bus::InMemoryStatusBus;
    use usc_provider::{FileContent, FileEntry, PutResult};
    use usc_rate_limiter::{Permit, RateLimitError, RateLimitStats};
    use usc_store::MemoryStore;

    struct NoopProvider;

    #[async_trait]
    impl Provider for NoopProvider {
        async fn is_available(&self) -> bool {
            true
        }
        async fn list_files(&self, _path: &str) -> Result<Vec<FileEntry>> {
            Ok(vec![])
        }
        async fn get_file(&self, path: &str) -> Result<FileContent> {
            Err(CoreError::NotFound(path.to_string()))
        }
        async fn put_file(&self, _path: &str, _bytes: Vec<u8>, _expected_sha: Option<&str>) -> Result<PutResult> {
            Ok(PutResult { new_sha: "sha".into() })
        }
        async fn delete_file(&self, _path: &str, _expected_sha: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn create_repo(&self, _name: &str, _private: bool) -> Result<RepoRef> {
            unimplemented!()
        }
        async fn initialize_empty_repo(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NoopFactory;

    impl ProviderFactory for NoopFactory {
        fn build(&self, _repo: &RepoRef, _modality: Modality) -> Arc<dyn Provider> {
            Arc::new(NoopProvider)
        }
    }

    struct UnlimitedRateLimiter;

    #[async_trait]
    impl RateLimiter for UnlimitedRateLimiter {
        async fn acquire(&self, modality: Modality, _deadline: Option<chrono::DateTime<chrono::Utc>>) -> std::result::Result<Permit, RateLimitError> {
            Ok(Permit::new(modality))
        }
        async fn freeze(&self, _modality: Modality, _until: chrono::DateTime<chrono::Utc>) -> std::result::Result<(), RateLimitError> {
            Ok(())
        }
        async fn stats(&self, _modality: Modality) -> std::result::Result<RateLimitStats, RateLimitError> {
            unimplemented!()
        }
    }

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn get_token(&self, _modality: Modality) -> Result<String> {
            Ok("token".into())
        }
        async fn force_refresh(&self, _modality: Modality) -> Result<String> {
            Ok("token".into())
        }
    }

    struct MemoryLocalBacking(tokio::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl LocalFileBacking for MemoryLocalBacking {
        async fn pick(&self, name_hint: &str) -> Result<Handle> {
            Ok(Handle::Native(std::path::PathBuf::from(name_hint)))
        }
        async fn write(&self, handle: &Handle, bytes: Vec<u8>) -> Result<()> {
            self.0.lock().await.insert(handle.token(), bytes);
            Ok(())
        }
        async fn read(&self, handle: &Handle) -> Result<Vec<u8>> {
            self.0
                .lock()
                .await
                .get(&handle.token())
                .cloned()
                .ok_or_else(|| CoreError::NotFound(handle.token()))
        }
    }

    fn test_manager() -> UniverseManager<MemoryStore> {
        UniverseManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryStatusBus::new(64)),
            EngineDeps {
                provider_factory: Arc::new(NoopFactory),
                rate_limiter: Arc::new(UnlimitedRateLimiter),
                token_source: Arc::new(StaticToken),
                local_backing: Arc::new(MemoryLocalBacking(tokio::sync::Mutex::new(std::collections::HashMap::new()))),
            },
        )
    }

    #[tokio::test]
    async fn create_picks_a_slug_from_the_name_and_defaults_to_local_only() {
        let manager = test_manager();
        let universe = manager.create("My First Universe", CreateOptions::default()).await.unwrap();
        assert_eq!(universe.slug.as_str(), "my-first-universe");
        assert!(universe.local_file.enabled);
        assert!(!universe.git_repo.enabled);
        assert_eq!(universe.source_of_truth, SourceOfTruth::Local);
    }

    #[tokio::test]
    async fn create_rejects_a_duplicate_slug() {
        let manager = test_manager();
        manager.create("Alpha", CreateOptions::default()).await.unwrap();
        assert!(manager.create("Alpha", CreateOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn delete_refuses_when_only_one_universe_remains() {
        let manager = test_manager();
        manager.create("Alpha", CreateOptions::default()).await.unwrap();
        let slug = Slug::new("alpha").unwrap();
        assert!(manager.delete(&slug).await.is_err());
    }

    #[tokio::test]
    async fn delete_refuses_the_currently_active_universe() {
        let manager = test_manager();
        manager.create("Alpha", CreateOptions::default()).await.unwrap();
        manager.create("Beta", CreateOptions::default()).await.unwrap();
        manager.switch_active(&Slug::new("alpha").unwrap(), false).await.unwrap();
        assert!(manager.delete(&Slug::new("alpha").unwrap()).await.is_err());
        assert!(manager.delete(&Slug::new("beta").unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn switch_active_emits_active_changed_and_updates_active_slug() {
        let manager = test_manager();
        manager.create("Alpha", CreateOptions::default()).await.unwrap();
        let mut events = manager.bus.subscribe();

        let outcome = manager.switch_active(&Slug::new("alpha").unwrap(), false).await.unwrap();
        assert_eq!(outcome.store_state, GraphStoreState::default());
        assert_eq!(manager.active_slug(), Some(Slug::new("alpha").unwrap()));

        let event = events.recv().await.unwrap();
        assert!(matches!(event.kind, StatusKind::ActiveChanged { .. }));
    }

    #[tokio::test]
    async fn update_rejects_a_patch_that_would_violate_invariants() {
        let manager = test_manager();
        manager.create("Alpha", CreateOptions::default()).await.unwrap();
        let slug = Slug::new("alpha").unwrap();
        let patch = UniversePatch { local_file_enabled: Some(false), ..Default::default() };
        assert!(manager.update(&slug, patch).await.is_err());
    }

    #[tokio::test]
    async fn link_discovered_rejects_a_slug_collision() {
        let manager = test_manager();
        manager.create("Alpha", CreateOptions::default()).await.unwrap();

        let discovered = DiscoveredUniverse {
            slug: Slug::new("alpha").unwrap(),
            name: "Alpha Remote".into(),
            repo: RepoRef { host: usc_types::RepoHost::GitHub, owner: "o".into(), repo: "r".into() },
            sha: "sha".into(),
            stats: usc_codec::DocumentStats { node_count: 0, graph_count: 0, edge_count: 0 },
        };
        assert!(manager.link_discovered(&discovered).await.is_err());
    }
}
