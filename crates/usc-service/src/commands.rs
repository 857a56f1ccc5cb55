//! Typed command payloads and the one implementation each command has —
//! `http.rs` and `cli.rs` both call straight through to these functions.

use serde::{Deserialize, Serialize};

use usc_auth::HealthStatus;
use usc_codec::GraphStoreState;
use usc_manager::{CreateOptions, CreateRemoteRepo, DiscoveredUniverse, SwitchOutcome, UniversePatch};
use usc_types::{Modality, RepoRef, Result, Slug, SourceOfTruth, Universe};

use crate::state::AppState;

/// `POST /commands/switch_active` payload.
#[derive(Debug, Deserialize)]
pub struct SwitchActivePayload {
    /// The universe to activate.
    pub slug: String,
    /// Whether to save the currently active universe before switching.
    pub save_current: bool,
}

/// `POST /commands/create_universe` payload.
#[derive(Debug, Deserialize)]
pub struct CreateUniversePayload {
    /// Display name; the slug is derived from it.
    pub name: String,
    /// Which side is authoritative, if the caller wants to override the
    /// default derived from `linked_repo`.
    #[serde(default)]
    pub source_of_truth: Option<SourceOfTruth>,
    /// Link a remote repository immediately.
    #[serde(default)]
    pub linked_repo: Option<RepoRef>,
    /// Enable the local file backing.
    #[serde(default)]
    pub enable_local_file: bool,
    /// Create `linked_repo` as a brand-new remote repository rather than
    /// linking one that already exists. Carries whether it should be
    /// private.
    #[serde(default)]
    pub create_remote_repo_private: Option<bool>,
}

/// `POST /commands/delete_universe` payload.
#[derive(Debug, Deserialize)]
pub struct DeleteUniversePayload {
    /// The universe to remove.
    pub slug: String,
}

/// `POST /commands/update_universe` payload.
#[derive(Debug, Deserialize)]
pub struct UpdateUniversePayload {
    /// The universe to update.
    pub slug: String,
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New authoritative side.
    #[serde(default)]
    pub source_of_truth: Option<SourceOfTruth>,
    /// Enable/disable the local file backing.
    #[serde(default)]
    pub local_file_enabled: Option<bool>,
}

/// `POST /commands/discover_in_repo` payload.
#[derive(Debug, Deserialize)]
pub struct DiscoverInRepoPayload {
    /// The repository to walk.
    pub repo: RepoRef,
}

/// `POST /commands/link_discovered` payload.
#[derive(Debug, Deserialize)]
pub struct LinkDiscoveredPayload {
    /// The universe previously surfaced by `discover_in_repo`.
    pub discovered: DiscoveredUniverse,
    /// The repo it was found in — authoritative over any repo embedded in
    /// `discovered` (the wire payload round-trips through a UI layer that
    /// may not preserve it byte-for-byte, so the explicit field wins).
    pub repo_ref: RepoRef,
}

/// `POST /commands/force_save` payload.
///
/// The original "Save Now" action carries only a `reason` tag because the
/// authoring UI already holds the live [`GraphStoreState`] it wants
/// persisted; this process has no independent copy of that state, so the
/// payload also carries it explicitly.
#[derive(Debug, Deserialize)]
pub struct ForceSavePayload {
    /// Why the save was triggered (`manual`, `unload`, …), surfaced only
    /// for logging — it has no effect on save ordering.
    pub reason: String,
    /// The graph state to persist.
    pub state: GraphStoreState,
}

/// `POST /commands/resolve_sync_conflict` payload.
#[derive(Debug, Deserialize)]
pub struct ResolveSyncConflictPayload {
    /// The universe whose conflict should be resolved.
    pub slug: String,
}

/// Response for `get_auth_status`.
#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    /// OAuth credential status.
    pub oauth: ModalityStatus,
    /// App-installation credential status.
    pub app_installation: ModalityStatus,
}

/// Per-modality connection status surfaced to the UI.
#[derive(Debug, Serialize)]
pub struct ModalityStatus {
    /// Whether a health check against the remote succeeded.
    pub connected: bool,
    /// The classification, when a credential is present at all.
    pub health: Option<HealthStatusWire>,
}

/// Wire form of [`HealthStatus`] (that type is not `Serialize` on its own
/// binary-stable terms — this lines it up with the rest of the JSON API's
/// `snake_case` convention).
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatusWire {
    /// See [`HealthStatus::Healthy`].
    Healthy,
    /// See [`HealthStatus::Degraded`].
    Degraded,
    /// See [`HealthStatus::Failed`].
    Failed,
}

impl From<HealthStatus> for HealthStatusWire {
    fn from(value: HealthStatus) -> Self {
        match value {
            HealthStatus::Healthy => HealthStatusWire::Healthy,
            HealthStatus::Degraded => HealthStatusWire::Degraded,
            HealthStatus::Failed => HealthStatusWire::Failed,
        }
    }
}

/// `get_all_universes` — list every registered universe.
pub fn get_all_universes(state: &AppState) -> Vec<Universe> {
    state.manager.list()
}

/// `get_active_universe` — the currently active universe, if any.
pub fn get_active_universe(state: &AppState) -> Option<Universe> {
    let slug = state.manager.active_slug()?;
    state.manager.get(&slug)
}

/// `get_auth_status` — a health snapshot for both credential modalities.
pub async fn get_auth_status(state: &AppState) -> AuthStatusResponse {
    async fn probe(state: &AppState, modality: Modality) -> ModalityStatus {
        match state.auth.health_check(modality).await {
            Ok(status) => ModalityStatus { connected: matches!(status, HealthStatus::Healthy), health: Some(status.into()) },
            Err(_) => ModalityStatus { connected: false, health: None },
        }
    }

    AuthStatusResponse {
        oauth: probe(state, Modality::OAuth).await,
        app_installation: probe(state, Modality::AppInstallation).await,
    }
}

/// `switch_active`.
pub async fn switch_active(state: &AppState, payload: SwitchActivePayload) -> Result<SwitchOutcome> {
    let slug = Slug::new(payload.slug)?;
    state.manager.switch_active(&slug, payload.save_current).await
}

/// `create_universe`.
pub async fn create_universe(state: &AppState, payload: CreateUniversePayload) -> Result<Universe> {
    state
        .manager
        .create(
            payload.name,
            CreateOptions {
                source_of_truth: payload.source_of_truth,
                linked_repo: payload.linked_repo,
                enable_local_file: payload.enable_local_file,
                create_remote_repo: payload.create_remote_repo_private.map(|private| CreateRemoteRepo { private }),
            },
        )
        .await
}

/// `delete_universe`.
pub async fn delete_universe(state: &AppState, payload: DeleteUniversePayload) -> Result<()> {
    let slug = Slug::new(payload.slug)?;
    state.manager.delete(&slug).await
}

/// `update_universe`.
pub async fn update_universe(state: &AppState, payload: UpdateUniversePayload) -> Result<Universe> {
    let slug = Slug::new(payload.slug)?;
    state
        .manager
        .update(
            &slug,
            UniversePatch {
                name: payload.name,
                source_of_truth: payload.source_of_truth,
                local_file_enabled: payload.local_file_enabled,
            },
        )
        .await
}

/// `discover_in_repo`.
pub async fn discover_in_repo(state: &AppState, payload: DiscoverInRepoPayload) -> Result<Vec<DiscoveredUniverse>> {
    state.manager.discover_in_repo(payload.repo).await
}

/// `link_discovered`.
pub async fn link_discovered(state: &AppState, payload: LinkDiscoveredPayload) -> Result<Universe> {
    let discovered = DiscoveredUniverse { repo: payload.repo_ref, ..payload.discovered };
    state.manager.link_discovered(&discovered).await
}

/// `resolve_sync_conflict`.
pub async fn resolve_sync_conflict(state: &AppState, payload: ResolveSyncConflictPayload) -> Result<GraphStoreState> {
    let slug = Slug::new(payload.slug)?;
    state.manager.resolve_sync_conflict(&slug).await
}

/// `force_save`.
pub async fn force_save(state: &AppState, payload: ForceSavePayload) -> Result<()> {
    tracing::info!(reason = %payload.reason, "force_save requested");
    state.manager.save_active(payload.state, true).await
}
