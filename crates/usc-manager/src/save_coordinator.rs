//! Single entry point for "save now". Ordering follows `sourceOfTruth`;
//! overlapping calls for the same universe are coalesced into one in-flight
//! save plus at most one pending follow-up, never queued N-deep. The follow-
//! up still asks the Engine to commit — but the Engine's own fingerprint
//! check turns a no-op follow-up into a skipped network write, which is what
//! makes "`save_active` twice with no intervening mutation produces exactly
//! one network write" hold without this coordinator needing its own content-
//! equality check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, warn};

use usc_codec::GraphStoreState;
use usc_local_file::{Handle, LocalFileBacking};
use usc_sync_engine::{EngineHandle, StatusSnapshot};
use usc_types::{CoreError, Result, Slug, SourceOfTruth, StatusKind, Universe};

/// Everything one `save_active` attempt needs for a single universe.
pub struct SaveRequest<'a> {
    /// The universe being saved.
    pub universe: &'a Universe,
    /// Current in-memory graph state to persist.
    pub state: GraphStoreState,
    /// The universe's running Engine, if `gitRepo.enabled`.
    pub engine: Option<&'a EngineHandle>,
    /// The local file backing to write through, if `localFile.enabled`.
    pub local_backing: Option<&'a dyn LocalFileBacking>,
    /// Bypass the `ErrorHold` refusal.
    pub force: bool,
}

struct SaveSlot {
    in_flight: AtomicBool,
    pending: AtomicBool,
    notify: Notify,
}

impl Default for SaveSlot {
    fn default() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
}

/// De-duplicating, order-aware save entry point.
#[derive(Default)]
pub struct SaveCoordinator {
    slots: DashMap<Slug, Arc<SaveSlot>>,
}

impl SaveCoordinator {
    /// Build an empty coordinator; one [`SaveSlot`] is created lazily per
    /// universe on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Save `request.universe`'s current state through whichever
    /// backing(s) it has enabled, ordered by `sourceOfTruth`.
    pub async fn save_active(&self, request: SaveRequest<'_>) -> Result<()> {
        if !request.force {
            if let Some(engine) = request.engine {
                if matches!(engine.get_status().kind, StatusKind::Error { .. }) {
                    return Err(CoreError::InvariantViolation(
                        "engine is in ErrorHold for this universe; pass force to override".into(),
                    ));
                }
            }
        }

        let slot = self
            .slots
            .entry(request.universe.slug.clone())
            .or_insert_with(|| Arc::new(SaveSlot::default()))
            .clone();

        if slot.in_flight.swap(true, Ordering::AcqRel) {
            // Someone else is already saving this universe. Mark a
            // follow-up as pending and wait for the in-flight runner
            // (which checks `pending` before it releases the slot) to
            // either include our change or hand off to us.
            slot.pending.store(true, Ordering::Release);
            slot.notify.notified().await;
            return Ok(());
        }

        let result = self.run_with_followups(&slot, &request).await;

        slot.in_flight.store(false, Ordering::Release);
        slot.notify.notify_waiters();
        result
    }

    async fn run_with_followups(&self, slot: &SaveSlot, request: &SaveRequest<'_>) -> Result<()> {
        loop {
            let outcome = self.perform_save(request).await;
            if !slot.pending.swap(false, Ordering::AcqRel) {
                return outcome;
            }
            if let Err(e) = &outcome {
                warn!(universe = %request.universe.slug, error = %e, "save attempt failed, a pending follow-up will retry");
            }
            debug!(universe = %request.universe.slug, "coalesced follow-up save starting");
        }
    }

    async fn perform_save(&self, request: &SaveRequest<'_>) -> Result<()> {
        let universe = request.universe;
        let local_enabled = universe.local_file.enabled;
        let git_enabled = universe.git_repo.enabled;

        match (universe.source_of_truth, local_enabled, git_enabled) {
            (SourceOfTruth::Local, true, true) => {
                self.write_local(request).await?;
                if let Err(e) = self.commit_git(request).await {
                    warn!(universe = %universe.slug, error = %e, "git mirror commit failed after local-authoritative save");
                }
                Ok(())
            }
            (SourceOfTruth::Git, true, true) => {
                self.commit_git(request).await?;
                if let Err(e) = self.write_local(request).await {
                    warn!(universe = %universe.slug, error = %e, "local mirror write failed after git-authoritative save");
                }
                Ok(())
            }
            (_, true, false) => self.write_local(request).await,
            (_, false, true) => self.commit_git(request).await,
            (_, false, false) => Err(CoreError::InvariantViolation(
                "universe has no enabled backing to save to".into(),
            )),
        }
    }

    async fn write_local(&self, request: &SaveRequest<'_>) -> Result<()> {
        let backing = request
            .local_backing
            .ok_or_else(|| CoreError::InvariantViolation("localFile.enabled but no local backing was supplied".into()))?;
        let token = request
            .universe
            .local_file
            .handle
            .as_deref()
            .ok_or_else(|| CoreError::InvariantViolation("localFile.enabled but no handle has been picked yet".into()))?;
        let handle = Handle::from_token(token)?;
        let universe_info = usc_codec::DocumentUniverseInfo {
            slug: request.universe.slug.to_string(),
            name: request.universe.name.clone(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let document = usc_codec::encode(&request.state, universe_info, None);
        let bytes = usc_codec::canonical_bytes(&document);
        backing.write(&handle, bytes).await
    }

    async fn commit_git(&self, request: &SaveRequest<'_>) -> Result<()> {
        let engine = request
            .engine
            .ok_or_else(|| CoreError::InvariantViolation("gitRepo.enabled but no engine is running for this universe".into()))?;
        engine.force_commit(request.state.clone()).await.map(|_| ())
    }
}

/// Whether `snapshot` reflects an Engine currently sitting in `ErrorHold`,
/// per the last status this coordinator observed.
pub fn is_error_hold(snapshot: &StatusSnapshot) -> bool {
    matches!(snapshot.kind, StatusKind::Error { .. })
}
