//! The commit-loop task itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use usc_bus::StatusBus;
use usc_codec::{GraphStoreState, RedstringDocument};
use usc_provider::{Provider, TokenSource};
use usc_rate_limiter::RateLimiter;
use usc_types::{CoreError, EventSource, Modality, Result as CoreResult, SourceOfTruth, StatusEvent, StatusKind};

use crate::command::Command;
use crate::handle::EngineHandle;
use crate::merge::{decide_merge, MergeDecision};
use crate::state::{backoff_delay, EngineState};

/// Static per-universe configuration an [`Engine`] is built from.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The owning universe's slug, used for event sourcing and logging.
    pub universe_slug: String,
    /// The owning universe's display name, embedded in each document.
    pub universe_name: String,
    /// Repo-relative path to the `.redstring` file this engine commits to.
    pub content_path: String,
    /// Which credential modality this engine's provider authenticates as.
    pub modality: Modality,
    /// Which side wins a write conflict.
    pub source_of_truth: SourceOfTruth,
    /// Debounce while the user is quiescent.
    pub debounce: Duration,
    /// Extended debounce while a drag/edit hint is active.
    pub debounce_while_dragging: Duration,
    /// Base delay for the first backoff attempt.
    pub backoff_base: Duration,
    /// Backoff attempts allowed before escalating to `ErrorHold`.
    pub backoff_max_attempts: u32,
    /// Upper bound on any single backoff delay.
    pub backoff_ceiling: Duration,
    /// How often the commit loop checks whether a debounced commit is due.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            universe_slug: String::new(),
            universe_name: String::new(),
            content_path: String::new(),
            modality: Modality::OAuth,
            source_of_truth: SourceOfTruth::Local,
            debounce: Duration::from_millis(1500),
            debounce_while_dragging: Duration::from_secs(4),
            backoff_base: Duration::from_secs(2),
            backoff_max_attempts: 5,
            backoff_ceiling: Duration::from_secs(300),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// A point-in-time snapshot of an Engine's status, published over a `watch`
/// channel for [`EngineHandle::status`].
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// The event vocabulary entry this snapshot reflects.
    pub kind: StatusKind,
    /// When this snapshot was produced.
    pub updated_at: DateTime<Utc>,
}

enum ConflictOutcome {
    /// The conflict was fully resolved without needing to retry the write
    /// (the remote became the new in-memory state).
    Resolved { new_sha: String },
    /// Retry the same pending write against a freshened `expected_sha`.
    RetryWithSha { new_sha: String },
}

/// Owns one universe's commit loop. Constructed and driven only through
/// [`spawn`].
pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    rate_limiter: Arc<dyn RateLimiter>,
    token_source: Arc<dyn TokenSource>,
    bus: Arc<dyn StatusBus>,
    commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<StatusSnapshot>,

    state: EngineState,
    store_state: Option<GraphStoreState>,
    dirty: bool,
    drag_active: bool,
    last_commit_attempt_at: Option<Instant>,
    last_known_sha: Option<String>,
    last_committed_fingerprint: Option<String>,
    /// The last document this universe's state was decoded from or
    /// committed as. Carried into the next `encode` call as `prior` so a
    /// remote document's unknown fields survive every commit this Engine
    /// makes, not just the first one.
    last_document: Option<RedstringDocument>,
    frozen_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Build and spawn an Engine as its own `tokio` task, returning a handle to
/// drive it.
pub fn spawn(
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    rate_limiter: Arc<dyn RateLimiter>,
    token_source: Arc<dyn TokenSource>,
    bus: Arc<dyn StatusBus>,
    initial_state: Option<GraphStoreState>,
) -> EngineHandle {
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = watch::channel(StatusSnapshot {
        kind: StatusKind::Idle,
        updated_at: Utc::now(),
    });

    let dirty = initial_state.is_some();
    let engine = Engine {
        config,
        provider,
        rate_limiter,
        token_source,
        bus,
        commands: commands_rx,
        status_tx,
        state: EngineState::Starting,
        store_state: initial_state,
        dirty,
        drag_active: false,
        last_commit_attempt_at: None,
        last_known_sha: None,
        last_committed_fingerprint: None,
        last_document: None,
        frozen_until: None,
        created_at: Utc::now(),
    };

    let task = tokio::spawn(engine.run());
    EngineHandle::new(commands_tx, status_rx, task)
}

impl Engine {
    async fn run(mut self) {
        self.do_startup_merge().await;
        self.state = EngineState::Running;

        loop {
            match self.state.clone() {
                EngineState::Stopped => break,
                EngineState::Paused | EngineState::ErrorHold { .. } => match self.commands.recv().await {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                EngineState::Backoff { attempt } => {
                    let delay = backoff_delay(attempt, self.config.backoff_base, self.config.backoff_ceiling);
                    let next_try_at = Utc::now() + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::zero());
                    self.emit(StatusKind::Backoff { attempt, next_try_at });
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            self.state = EngineState::Running;
                        }
                        cmd = self.commands.recv() => match cmd {
                            Some(cmd) => self.handle_command(cmd).await,
                            None => break,
                        }
                    }
                }
                EngineState::Starting => {
                    self.state = EngineState::Running;
                }
                EngineState::Running => {
                    tokio::select! {
                        cmd = self.commands.recv() => match cmd {
                            Some(cmd) => self.handle_command(cmd).await,
                            None => break,
                        }
                        _ = tokio::time::sleep(self.config.poll_interval) => {
                            self.maybe_commit().await;
                        }
                    }
                }
            }
        }
        debug!(universe = %self.config.universe_slug, "engine task exiting");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::UpdateState { state, drag_active } => {
                self.store_state = Some(state);
                self.dirty = true;
                self.drag_active = drag_active;
            }
            Command::ForceCommit { state, reply } => {
                self.store_state = Some(state);
                self.dirty = true;
                let result = self.commit_once(true).await;
                let _ = reply.send(result);
            }
            Command::Pause => {
                if !matches!(self.state, EngineState::ErrorHold { .. } | EngineState::Stopped) {
                    self.state = EngineState::Paused;
                    self.emit(StatusKind::Paused);
                }
            }
            Command::Resume => {
                if self.state == EngineState::Paused {
                    self.state = EngineState::Running;
                }
            }
            Command::Restart => {
                if matches!(self.state, EngineState::ErrorHold { .. } | EngineState::Backoff { .. }) {
                    self.state = EngineState::Running;
                }
            }
            Command::SetSourceOfTruth(mode) => {
                self.config.source_of_truth = mode;
            }
            Command::Stop => {
                self.state = EngineState::Stopped;
            }
        }
    }

    async fn maybe_commit(&mut self) {
        if !self.dirty {
            return;
        }
        if let Some(until) = self.frozen_until {
            if Utc::now() < until {
                return;
            }
            self.frozen_until = None;
        }
        let debounce = if self.drag_active {
            self.config.debounce_while_dragging
        } else {
            self.config.debounce
        };
        let elapsed_ok = match self.last_commit_attempt_at {
            Some(t) => t.elapsed() >= debounce,
            None => true,
        };
        if !elapsed_ok {
            return;
        }
        let _ = self.commit_once(false).await;
    }

    /// Encode the current state, skip if unchanged since the last commit,
    /// then push it through the provider, handling conflict/rate-limit/
    /// auth/network outcomes. `force` bypasses the fingerprint no-op skip
    /// (used by `force_commit`).
    async fn commit_once(&mut self, force: bool) -> CoreResult<String> {
        let Some(state) = self.store_state.clone() else {
            return Err(CoreError::InvariantViolation("engine has no state to commit".into()));
        };
        self.last_commit_attempt_at = Some(Instant::now());

        let universe = usc_codec::DocumentUniverseInfo {
            slug: self.config.universe_slug.clone(),
            name: self.config.universe_name.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        };
        let document = usc_codec::encode(&state, universe, self.last_document.as_ref());
        let fingerprint = usc_codec::fingerprint(&document);

        if !force {
            if let Some(last) = &self.last_committed_fingerprint {
                if last == &fingerprint {
                    self.dirty = false;
                    return Ok(self.last_known_sha.clone().unwrap_or_default());
                }
            }
        }

        let bytes = usc_codec::canonical_bytes(&document);
        let mut conflict_retried = false;
        let mut auth_retried = false;

        loop {
            self.emit(StatusKind::Committing);
            match self
                .provider
                .put_file(&self.config.content_path, bytes.clone(), self.last_known_sha.as_deref())
                .await
            {
                Ok(put_result) => {
                    self.last_known_sha = Some(put_result.new_sha.clone());
                    self.last_committed_fingerprint = Some(fingerprint);
                    self.last_document = Some(document.clone());
                    self.dirty = false;
                    self.state = EngineState::Running;
                    self.emit(StatusKind::Committed { sha: put_result.new_sha.clone() });
                    return Ok(put_result.new_sha);
                }
                Err(CoreError::Conflict) => {
                    if conflict_retried {
                        self.enter_error_hold("conflict");
                        return Err(CoreError::Conflict);
                    }
                    conflict_retried = true;
                    match self.resolve_conflict().await {
                        Ok(ConflictOutcome::Resolved { new_sha }) => {
                            self.last_known_sha = Some(new_sha.clone());
                            return Ok(new_sha);
                        }
                        Ok(ConflictOutcome::RetryWithSha { new_sha }) => {
                            self.last_known_sha = Some(new_sha);
                            continue;
                        }
                        Err(e) => {
                            self.enter_error_hold("conflict");
                            return Err(e);
                        }
                    }
                }
                Err(CoreError::RateLimited { retry_after }) => {
                    let until = Utc::now() + ChronoDuration::from_std(retry_after).unwrap_or_else(|_| ChronoDuration::zero());
                    if let Err(e) = self.rate_limiter.freeze(self.config.modality, until).await {
                        warn!(error = %e, "could not freeze rate limiter bucket after a rate_limited response");
                    }
                    self.frozen_until = Some(until);
                    return Err(CoreError::RateLimited { retry_after });
                }
                Err(CoreError::Unauthorized) => {
                    if auth_retried {
                        self.enter_error_hold("unauthorized");
                        return Err(CoreError::Unauthorized);
                    }
                    auth_retried = true;
                    if self.token_source.force_refresh(self.config.modality).await.is_err() {
                        self.enter_error_hold("unauthorized");
                        return Err(CoreError::Unauthorized);
                    }
                    continue;
                }
                Err(CoreError::Network(msg)) => {
                    self.enter_backoff();
                    return Err(CoreError::Network(msg));
                }
                Err(CoreError::Server(msg)) => {
                    self.enter_backoff();
                    return Err(CoreError::Server(msg));
                }
                Err(other) => {
                    self.enter_error_hold("error");
                    return Err(other);
                }
            }
        }
    }

    /// Resolve a `put_file` conflict per the configured `sourceOfTruth`.
    /// `Git` authoritative: the remote wins outright — adopt it as the new
    /// in-memory state, discarding the local edit that caused the conflict
    /// (the same semantics as a startup `LoadRemote` decision). `Local`
    /// authoritative: the local edit wins — re-read the remote's current sha
    /// and retry the same write once.
    async fn resolve_conflict(&mut self) -> CoreResult<ConflictOutcome> {
        let remote = self.provider.get_file(&self.config.content_path).await?;
        match self.config.source_of_truth {
            SourceOfTruth::Git => {
                let remote_doc: RedstringDocument = serde_json::from_slice(&remote.bytes)
                    .map_err(|e| CoreError::Server(format!("remote document failed to parse: {e}")))?;
                let (state, warnings) = usc_codec::decode(&remote_doc);
                for warning in &warnings {
                    warn!(universe = %self.config.universe_slug, %warning, "warning decoding remote document during conflict resolution");
                }
                self.store_state = Some(state);
                self.last_committed_fingerprint = Some(usc_codec::fingerprint(&remote_doc));
                self.last_document = Some(remote_doc);
                self.dirty = false;
                self.emit_conflict(Some("sourceOfTruth=git: adopted remote, local edit discarded".into()));
                Ok(ConflictOutcome::Resolved { new_sha: remote.sha })
            }
            SourceOfTruth::Local => {
                self.emit_conflict(Some("sourceOfTruth=local: overwriting remote with local edit".into()));
                Ok(ConflictOutcome::RetryWithSha { new_sha: remote.sha })
            }
        }
    }

    async fn do_startup_merge(&mut self) {
        let in_memory_is_empty = self
            .store_state
            .as_ref()
            .map(|s| s.prototypes.is_empty() && s.graphs.is_empty() && s.edges.is_empty())
            .unwrap_or(true);
        let decision = decide_merge(in_memory_is_empty, self.config.source_of_truth);

        if decision == MergeDecision::LoadRemote {
            match self.provider.get_file(&self.config.content_path).await {
                Ok(file) => match serde_json::from_slice::<RedstringDocument>(&file.bytes) {
                    Ok(doc) => {
                        let (state, warnings) = usc_codec::decode(&doc);
                        for warning in &warnings {
                            warn!(universe = %self.config.universe_slug, %warning, "warning decoding remote document on startup");
                        }
                        self.last_committed_fingerprint = Some(usc_codec::fingerprint(&doc));
                        self.last_document = Some(doc);
                        self.store_state = Some(state);
                        self.last_known_sha = Some(file.sha);
                        self.dirty = false;
                    }
                    Err(e) => {
                        warn!(universe = %self.config.universe_slug, error = %e, "remote document failed to parse on startup");
                    }
                },
                Err(CoreError::NotFound(_)) => {
                    debug!(universe = %self.config.universe_slug, "no remote document yet on startup");
                }
                Err(e) => {
                    warn!(universe = %self.config.universe_slug, error = %e, "could not load remote document on startup");
                }
            }
        }

        info!(universe = %self.config.universe_slug, decision = decision.describe(), "engine startup merge decided");
        let event = StatusEvent::new(
            EventSource::Engine(self.config.universe_slug.clone()),
            StatusKind::Idle,
            format!("startup: {}", decision.describe()),
        )
        .with_context(serde_json::json!({ "merge_decision": decision.describe() }));
        let _ = self.bus.publish(event);
        let _ = self.status_tx.send(StatusSnapshot {
            kind: StatusKind::Idle,
            updated_at: Utc::now(),
        });
    }

    fn enter_backoff(&mut self) {
        let attempt = match self.state {
            EngineState::Backoff { attempt } => attempt + 1,
            _ => 1,
        };
        if attempt > self.config.backoff_max_attempts {
            self.enter_error_hold("backoff_exhausted");
        } else {
            self.state = EngineState::Backoff { attempt };
        }
    }

    fn enter_error_hold(&mut self, kind: &str) {
        self.state = EngineState::ErrorHold { kind: kind.to_string() };
        self.emit(StatusKind::Error {
            error_kind: kind.to_string(),
            message: format!("engine entered error hold: {kind}"),
            recovery_hint: Some(recovery_hint_for(kind).to_string()),
        });
    }

    fn emit(&self, kind: StatusKind) {
        let event = StatusEvent::new(EventSource::Engine(self.config.universe_slug.clone()), kind.clone(), describe_kind(&kind));
        let _ = self.bus.publish(event);
        let _ = self.status_tx.send(StatusSnapshot {
            kind,
            updated_at: Utc::now(),
        });
    }

    fn emit_conflict(&self, resolution: Option<String>) {
        self.emit(StatusKind::Conflict { resolution });
    }
}

fn recovery_hint_for(kind: &str) -> &'static str {
    match kind {
        "unauthorized" => "reconnect",
        "conflict" => "resolve_conflict",
        _ => "restart_sync",
    }
}

fn describe_kind(kind: &StatusKind) -> String {
    match kind {
        StatusKind::Idle => "engine idle".into(),
        StatusKind::Committing => "committing".into(),
        StatusKind::Committed { sha } => format!("committed {sha}"),
        StatusKind::Paused => "paused".into(),
        StatusKind::Conflict { .. } => "conflict detected".into(),
        StatusKind::Backoff { attempt, .. } => format!("backoff attempt {attempt}"),
        StatusKind::Error { error_kind, .. } => format!("error: {error_kind}"),
        other => format!("{other:?}"),
    }
}
