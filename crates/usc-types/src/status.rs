//! `StatusEvent` fan-out payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which subsystem emitted a [`StatusEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// A per-universe git sync engine, identified by slug.
    Engine(String),
    /// The universe manager.
    Manager,
    /// The persistent auth substrate.
    Auth,
    /// The rate limiter.
    RateLimiter,
}

/// The kind of status being reported, collapsing the event vocabularies of
/// the sync engine, the auth substrate, and the universe manager into one
/// enum so a single bus can carry all of them in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusKind {
    /// Engine is idle, dirty flag clear.
    Idle,
    /// Engine is in the middle of committing.
    Committing,
    /// Engine committed successfully.
    Committed {
        /// The new blob/commit sha.
        sha: String,
    },
    /// Engine is paused.
    Paused,
    /// A conflict was detected (and possibly auto-resolved).
    Conflict {
        /// Human-readable description of the resolution taken, if any.
        resolution: Option<String>,
    },
    /// Engine entered exponential backoff.
    Backoff {
        /// Which backoff attempt this is.
        attempt: u32,
        /// When the next retry will fire.
        next_try_at: DateTime<Utc>,
    },
    /// A fatal-to-Engine error occurred; `ErrorHold` was entered.
    Error {
        /// The error kind, as a short machine-readable tag.
        error_kind: String,
        /// Human message.
        message: String,
        /// Recovery hint (`reconnect`, `resolve_conflict`, `restart_sync`).
        recovery_hint: Option<String>,
    },
    /// Auth token was stored.
    TokenStored,
    /// Auth token was validated.
    TokenValidated,
    /// Auth credential expired.
    AuthExpired,
    /// Auth cannot recover automatically.
    ReauthRequired,
    /// Periodic auth health probe result.
    HealthCheck {
        /// `healthy`, `degraded`, or `failed`.
        status: String,
    },
    /// Auth health degraded but not yet failed.
    AuthDegraded,
    /// The active universe changed.
    ActiveChanged {
        /// The newly active universe's slug.
        slug: String,
    },
}

/// One ordered entry in the status stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Which subsystem emitted this event.
    pub source: EventSource,
    /// What happened.
    pub kind: StatusKind,
    /// Human-readable summary, independent of `kind`'s structured fields.
    pub message: String,
    /// Wall-clock emission time.
    pub timestamp: DateTime<Utc>,
    /// Free-form structured context (e.g. the merge decision on load).
    pub context: Option<Value>,
}

impl StatusEvent {
    /// Construct an event stamped with the current time and no context.
    pub fn new(source: EventSource, kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            context: None,
        }
    }

    /// Attach structured context to an event.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}
