//! The one error enum shared by every component, named by kind rather than
//! by originating subsystem.
//!
//! Every crate above this one resolves its public `Result<T>` to
//! `Result<T, CoreError>`. Lower-level errors (`reqwest`, `sqlx`,
//! `std::io`, `serde_json`) are folded into the appropriate kind at the
//! boundary where they first occur rather than propagated opaquely.

use std::time::Duration;
use thiserror::Error;

/// Canonical error kinds shared by every component of the core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Credential is missing or rejected by the remote.
    #[error("unauthorized")]
    Unauthorized,

    /// Credential modality forbids the requested operation (e.g. repo
    /// creation with an installation token).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An `expected_sha`/optimistic-concurrency check failed.
    #[error("conflict: expected sha did not match remote state")]
    Conflict,

    /// The remote asked the caller to back off until `retry_after` elapses.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the caller must wait before retrying.
        retry_after: Duration,
    },

    /// Transient network failure (timeouts, connection resets).
    #[error("network error: {0}")]
    Network(String),

    /// The remote returned a 5xx-class failure.
    #[error("server error: {0}")]
    Server(String),

    /// The caller's request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The platform does not support the requested capability (e.g. durable
    /// local file access).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A registry or universe invariant would be violated by this
    /// operation; the operation is rejected and state is unchanged.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The operation exceeded its allotted time bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Authentication cannot be recovered automatically; the caller must
    /// invoke the `reconnect` recovery operation.
    #[error("reauthentication required")]
    ReauthRequired,
}

impl CoreError {
    /// Human-readable recovery hint surfaced on status events.
    ///
    /// Returns `None` when the error is not fatal-to-component and carries
    /// no specific recovery action (e.g. it was already auto-recovered).
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            CoreError::Unauthorized | CoreError::ReauthRequired => Some("reconnect"),
            CoreError::Conflict => Some("resolve_conflict"),
            CoreError::Network(_) | CoreError::Server(_) | CoreError::Timeout(_) => {
                Some("restart_sync")
            }
            _ => None,
        }
    }
}

/// Convenience alias used by every crate's public API.
pub type Result<T> = std::result::Result<T, CoreError>;
