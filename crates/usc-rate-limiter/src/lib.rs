#![forbid(unsafe_code)]

//! **usc-rate-limiter** – Per-modality token-bucket gate in front of every
//! `usc-provider` HTTP call.
//!
//! A single process-wide gate guards two independent buckets, one per
//! [`Modality`]. Each bucket is configured with `{capacity,
//! refill_per_second, burst}`. Unlike a conventional web-server rate
//! limiter keyed by IP/user/endpoint, there is exactly one dimension here:
//! which credential the outbound call will use.
//!
//! * [`acquire`](RateLimiter::acquire) — suspend the caller until a permit
//!   is available or the bucket is frozen.
//! * [`freeze`](RateLimiter::freeze) — stop issuing permits for a modality
//!   until a deadline, driven by a remote `rate_limited(retry_after)`
//!   response.
//! * [`stats`](RateLimiter::stats) — usage snapshot for the UI and for the
//!   Engine's modality-selection logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use usc_types::Modality;

pub mod algorithms;
pub mod storage;

pub use algorithms::TokenBucketLimiter;
pub use storage::DashMapRateLimitStorage;

/// Errors that can occur during rate limiter operations.
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Storage(#[from] anyhow::Error),
    /// A bucket was configured with an invalid capacity or refill rate.
    #[error("invalid bucket configuration: {0}")]
    InvalidConfig(String),
    /// The deadline passed before a permit became available.
    #[error("acquire deadline elapsed waiting for a {0} permit")]
    DeadlineElapsed(Modality),
}

/// Static configuration for one modality's bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum tokens the bucket can hold.
    pub capacity: u64,
    /// Tokens added per second.
    pub refill_per_second: f64,
    /// Additional burst allowance above the steady-state capacity.
    pub burst: u64,
}

impl BucketConfig {
    /// Total tokens the bucket may briefly hold, including burst.
    pub fn effective_capacity(&self) -> u64 {
        self.capacity + self.burst
    }
}

/// Usage snapshot for a single modality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStats {
    /// Tokens currently consumed (capacity minus tokens available).
    pub used: u64,
    /// Configured capacity.
    pub limit: u64,
    /// `used / limit` as a percentage.
    pub percent_used: f64,
    /// If frozen, the instant the freeze lifts.
    pub frozen_until: Option<DateTime<Utc>>,
}

/// Proof that a caller may make one outbound call for a given modality.
///
/// `Permit` carries no capability beyond having been returned by
/// `acquire` — it is not reusable and is not `Clone`.
#[derive(Debug)]
pub struct Permit {
    modality: Modality,
    issued_at: DateTime<Utc>,
}

impl Permit {
    /// Issue a permit directly, timestamped now. Exposed for
    /// [`RateLimiter`] implementations outside this crate (test doubles,
    /// alternative backends) — the real [`TokenBucketLimiter`] builds these
    /// internally after a successful consume.
    pub fn new(modality: Modality) -> Self {
        Self { modality, issued_at: Utc::now() }
    }

    /// Which modality this permit was issued for.
    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// When the permit was issued.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Main rate limiter interface.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Suspend the caller until a permit for `modality` is available, or
    /// until `deadline` passes, whichever comes first.
    async fn acquire(
        &self,
        modality: Modality,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Permit, RateLimitError>;

    /// Freeze the modality's bucket until `until`, per a remote
    /// `rate_limited(retry_after)` response.
    async fn freeze(&self, modality: Modality, until: DateTime<Utc>) -> Result<(), RateLimitError>;

    /// Usage snapshot for `modality`.
    async fn stats(&self, modality: Modality) -> Result<RateLimitStats, RateLimitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_config_effective_capacity_includes_burst() {
        let cfg = BucketConfig {
            capacity: 100,
            refill_per_second: 1.0,
            burst: 10,
        };
        assert_eq!(cfg.effective_capacity(), 110);
    }
}
