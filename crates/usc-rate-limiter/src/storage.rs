//! Storage backends for rate limiter bucket state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use usc_types::Modality;

/// Persisted state for one modality's bucket.
#[derive(Debug, Clone, Copy)]
pub struct BucketRecord {
    /// Tokens available as of `last_refill`.
    pub tokens: f64,
    /// Last time tokens were refilled.
    pub last_refill: DateTime<Utc>,
    /// If set, `acquire` must suspend until this instant regardless of
    /// token availability.
    pub frozen_until: Option<DateTime<Utc>>,
}

/// Storage seam for rate limiter bucket state.
///
/// The only implementation shipped is in-memory; the trait exists so a
/// persistent backend could be swapped in later without touching
/// [`crate::algorithms::TokenBucketLimiter`].
#[async_trait]
pub trait RateLimitStorage: Send + Sync {
    /// Load the current record for `modality`, if one has been written.
    async fn load(&self, modality: Modality) -> anyhow::Result<Option<BucketRecord>>;

    /// Persist `record` for `modality`.
    async fn save(&self, modality: Modality, record: BucketRecord) -> anyhow::Result<()>;
}

/// In-memory bucket storage, keyed by [`Modality`].
#[derive(Debug, Default)]
pub struct DashMapRateLimitStorage {
    data: DashMap<Modality, BucketRecord>,
}

impl DashMapRateLimitStorage {
    /// Create an empty storage instance.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStorage for DashMapRateLimitStorage {
    async fn load(&self, modality: Modality) -> anyhow::Result<Option<BucketRecord>> {
        Ok(self.data.get(&modality).map(|r| *r))
    }

    async fn save(&self, modality: Modality, record: BucketRecord) -> anyhow::Result<()> {
        self.data.insert(modality, record);
        Ok(())
    }
}
