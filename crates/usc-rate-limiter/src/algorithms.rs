//! Token bucket algorithm used by [`TokenBucketLimiter`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use usc_types::Modality;

use crate::storage::{BucketRecord, RateLimitStorage};
use crate::{BucketConfig, Permit, RateLimitError, RateLimitStats, RateLimiter};

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// Token bucket rate limiter keyed by [`Modality`]. The token bucket
/// algorithm allows brief bursts while maintaining an average rate; tokens
/// refill continuously and each `acquire` consumes one. A frozen bucket
/// refuses every `acquire` until its freeze lifts, irrespective of token
/// availability.
pub struct TokenBucketLimiter<S>
where
    S: RateLimitStorage,
{
    storage: Arc<S>,
    configs: HashMap<Modality, BucketConfig>,
}

impl<S> TokenBucketLimiter<S>
where
    S: RateLimitStorage,
{
    /// Build a limiter from a storage backend and a configuration per
    /// modality. Every [`Modality`] variant must have a configuration;
    /// missing ones fall back to a conservative default.
    pub fn new(storage: Arc<S>, configs: HashMap<Modality, BucketConfig>) -> Self {
        Self { storage, configs }
    }

    fn config_for(&self, modality: Modality) -> BucketConfig {
        self.configs.get(&modality).copied().unwrap_or(BucketConfig {
            capacity: 60,
            refill_per_second: 1.0,
            burst: 0,
        })
    }

    async fn load_or_init(&self, modality: Modality) -> Result<BucketRecord, RateLimitError> {
        let config = self.config_for(modality);
        match self
            .storage
            .load(modality)
            .await
            .map_err(RateLimitError::Storage)?
        {
            Some(record) => Ok(record),
            None => Ok(BucketRecord {
                tokens: config.effective_capacity() as f64,
                last_refill: Utc::now(),
                frozen_until: None,
            }),
        }
    }

    fn refill(record: &mut BucketRecord, config: &BucketConfig, now: DateTime<Utc>) {
        let elapsed = (now - record.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        let added = elapsed * config.refill_per_second;
        record.tokens = (record.tokens + added).min(config.effective_capacity() as f64);
        record.last_refill = now;
    }

    async fn try_consume_once(
        &self,
        modality: Modality,
    ) -> Result<Option<DateTime<Utc>>, RateLimitError> {
        let config = self.config_for(modality);
        let now = Utc::now();
        let mut record = self.load_or_init(modality).await?;

        if let Some(frozen_until) = record.frozen_until {
            if now < frozen_until {
                return Ok(Some(frozen_until));
            }
            record.frozen_until = None;
        }

        Self::refill(&mut record, &config, now);

        if record.tokens >= 1.0 {
            record.tokens -= 1.0;
            self.storage
                .save(modality, record)
                .await
                .map_err(RateLimitError::Storage)?;
            Ok(None)
        } else {
            self.storage
                .save(modality, record)
                .await
                .map_err(RateLimitError::Storage)?;
            let seconds_needed = (1.0 - record.tokens) / config.refill_per_second;
            let wait_until = now + chrono::Duration::milliseconds((seconds_needed * 1000.0) as i64);
            Ok(Some(wait_until))
        }
    }
}

#[async_trait]
impl<S> RateLimiter for TokenBucketLimiter<S>
where
    S: RateLimitStorage + 'static,
{
    async fn acquire(
        &self,
        modality: Modality,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Permit, RateLimitError> {
        loop {
            match self.try_consume_once(modality).await? {
                None => {
                    return Ok(Permit {
                        modality,
                        issued_at: Utc::now(),
                    });
                }
                Some(wait_until) => {
                    if let Some(deadline) = deadline {
                        if wait_until > deadline {
                            return Err(RateLimitError::DeadlineElapsed(modality));
                        }
                    }
                    debug!(%modality, wait_until = %wait_until, "acquire suspended, waiting for tokens");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn freeze(&self, modality: Modality, until: DateTime<Utc>) -> Result<(), RateLimitError> {
        let mut record = self.load_or_init(modality).await?;
        record.frozen_until = Some(until);
        warn!(%modality, until = %until, "freezing rate limit bucket per remote retry_after");
        self.storage
            .save(modality, record)
            .await
            .map_err(RateLimitError::Storage)
    }

    async fn stats(&self, modality: Modality) -> Result<RateLimitStats, RateLimitError> {
        let config = self.config_for(modality);
        let now = Utc::now();
        let mut record = self.load_or_init(modality).await?;
        Self::refill(&mut record, &config, now);

        let capacity = config.effective_capacity();
        let used = capacity.saturating_sub(record.tokens as u64);
        Ok(RateLimitStats {
            used,
            limit: capacity,
            percent_used: if capacity == 0 {
                0.0
            } else {
                used as f64 / capacity as f64 * 100.0
            },
            frozen_until: record.frozen_until.filter(|until| *until > now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DashMapRateLimitStorage;

    fn configs() -> HashMap<Modality, BucketConfig> {
        let mut map = HashMap::new();
        map.insert(
            Modality::OAuth,
            BucketConfig {
                capacity: 2,
                refill_per_second: 100.0,
                burst: 0,
            },
        );
        map.insert(
            Modality::AppInstallation,
            BucketConfig {
                capacity: 2,
                refill_per_second: 100.0,
                burst: 0,
            },
        );
        map
    }

    #[tokio::test]
    async fn acquire_succeeds_while_tokens_remain() {
        let storage = Arc::new(DashMapRateLimitStorage::new());
        let limiter = TokenBucketLimiter::new(storage, configs());

        let permit = limiter.acquire(Modality::OAuth, None).await.unwrap();
        assert_eq!(permit.modality(), Modality::OAuth);
    }

    #[tokio::test]
    async fn acquire_respects_deadline_when_bucket_is_empty() {
        let storage = Arc::new(DashMapRateLimitStorage::new());
        let mut slow_configs = HashMap::new();
        slow_configs.insert(
            Modality::OAuth,
            BucketConfig {
                capacity: 1,
                refill_per_second: 0.001,
                burst: 0,
            },
        );
        let limiter = TokenBucketLimiter::new(storage, slow_configs);

        limiter.acquire(Modality::OAuth, None).await.unwrap();
        let deadline = Utc::now() + chrono::Duration::milliseconds(50);
        let result = limiter.acquire(Modality::OAuth, Some(deadline)).await;
        assert!(matches!(result, Err(RateLimitError::DeadlineElapsed(_))));
    }

    #[tokio::test]
    async fn freeze_blocks_acquire_until_it_lifts() {
        let storage = Arc::new(DashMapRateLimitStorage::new());
        let limiter = TokenBucketLimiter::new(storage, configs());

        let until = Utc::now() + chrono::Duration::milliseconds(100);
        limiter.freeze(Modality::OAuth, until).await.unwrap();

        let deadline = Utc::now() + chrono::Duration::milliseconds(10);
        let result = limiter.acquire(Modality::OAuth, Some(deadline)).await;
        assert!(matches!(result, Err(RateLimitError::DeadlineElapsed(_))));
    }

    #[tokio::test]
    async fn stats_report_frozen_until_while_active() {
        let storage = Arc::new(DashMapRateLimitStorage::new());
        let limiter = TokenBucketLimiter::new(storage, configs());

        let until = Utc::now() + chrono::Duration::seconds(60);
        limiter.freeze(Modality::AppInstallation, until).await.unwrap();

        let stats = limiter.stats(Modality::AppInstallation).await.unwrap();
        assert!(stats.frozen_until.is_some());
    }
}
