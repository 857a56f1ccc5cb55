//! [`PersistentAuth`]: the durable credential store with refresh and
//! health-check scheduling.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use usc_bus::StatusBus;
use usc_store::{get_json, put_json, Store};
use usc_types::{Credential, EventSource, Modality, Result as CoreResult, StatusEvent, StatusKind};

use crate::refresher::{HealthStatus, TokenRefresher};

/// How long a failed refresh keeps subsequent attempts quiet before trying
/// again.
const DEFAULT_REFRESH_COOLDOWN: ChronoDuration = ChronoDuration::minutes(5);

/// Default spacing between background health probes.
const DEFAULT_HEALTH_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

fn storage_key(modality: Modality) -> String {
    format!("credential:{modality}")
}

struct CachedCredential {
    credential: Credential,
    /// The bearer token, held under `secrecy::Secret` so it does not
    /// linger in a `Debug` dump or get copied past its `Drop` zeroization.
    secure_token: Secret<String>,
}

#[derive(Clone, Copy)]
struct FailureState {
    last_failure_at: DateTime<Utc>,
    attempted_refresh: bool,
}

/// Durable credential store with transparent refresh and health-check
/// scheduling.
pub struct PersistentAuth<St, R>
where
    St: Store + 'static,
    R: TokenRefresher + 'static,
{
    store: Arc<St>,
    refresher: Arc<R>,
    bus: Arc<dyn StatusBus>,
    cache: DashMap<Modality, CachedCredential>,
    failures: DashMap<Modality, FailureState>,
    health_tasks: DashMap<Modality, JoinHandle<()>>,
    refresh_cooldown: ChronoDuration,
    health_check_interval: std::time::Duration,
}

impl<St, R> PersistentAuth<St, R>
where
    St: Store + 'static,
    R: TokenRefresher + 'static,
{
    /// Build a new, empty auth manager. Call [`Self::auto_connect`] once at
    /// startup to load any durable credentials.
    pub fn new(store: Arc<St>, refresher: Arc<R>, bus: Arc<dyn StatusBus>) -> Self {
        Self {
            store,
            refresher,
            bus,
            cache: DashMap::new(),
            failures: DashMap::new(),
            health_tasks: DashMap::new(),
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }

    /// Override the refresh cooldown and health-check interval (tests use
    /// this to avoid multi-minute waits).
    pub fn with_timing(
        mut self,
        refresh_cooldown: ChronoDuration,
        health_check_interval: std::time::Duration,
    ) -> Self {
        self.refresh_cooldown = refresh_cooldown;
        self.health_check_interval = health_check_interval;
        self
    }

    fn publish(&self, kind: StatusKind, message: impl Into<String>) {
        let _ = self.bus.publish(StatusEvent::new(EventSource::Auth, kind, message));
    }

    fn insert_cache(&self, modality: Modality, credential: Credential) {
        let secure_token = Secret::new(credential.access_token().to_string());
        self.cache.insert(
            modality,
            CachedCredential {
                credential,
                secure_token,
            },
        );
        self.failures.remove(&modality);
    }

    /// On process startup, load any durable credential for every modality
    /// and validate it before this auth manager announces itself as
    /// authenticated for that modality.
    pub async fn auto_connect(self: &Arc<Self>) -> CoreResult<()> {
        for modality in [Modality::OAuth, Modality::AppInstallation] {
            let loaded: Option<Credential> = get_json(self.store.as_ref(), &storage_key(modality))
                .await
                .map_err(|e| usc_types::CoreError::Server(e.to_string()))?;

            let Some(credential) = loaded else {
                continue;
            };

            match self.refresher.probe_health(&credential).await {
                Ok(HealthStatus::Healthy) => {
                    self.insert_cache(modality, credential);
                    self.publish(StatusKind::TokenValidated, format!("{modality} credential validated on startup"));
                    self.spawn_health_check_loop(modality);
                }
                Ok(HealthStatus::Degraded) => {
                    self.insert_cache(modality, credential);
                    self.publish(StatusKind::AuthDegraded, format!("{modality} credential degraded on startup"));
                    self.spawn_health_check_loop(modality);
                }
                Ok(HealthStatus::Failed) | Err(_) => {
                    self.publish(StatusKind::AuthExpired, format!("{modality} credential failed validation on startup"));
                }
            }
        }
        Ok(())
    }

    /// Persist a freshly obtained or refreshed credential, cache it, clear
    /// any recorded failure state, and (re)start its health-check loop.
    pub async fn store_tokens(self: &Arc<Self>, credential: Credential) -> CoreResult<()> {
        let modality = credential.modality();
        put_json(self.store.as_ref(), &storage_key(modality), &credential)
            .await
            .map_err(|e| usc_types::CoreError::Server(e.to_string()))?;

        self.insert_cache(modality, credential);
        self.publish(StatusKind::TokenStored, format!("{modality} credential stored"));
        self.spawn_health_check_loop(modality);
        Ok(())
    }

    /// Return a currently-valid token for `modality`, refreshing
    /// transparently if the cached credential has expired.
    pub async fn get_token(self: &Arc<Self>, modality: Modality) -> CoreResult<String> {
        let cached_expired_or_absent = match self.cache.get(&modality) {
            Some(entry) if !entry.credential.is_expired(Utc::now()) => {
                return Ok(entry.secure_token.expose_secret().clone());
            }
            Some(entry) => Some(entry.credential.clone()),
            None => None,
        };

        let Some(expired_credential) = cached_expired_or_absent else {
            return Err(usc_types::CoreError::ReauthRequired);
        };

        if let Some(failure) = self.failures.get(&modality) {
            let within_cooldown = Utc::now() - failure.last_failure_at < self.refresh_cooldown;
            if failure.attempted_refresh && within_cooldown {
                self.publish(
                    StatusKind::ReauthRequired,
                    format!("{modality} refresh in cooldown after a prior failure"),
                );
                return Err(usc_types::CoreError::ReauthRequired);
            }
        }

        match self.refresher.refresh(&expired_credential).await {
            Ok(refreshed) => {
                let token = refreshed.access_token().to_string();
                self.store_tokens(refreshed).await?;
                self.publish(StatusKind::TokenValidated, format!("{modality} credential validated after refresh"));
                Ok(token)
            }
            Err(_) => {
                self.failures.insert(
                    modality,
                    FailureState {
                        last_failure_at: Utc::now(),
                        attempted_refresh: true,
                    },
                );
                self.publish(
                    StatusKind::ReauthRequired,
                    format!("{modality} refresh failed, reauthorization required"),
                );
                Err(usc_types::CoreError::ReauthRequired)
            }
        }
    }

    /// Force a refresh of `modality`'s credential regardless of its cached
    /// expiry, bypassing the cooldown check that guards [`Self::get_token`].
    /// Callers that just saw the remote reject a token it believed was
    /// still valid (a hard 401, not an expiry) use this instead of
    /// `get_token` so a single stale-but-unexpired cache entry cannot mask
    /// the need to reauthenticate.
    pub async fn force_refresh(self: &Arc<Self>, modality: Modality) -> CoreResult<String> {
        let Some(credential) = self.cache.get(&modality).map(|entry| entry.credential.clone()) else {
            return Err(usc_types::CoreError::ReauthRequired);
        };

        match self.refresher.refresh(&credential).await {
            Ok(refreshed) => {
                let token = refreshed.access_token().to_string();
                self.store_tokens(refreshed).await?;
                self.publish(StatusKind::TokenValidated, format!("{modality} credential validated after forced refresh"));
                Ok(token)
            }
            Err(_) => {
                self.failures.insert(
                    modality,
                    FailureState {
                        last_failure_at: Utc::now(),
                        attempted_refresh: true,
                    },
                );
                self.publish(
                    StatusKind::ReauthRequired,
                    format!("{modality} forced refresh failed, reauthorization required"),
                );
                Err(usc_types::CoreError::ReauthRequired)
            }
        }
    }

    /// Probe the remote host for `modality`'s current credential and
    /// publish the classification.
    pub async fn health_check(&self, modality: Modality) -> CoreResult<HealthStatus> {
        let credential = self
            .cache
            .get(&modality)
            .map(|entry| entry.credential.clone())
            .ok_or(usc_types::CoreError::ReauthRequired)?;

        let status = self
            .refresher
            .probe_health(&credential)
            .await
            .unwrap_or(HealthStatus::Failed);

        self.publish(
            StatusKind::HealthCheck {
                status: status.to_string(),
            },
            format!("{modality} health check: {status}"),
        );

        match status {
            HealthStatus::Degraded => {
                self.publish(StatusKind::AuthDegraded, format!("{modality} credential degraded"));
            }
            HealthStatus::Failed => {
                self.publish(StatusKind::AuthExpired, format!("{modality} credential failed health check"));
            }
            HealthStatus::Healthy => {}
        }

        Ok(status)
    }

    fn spawn_health_check_loop(self: &Arc<Self>, modality: Modality) {
        if self.health_tasks.contains_key(&modality) {
            return;
        }

        let this = Arc::clone(self);
        let period = self.health_check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                debug!(%modality, "running scheduled auth health check");
                match this.health_check(modality).await {
                    Ok(status) => info!(%modality, %status, "auth health check completed"),
                    Err(e) => {
                        warn!(%modality, error = %e, "auth health check could not run");
                    }
                }
            }
        });

        self.health_tasks.insert(modality, handle);
    }
}

impl<St, R> Drop for PersistentAuth<St, R>
where
    St: Store + 'static,
    R: TokenRefresher + 'static,
{
    fn drop(&mut self) {
        for entry in self.health_tasks.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use usc_bus::InMemoryStatusBus;
    use usc_store::MemoryStore;
    use usc_types::{AppInstallationCredential, OAuthCredential};

    struct StubRefresher {
        refresh_result: std::sync::Mutex<Option<CoreResult<Credential>>>,
        health_result: HealthStatus,
    }

    #[async_trait::async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(&self, _credential: &Credential) -> CoreResult<Credential> {
            self.refresh_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(usc_types::CoreError::ReauthRequired))
        }

        async fn probe_health(&self, _credential: &Credential) -> CoreResult<HealthStatus> {
            Ok(self.health_result)
        }
    }

    fn oauth_credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential::OAuth(OAuthCredential {
            user_login: "octocat".into(),
            access_token: "tok-1".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at,
            scopes: vec!["repo".into()],
        })
    }

    #[tokio::test]
    async fn store_tokens_then_get_token_returns_cached_value() {
        let auth = Arc::new(PersistentAuth::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(None),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        auth.store_tokens(oauth_credential(None)).await.unwrap();
        let token = auth.get_token(Modality::OAuth).await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn get_token_without_any_credential_requires_reauth() {
        let auth = Arc::new(PersistentAuth::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(None),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        let result = auth.get_token(Modality::OAuth).await;
        assert!(matches!(result, Err(usc_types::CoreError::ReauthRequired)));
    }

    #[tokio::test]
    async fn expired_credential_refreshes_transparently() {
        let refreshed = oauth_credential(None);
        let auth = Arc::new(PersistentAuth::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(Some(Ok(refreshed))),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        let expired = oauth_credential(Some(Utc::now() - Duration::minutes(1)));
        auth.store_tokens(expired).await.unwrap();

        let token = auth.get_token(Modality::OAuth).await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn failed_refresh_enters_cooldown_instead_of_looping() {
        let auth = Arc::new(PersistentAuth::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(None),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        let expired = oauth_credential(Some(Utc::now() - Duration::minutes(1)));
        auth.store_tokens(expired).await.unwrap();

        let first = auth.get_token(Modality::OAuth).await;
        assert!(matches!(first, Err(usc_types::CoreError::ReauthRequired)));

        let second = auth.get_token(Modality::OAuth).await;
        assert!(matches!(second, Err(usc_types::CoreError::ReauthRequired)));
    }

    #[tokio::test]
    async fn force_refresh_replaces_a_still_unexpired_credential() {
        let refreshed = oauth_credential(None);
        let auth = Arc::new(PersistentAuth::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(Some(Ok(refreshed))),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        let unexpired = oauth_credential(Some(Utc::now() + Duration::hours(1)));
        auth.store_tokens(unexpired).await.unwrap();

        let token = auth.force_refresh(Modality::OAuth).await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn force_refresh_without_any_credential_requires_reauth() {
        let auth = Arc::new(PersistentAuth::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(None),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        let result = auth.force_refresh(Modality::OAuth).await;
        assert!(matches!(result, Err(usc_types::CoreError::ReauthRequired)));
    }

    #[tokio::test]
    async fn auto_connect_loads_durable_credentials_and_validates_them() {
        let store = Arc::new(MemoryStore::new());
        let credential = Credential::AppInstallation(AppInstallationCredential {
            installation_id: 42,
            account: "acme".into(),
            access_token: "install-tok".into(),
            expires_at: Utc::now() + Duration::hours(1),
            repositories: vec!["acme/universe".into()],
        });
        put_json(store.as_ref(), &storage_key(Modality::AppInstallation), &credential)
            .await
            .unwrap();

        let auth = Arc::new(PersistentAuth::new(
            store,
            Arc::new(StubRefresher {
                refresh_result: std::sync::Mutex::new(None),
                health_result: HealthStatus::Healthy,
            }),
            Arc::new(InMemoryStatusBus::new(16)),
        ));

        auth.auto_connect().await.unwrap();
        let token = auth.get_token(Modality::AppInstallation).await.unwrap();
        assert_eq!(token, "install-tok");
    }
}
