//! The seam between `usc-auth` and whatever can actually talk to a git
//! host's OAuth/installation-token endpoints. `usc-auth` does not depend on
//! `usc-provider` — a credential refresher is injected as an `Arc<dyn
//! TokenRefresher>` by the binary that wires the two together.

use usc_types::{Credential, Result};

/// Classification of a credential's current usability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The credential works.
    Healthy,
    /// The credential works but is showing early signs of trouble (e.g.
    /// close to expiry, elevated error rate on the probe call).
    Degraded,
    /// The credential no longer works.
    Failed,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded => f.write_str("degraded"),
            HealthStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Capability to refresh and probe a credential against its remote host.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange an expiring (or already-expired) credential for a fresh
    /// one. Returns [`usc_types::CoreError::ReauthRequired`] when the
    /// provider can no longer refresh on the caller's behalf.
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Lightweight liveness probe against the remote host (e.g. GitHub's
    /// "authenticated user" endpoint).
    async fn probe_health(&self, credential: &Credential) -> Result<HealthStatus>;
}
