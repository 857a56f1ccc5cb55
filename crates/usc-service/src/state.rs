//! [`AppState`]: every process-wide singleton, constructed once in `main`
//! and shared by both the HTTP router and the CLI subcommands.

use std::sync::Arc;

use usc_auth::PersistentAuth;
use usc_bus::StatusBus;
use usc_manager::UniverseManager;
use usc_rate_limiter::RateLimiter;
use usc_store::SqliteStore;

use crate::refresher::GitHubTokenRefresher;

/// Everything a command implementation needs, constructed once at startup
/// and handed to every HTTP handler and CLI subcommand identically — there
/// is exactly one command implementation, two transports.
pub struct AppState {
    /// The universe registry and active-universe state machine.
    pub manager: Arc<UniverseManager<SqliteStore>>,
    /// Durable credential store with refresh and health-check scheduling.
    pub auth: Arc<PersistentAuth<SqliteStore, GitHubTokenRefresher>>,
    /// Process-wide status event bus.
    pub bus: Arc<dyn StatusBus>,
    /// Process-wide rate limiter gate, exposed for the `auth-status` /
    /// rate-limit usage surfaced to the UI.
    pub rate_limiter: Arc<dyn RateLimiter>,
}
