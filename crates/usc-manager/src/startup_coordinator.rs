//! Leases for Engine initialization. Prevents two independent callers (e.g.
//! a pre-loader and a UI effect) from each constructing an Engine for the
//! same universe. Leases are short-lived `(Slug, requester_id, Instant)`
//! tuples with a sweep on every
//! [`StartupCoordinator::request_initialization`] call evicting expired ones
//! — no separate reaper task, the same lightweight cooperative-scheduling
//! style the rest of this crate uses.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use usc_types::Slug;

/// Default lease lifetime. A crash mid-initialization is recovered once this
/// elapses.
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

struct Lease {
    requester_id: String,
    expires_at: Instant,
}

/// Grants exactly one live lease per universe slug at a time.
pub struct StartupCoordinator {
    leases: DashMap<Slug, Lease>,
    ttl: Duration,
}

impl Default for StartupCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL)
    }
}

impl StartupCoordinator {
    /// Build a coordinator with an explicit lease lifetime (tests use a
    /// short one to exercise expiry without a real wait).
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
        }
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.leases.retain(|_, lease| lease.expires_at > now);
    }

    /// Ask to become the sole initializer of `universe_slug`'s Engine.
    /// Grants the lease if none is currently held (or the prior one
    /// expired); otherwise denies and the caller adopts the
    /// already-running Engine instead of starting a duplicate.
    pub fn request_initialization(&self, universe_slug: &Slug, requester_id: &str) -> bool {
        self.sweep_expired();
        if let Some(existing) = self.leases.get(universe_slug) {
            return existing.requester_id == requester_id;
        }
        self.leases.insert(
            universe_slug.clone(),
            Lease {
                requester_id: requester_id.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        true
    }

    /// Release a held lease. A no-op if `requester_id` does not hold it.
    pub fn release(&self, universe_slug: &Slug, requester_id: &str) {
        if let Some(entry) = self.leases.get(universe_slug) {
            if entry.requester_id != requester_id {
                return;
            }
        } else {
            return;
        }
        self.leases.remove(universe_slug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(s: &str) -> Slug {
        Slug::new(s).unwrap()
    }

    #[test]
    fn second_requester_is_denied_while_lease_is_held() {
        let coordinator = StartupCoordinator::new(Duration::from_secs(30));
        let s = slug("alpha");
        assert!(coordinator.request_initialization(&s, "preloader"));
        assert!(!coordinator.request_initialization(&s, "ui-effect"));
    }

    #[test]
    fn the_same_requester_re_requesting_is_granted() {
        let coordinator = StartupCoordinator::new(Duration::from_secs(30));
        let s = slug("alpha");
        assert!(coordinator.request_initialization(&s, "preloader"));
        assert!(coordinator.request_initialization(&s, "preloader"));
    }

    #[test]
    fn release_by_a_non_holder_is_a_no_op() {
        let coordinator = StartupCoordinator::new(Duration::from_secs(30));
        let s = slug("alpha");
        coordinator.request_initialization(&s, "preloader");
        coordinator.release(&s, "ui-effect");
        assert!(!coordinator.request_initialization(&s, "ui-effect"));
    }

    #[test]
    fn release_then_a_different_requester_can_acquire() {
        let coordinator = StartupCoordinator::new(Duration::from_secs(30));
        let s = slug("alpha");
        coordinator.request_initialization(&s, "preloader");
        coordinator.release(&s, "preloader");
        assert!(coordinator.request_initialization(&s, "ui-effect"));
    }

    #[test]
    fn an_expired_lease_is_recovered_by_sweep() {
        let coordinator = StartupCoordinator::new(Duration::from_millis(1));
        let s = slug("alpha");
        coordinator.request_initialization(&s, "preloader");
        std::thread::sleep(Duration::from_millis(5));
        assert!(coordinator.request_initialization(&s, "ui-effect"));
    }
}
