//! Constructing [`Provider`]s and [`RateLimiter`]s for a universe's linked
//! repo without this crate depending on `reqwest`/host-auth specifics
//! (those concerns live in `usc-service`, which wires the concrete REST
//! hosts, `usc-auth::PersistentAuth`, and `usc-rate-limiter` storage).

use std::sync::Arc;

use usc_provider::Provider;
use usc_types::{Modality, RepoRef};

/// Builds a [`Provider`] bound to one repository + credential modality.
///
/// Implemented once in `usc-service` against the real REST hosts; test
/// doubles implement it directly against an in-memory [`Provider`].
pub trait ProviderFactory: Send + Sync {
    /// Construct a provider for `repo`, authenticating with `modality`.
    fn build(&self, repo: &RepoRef, modality: Modality) -> Arc<dyn Provider>;
}
