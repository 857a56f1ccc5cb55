//! The seam between `usc-provider` and wherever credentials actually live. A
//! provider never caches a token itself — every call asks a [`TokenSource`]
//! fresh.

use std::sync::Arc;

use async_trait::async_trait;
use usc_auth::{PersistentAuth, TokenRefresher};
use usc_store::Store;
use usc_types::{Modality, Result};

/// Capability to fetch a currently-valid bearer token for a modality.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a valid token, refreshing transparently if needed.
    async fn get_token(&self, modality: Modality) -> Result<String>;

    /// Force a refresh regardless of the cached credential's expiry. Used
    /// after a remote host rejects a token with `unauthorized` even though
    /// the cache still believed it was valid.
    async fn force_refresh(&self, modality: Modality) -> Result<String>;
}

#[async_trait]
impl<St, R> TokenSource for Arc<PersistentAuth<St, R>>
where
    St: Store + 'static,
    R: TokenRefresher + 'static,
{
    async fn get_token(&self, modality: Modality) -> Result<String> {
        PersistentAuth::get_token(self, modality).await
    }

    async fn force_refresh(&self, modality: Modality) -> Result<String> {
        PersistentAuth::force_refresh(self, modality).await
    }
}
