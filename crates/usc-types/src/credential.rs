//! Credential records and the `Modality` shared by the Rate Limiter and
//! Persistent Auth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authentication kind that selects both the credential and the rate-
/// limit bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// User OAuth credential.
    OAuth,
    /// Installation-scoped app token.
    AppInstallation,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::OAuth => f.write_str("oauth"),
            Modality::AppInstallation => f.write_str("app_installation"),
        }
    }
}

/// A user OAuth credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// The authenticated user's login.
    pub user_login: String,
    /// Current access token.
    pub access_token: String,
    /// Refresh token, when the provider issues one.
    pub refresh_token: Option<String>,
    /// Expiry; `None` for non-expiring tokens.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted OAuth scopes.
    pub scopes: Vec<String>,
}

/// An installation-scoped app token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstallationCredential {
    /// The installation identifier.
    pub installation_id: u64,
    /// Account (user or org) the installation is attached to.
    pub account: String,
    /// Current installation access token.
    pub access_token: String,
    /// Expiry — installation tokens always expire.
    pub expires_at: DateTime<Utc>,
    /// Repositories this installation is scoped to.
    pub repositories: Vec<String>,
}

/// Either credential modality, tagged for storage and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Credential {
    /// See [`OAuthCredential`].
    OAuth(OAuthCredential),
    /// See [`AppInstallationCredential`].
    AppInstallation(AppInstallationCredential),
}

impl Credential {
    /// The modality this credential belongs to.
    pub fn modality(&self) -> Modality {
        match self {
            Credential::OAuth(_) => Modality::OAuth,
            Credential::AppInstallation(_) => Modality::AppInstallation,
        }
    }

    /// The bearer token value, regardless of modality.
    pub fn access_token(&self) -> &str {
        match self {
            Credential::OAuth(c) => &c.access_token,
            Credential::AppInstallation(c) => &c.access_token,
        }
    }

    /// Expiry, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Credential::OAuth(c) => c.expires_at,
            Credential::AppInstallation(c) => Some(c.expires_at),
        }
    }

    /// Whether the credential is expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| now >= exp).unwrap_or(false)
    }
}
