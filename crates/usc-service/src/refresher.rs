//! The concrete [`TokenRefresher`] talking to GitHub's OAuth and GitHub App
//! endpoints — `usc-auth` only knows the trait; this binary is where the
//! trait meets a real host.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::warn;

use usc_auth::{HealthStatus, TokenRefresher};
use usc_types::{AppInstallationCredential, Credential, CoreError, OAuthCredential, Result};

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_OAUTH_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
/// GitHub App JWTs must be valid for no more than 10 minutes; backdate by a
/// minute to tolerate clock skew between this process and GitHub's.
const APP_JWT_TTL: Duration = Duration::minutes(9);
const APP_JWT_CLOCK_SKEW: Duration = Duration::minutes(1);

#[derive(Serialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    scope: String,
}

#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Refreshes OAuth user tokens via a GitHub OAuth App's refresh-token grant,
/// and re-mints installation tokens via a GitHub App's private key.
pub struct GitHubTokenRefresher {
    client: reqwest::Client,
    oauth_client_id: Option<String>,
    oauth_client_secret: Option<String>,
    app_id: Option<String>,
    app_key: Option<EncodingKey>,
}

impl GitHubTokenRefresher {
    /// Build a refresher. Either credential family may be left
    /// unconfigured; refreshing that family then fails with
    /// [`CoreError::ReauthRequired`] rather than panicking.
    pub fn new(
        oauth_client_id: Option<String>,
        oauth_client_secret: Option<String>,
        app_id: Option<String>,
        app_private_key_pem: Option<String>,
    ) -> Result<Self> {
        let app_key = app_private_key_pem
            .as_deref()
            .map(|pem| EncodingKey::from_rsa_pem(pem.as_bytes()))
            .transpose()
            .map_err(|e| CoreError::Server(format!("invalid GitHub App private key: {e}")))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("universe-sync-core/0.1")
                .build()
                .map_err(|e| CoreError::Server(format!("could not build HTTP client: {e}")))?,
            oauth_client_id,
            oauth_client_secret,
            app_id,
            app_key,
        })
    }

    async fn refresh_oauth(&self, credential: &OAuthCredential) -> Result<Credential> {
        let (client_id, client_secret) = match (&self.oauth_client_id, &self.oauth_client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Err(CoreError::ReauthRequired),
        };
        let Some(refresh_token) = &credential.refresh_token else {
            return Err(CoreError::ReauthRequired);
        };

        let response = self
            .client
            .post(GITHUB_OAUTH_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::ReauthRequired);
        }

        let body: OAuthTokenResponse = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        Ok(Credential::OAuth(OAuthCredential {
            user_login: credential.user_login.clone(),
            access_token: body.access_token,
            refresh_token: body.refresh_token.or_else(|| credential.refresh_token.clone()),
            expires_at: None,
            scopes: body.scope.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
        }))
    }

    fn mint_app_jwt(&self) -> Result<String> {
        let app_id = self.app_id.as_deref().ok_or(CoreError::ReauthRequired)?;
        let key = self.app_key.as_ref().ok_or(CoreError::ReauthRequired)?;
        let now = Utc::now();
        let claims = AppJwtClaims {
            iat: (now - APP_JWT_CLOCK_SKEW).timestamp(),
            exp: (now + APP_JWT_TTL).timestamp(),
            iss: app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
            .map_err(|e| CoreError::Server(format!("could not mint GitHub App JWT: {e}")))
    }

    async fn refresh_app_installation(&self, credential: &AppInstallationCredential) -> Result<Credential> {
        let jwt = self.mint_app_jwt()?;
        let url = format!(
            "{GITHUB_API_BASE}/app/installations/{}/access_tokens",
            credential.installation_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::ReauthRequired);
        }

        let body: InstallationTokenResponse = response.json().await.map_err(|e| CoreError::Server(e.to_string()))?;
        Ok(Credential::AppInstallation(AppInstallationCredential {
            installation_id: credential.installation_id,
            account: credential.account.clone(),
            access_token: body.token,
            expires_at: body.expires_at,
            repositories: credential.repositories.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl TokenRefresher for GitHubTokenRefresher {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        match credential {
            Credential::OAuth(c) => self.refresh_oauth(c).await,
            Credential::AppInstallation(c) => self.refresh_app_installation(c).await,
        }
    }

    async fn probe_health(&self, credential: &Credential) -> Result<HealthStatus> {
        let response = self
            .client
            .get(format!("{GITHUB_API_BASE}/user"))
            .bearer_auth(credential.access_token())
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(r) if r.status().as_u16() == 401 => Ok(HealthStatus::Failed),
            Ok(r) => {
                warn!(status = %r.status(), "github health probe returned an unexpected status");
                Ok(HealthStatus::Degraded)
            }
            Err(e) => {
                warn!(error = %e, "github health probe could not reach the host");
                Ok(HealthStatus::Degraded)
            }
        }
    }
}
