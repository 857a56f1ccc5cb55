//! Configuration loading: `.env` (dev convenience) layered under a
//! `config`-crate TOML file layered under CLI flags, lowest to highest
//! precedence.

use serde::Deserialize;

/// Fully resolved configuration for one `usc-service` process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to when run with `--serve`.
    pub bind_addr: String,
    /// Port the HTTP server binds to when run with `--serve`.
    pub port: u16,
    /// Path to the sqlite database backing the universe registry, the
    /// credential store, and the rate-limiter's durable counters.
    pub db_path: String,
    /// Base directory local-file-backed universes resolve their handles
    /// under.
    pub local_file_dir: String,
    /// Whether this host platform can grant durable local file access.
    /// `false` forces every universe onto `DownloadOnlyBacking`, which
    /// makes `localFile.enabled` collapse to `sourceOfTruth = git` on
    /// creation and on first read.
    pub local_file_supported: bool,
    /// `RUST_LOG`-style filter directive, overridable by `--log-level`.
    pub log_level: String,
    /// GitHub OAuth App client id, used to refresh user OAuth tokens.
    pub github_oauth_client_id: Option<String>,
    /// GitHub OAuth App client secret.
    pub github_oauth_client_secret: Option<String>,
    /// GitHub App id, used to mint fresh installation tokens.
    pub github_app_id: Option<String>,
    /// PEM-encoded RS256 private key for the GitHub App above.
    pub github_app_private_key: Option<String>,
    /// API origin for a self-hosted Gitea instance, if any universe links
    /// one (defaults to none; Gitea-linked repos fail with
    /// `CoreError::BadRequest` until configured).
    pub gitea_api_base: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            db_path: "data/universe-sync-core.db".to_string(),
            local_file_dir: "data/local-files".to_string(),
            local_file_supported: true,
            log_level: "info".to_string(),
            github_oauth_client_id: None,
            github_oauth_client_secret: None,
            github_app_id: None,
            github_app_private_key: None,
            gitea_api_base: None,
        }
    }
}

/// CLI overrides layered on top of whatever the TOML file and environment
/// already resolved (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Overrides [`ServiceConfig::port`].
    pub port: Option<u16>,
    /// Overrides [`ServiceConfig::db_path`].
    pub db_path: Option<String>,
    /// Overrides [`ServiceConfig::log_level`].
    pub log_level: Option<String>,
}

/// Load configuration: `.env` populates the process environment first (a
/// no-op in production where the file is absent), then `config/service.toml`
/// is read if present, then environment variables prefixed `USC_` override
/// matching fields, then `overrides` (CLI flags) win over all of it.
pub fn load(config_path: &str, overrides: ConfigOverrides) -> anyhow::Result<ServiceConfig> {
    dotenv::dotenv().ok();

    let builder = config::Config::builder()
        .add_source(config::File::with_name(config_path).required(false))
        .add_source(config::Environment::with_prefix("USC").separator("__"));

    let mut resolved: ServiceConfig = builder.build()?.try_deserialize()?;

    if let Some(port) = overrides.port {
        resolved.port = port;
    }
    if let Some(db_path) = overrides.db_path {
        resolved.db_path = db_path;
    }
    if let Some(log_level) = overrides.log_level {
        resolved.log_level = log_level;
    }

    Ok(resolved)
}
