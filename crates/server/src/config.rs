use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Which storage backend serves the OAuth2 records.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Durable,
    Ephemeral,
}

/// Absolute per-category lifetimes of the ephemeral backend.
#[derive(Clone, Debug, Deserialize)]
pub struct EphemeralConfig {
    #[serde(default = "default_category_ttl")]
    pub clients_ttl_secs: u64,
    #[serde(default = "default_category_ttl")]
    pub grants_ttl_secs: u64,
    #[serde(default = "default_category_ttl")]
    pub tokens_ttl_secs: u64,
}

impl Default for EphemeralConfig {
    fn default() -> Self {
        Self {
            clients_ttl_secs: default_category_ttl(),
            grants_ttl_secs: default_category_ttl(),
            tokens_ttl_secs: default_category_ttl(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageKind,
    /// Required for the durable backend, e.g. `postgres://...` or `sqlite://coastline.db?mode=rwc`
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub ephemeral: EphemeralConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Lifetime of the seed grant created at signup, in days
    #[serde(default = "default_expire_days")]
    pub expire_days: i64,
    /// Lifetime of consent-issued authorization codes, in seconds
    #[serde(default = "default_authorization_lifetime")]
    pub authorization_lifetime: i64,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            expire_days: default_expire_days(),
            authorization_lifetime: default_authorization_lifetime(),
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
        }
    }
}

/// External collaborators reached over HTTP.
#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamConfig {
    pub identity_url: String,
    pub permissions_url: String,
    pub provisioning_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    /// Bearer token presented to the access-control service
    #[serde(default)]
    pub service_token: Option<String>,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    pub upstream: UpstreamConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8009".to_string()
}

fn default_category_ttl() -> u64 {
    36 * 60 * 60
}

fn default_expire_days() -> i64 {
    1
}

fn default_authorization_lifetime() -> i64 {
    250
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 14
}

fn default_upstream_timeout() -> u64 {
    10
}

impl AppConfig {
    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageKind::Durable && self.storage.database_url.is_empty() {
            return Err(ConfigError::Validation(
                "storage.database_url is required for the durable backend".into(),
            ));
        }
        let eph = &self.storage.ephemeral;
        if eph.clients_ttl_secs == 0 || eph.grants_ttl_secs == 0 || eph.tokens_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "storage.ephemeral TTLs must be > 0".into(),
            ));
        }
        let o = &self.oauth2;
        if o.expire_days <= 0
            || o.authorization_lifetime <= 0
            || o.access_token_lifetime <= 0
            || o.refresh_token_lifetime <= 0
        {
            return Err(ConfigError::Validation(
                "oauth2 lifetimes must be > 0".into(),
            ));
        }
        for (name, url) in [
            ("upstream.identity_url", &self.upstream.identity_url),
            ("upstream.permissions_url", &self.upstream.permissions_url),
            ("upstream.provisioning_url", &self.upstream.provisioning_url),
        ] {
            if url::Url::parse(url).is_err() {
                return Err(ConfigError::Validation(format!(
                    "{name} must be an absolute URL"
                )));
            }
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any variable matching the key path separated by double underscores
/// (e.g. `STORAGE__BACKEND=ephemeral`) overrides the file value. A `.env`
/// file in the working directory is loaded first when present.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let _ = dotenvy::dotenv();
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(yaml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config")
    }

    const MINIMAL: &str = r#"
storage:
  backend: ephemeral
upstream:
  identity_url: "http://localhost:9107/auth"
  permissions_url: "http://localhost:9123"
  provisioning_url: "http://localhost:9107/auth"
"#;

    #[test]
    fn defaults_are_applied() {
        let cfg = parse(MINIMAL);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8009");
        assert_eq!(cfg.storage.backend, StorageKind::Ephemeral);
        assert_eq!(cfg.storage.ephemeral.clients_ttl_secs, 36 * 3600);
        assert_eq!(cfg.oauth2.expire_days, 1);
        assert_eq!(cfg.oauth2.authorization_lifetime, 250);
        assert_eq!(cfg.upstream.timeout(), Duration::from_secs(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn durable_requires_database_url() {
        let mut cfg = parse(MINIMAL);
        cfg.storage.backend = StorageKind::Durable;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        cfg.storage.database_url = "sqlite::memory:".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_relative_upstream_url() {
        let mut cfg = parse(MINIMAL);
        cfg.upstream.identity_url = "/auth".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("upstream.identity_url"));
    }

    #[test]
    fn rejects_non_positive_lifetimes() {
        let mut cfg = parse(MINIMAL);
        cfg.oauth2.expire_days = 0;
        assert!(cfg.validate().is_err());
    }
}
