use crate::domain::error::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "REST_RELAY_";
pub const ENV_CONFIG_PATH: &str = "REST_RELAY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "rest-relay.toml";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// History store connection string. Absent means history is disabled.
    pub database_url: Option<String>,
    pub relay_timeout_ms: u64,
    pub log_level: String,
    /// Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: None,
            relay_timeout_ms: 30_000,
            log_level: "info".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `REST_RELAY_*`, then `DATABASE_URL`.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_path()))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    /// Loads `.env` (if any) and extracts the layered configuration.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: AppConfig = figment.extract()?;
        config.database_url = config
            .database_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(config)
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }
}

fn config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn extract() -> std::result::Result<AppConfig, figment::Error> {
        AppConfig::from_figment(AppConfig::figment()).map_err(|e| e.to_string().into())
    }

    #[test]
    fn defaults_leave_history_unconfigured() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config = extract()?;
            assert_eq!(config, AppConfig::default());
            assert_eq!(config.database_url(), None);
            assert_eq!(config.relay_timeout(), Duration::from_millis(30_000));
            Ok(())
        });
    }

    #[test]
    fn database_url_env_var_is_honoured() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL", "postgres://app@localhost/history");
            let config = extract()?;
            assert_eq!(config.database_url(), Some("postgres://app@localhost/history"));
            Ok(())
        });
    }

    #[test]
    fn blank_database_url_counts_as_absent() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DATABASE_URL", "   ");
            let config = extract()?;
            assert_eq!(config.database_url(), None);
            Ok(())
        });
    }

    #[test]
    fn file_then_prefixed_env_layering() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                port = 8080
                relay_timeout_ms = 5000
                database_url = "sqlite://history.sqlite"
                "#,
            )?;
            jail.set_env("REST_RELAY_PORT", "9090");

            let config = extract()?;
            assert_eq!(config.port, 9090);
            assert_eq!(config.relay_timeout_ms, 5000);
            assert_eq!(config.database_url(), Some("sqlite://history.sqlite"));
            assert_eq!(config.host, "127.0.0.1");
            Ok(())
        });
    }

    #[test]
    fn bare_database_url_beats_the_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(DEFAULT_CONFIG_FILE, r#"database_url = "sqlite://file.sqlite""#)?;
            jail.set_env("DATABASE_URL", "postgres://localhost/env");
            let config = extract()?;
            assert_eq!(config.database_url(), Some("postgres://localhost/env"));
            Ok(())
        });
    }

    #[test]
    fn custom_config_path() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("custom.toml", "port = 4000")?;
            jail.set_env(ENV_CONFIG_PATH, "custom.toml");
            let config = extract()?;
            assert_eq!(config.port, 4000);
            Ok(())
        });
    }
}
