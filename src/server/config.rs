use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// No database means in-memory stores.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub check_tick_secs: u64,
    pub max_concurrent_checks: usize,
    /// 0 disables the cooldown: every slow check raises a latency alert.
    pub latency_alert_cooldown_secs: u64,
    pub webhook_secret: Option<String>,
    pub email_relay_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
    pub sms_gateway_url: Option<String>,
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    listen_addr: Option<String>,
    database_url: Option<String>,
    jwt_secret: Option<String>,
    check_tick_secs: Option<u64>,
    max_concurrent_checks: Option<usize>,
    latency_alert_cooldown_secs: Option<u64>,
    webhook_secret: Option<String>,
    email_relay_url: Option<String>,
    email_api_key: Option<String>,
    email_from: Option<String>,
    sms_gateway_url: Option<String>,
    log_dir: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_check_tick_secs() -> u64 {
    60
}

fn default_max_concurrent_checks() -> usize {
    16
}

fn default_latency_alert_cooldown_secs() -> u64 {
    900
}

fn default_email_from() -> String {
    "API Watcher <alerts@apiwatch.local>".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl PartialServerConfig {
    fn from_file(path_str: &str) -> Result<Self, ConfigError> {
        let path = Path::new(path_str);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path_str.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path_str.to_string(),
            source,
        })
    }

    /// Fields set in `self` win over `other`.
    fn merge(self, other: Self) -> Self {
        Self {
            listen_addr: self.listen_addr.or(other.listen_addr),
            database_url: self.database_url.or(other.database_url),
            jwt_secret: self.jwt_secret.or(other.jwt_secret),
            check_tick_secs: self.check_tick_secs.or(other.check_tick_secs),
            max_concurrent_checks: self.max_concurrent_checks.or(other.max_concurrent_checks),
            latency_alert_cooldown_secs: self
                .latency_alert_cooldown_secs
                .or(other.latency_alert_cooldown_secs),
            webhook_secret: self.webhook_secret.or(other.webhook_secret),
            email_relay_url: self.email_relay_url.or(other.email_relay_url),
            email_api_key: self.email_api_key.or(other.email_api_key),
            email_from: self.email_from.or(other.email_from),
            sms_gateway_url: self.sms_gateway_url.or(other.sms_gateway_url),
            log_dir: self.log_dir.or(other.log_dir),
        }
    }

    fn finish(self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            database_url: self.database_url.filter(|s| !s.is_empty()),
            jwt_secret: self.jwt_secret.ok_or(ConfigError::Missing("JWT_SECRET"))?,
            check_tick_secs: self
                .check_tick_secs
                .unwrap_or_else(default_check_tick_secs)
                .max(1),
            max_concurrent_checks: self
                .max_concurrent_checks
                .unwrap_or_else(default_max_concurrent_checks)
                .max(1),
            latency_alert_cooldown_secs: self
                .latency_alert_cooldown_secs
                .unwrap_or_else(default_latency_alert_cooldown_secs),
            webhook_secret: self.webhook_secret,
            email_relay_url: self.email_relay_url,
            email_api_key: self.email_api_key,
            email_from: self.email_from.unwrap_or_else(default_email_from),
            sms_gateway_url: self.sms_gateway_url,
            log_dir: self.log_dir.unwrap_or_else(default_log_dir),
        })
    }
}

impl ServerConfig {
    /// Layers: TOML file, then environment (env wins), then defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => PartialServerConfig::from_file(path)?,
            None => PartialServerConfig::default(),
        };
        let env_config: PartialServerConfig = envy::from_env()?;

        env_config.merge(file_config).finish()
    }
}
