use crate::picker;
use crate::storage::resolve_data_path;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    NotANumber { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Rest { url: String, api_key: String },
    /// In-process tables; `access_token` is accepted as a signed-in user.
    Memory { access_token: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub backend: BackendConfig,
    pub photos_api_url: String,
    pub picker_poll_interval: Duration,
    pub http_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("BACKEND_URL").ok().filter(|url| !url.is_empty()) {
            Some(url) => BackendConfig::Rest {
                url,
                api_key: env::var("BACKEND_API_KEY").unwrap_or_default(),
            },
            None => BackendConfig::Memory {
                access_token: env::var("DEV_ACCESS_TOKEN").unwrap_or_else(|_| "dev-token".into()),
            },
        };

        Ok(Self {
            port: parse_var("PORT", 8080)?,
            data_path: resolve_data_path(),
            backend,
            photos_api_url: env::var("PHOTOS_API_URL")
                .unwrap_or_else(|_| picker::DEFAULT_API_URL.into()),
            picker_poll_interval: Duration::from_millis(positive_var("PICKER_POLL_INTERVAL_MS", 2000)?),
            http_timeout: Duration::from_secs(positive_var("HTTP_TIMEOUT_SECS", 30)?),
            cache_ttl: Duration::from_secs(parse_var("CACHE_TTL_SECS", 30)?),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    parse_value(name, env::var(name).ok(), default)
}

fn positive_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    positive(name, parse_var(name, default)?)
}

fn parse_value<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber { name, value }),
        None => Ok(default),
    }
}

fn positive(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(value)
}
