//! Typed settings with layered precedence.
//!
//! Settings come from `scorcio.toml`, an optional `scorcio.local.toml`
//! override, and `SCORCIO__`-prefixed environment variables, deserialized
//! into raw structs and validated into [`Settings`].

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "scorcio";
const LOCAL_CONFIG_BASENAME: &str = "scorcio.local";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("configuration could not be read: {0}")]
    Read(#[from] ConfigError),
    #[error("configuration key `{key}` is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Load settings using the configured precedence (file → environment).
pub fn load() -> Result<Settings, LoadError> {
    let raw: RawSettings = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false))
        .add_source(Environment::with_prefix("SCORCIO").separator("__"))
        .build()?
        .try_deserialize()?;

    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            cache: raw.cache,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = logging
        .level
        .parse::<LevelFilter>()
        .map_err(|_| LoadError::invalid("logging.level", format!("`{}`", logging.level)))?;

    let format = match logging.format.as_str() {
        "json" => LogFormat::Json,
        "compact" => LogFormat::Compact,
        other => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("`{other}` is not one of `json`, `compact`"),
            ));
        }
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawLoggingSettings {
    level: String,
    format: String,
}

impl Default for RawLoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}
