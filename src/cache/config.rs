//! Session store configuration.

use serde::Deserialize;
use time::Duration;

// Default values for store configuration
const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Session store configuration from `scorcio.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an untouched session entry stays fetchable.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime as a [`time::Duration`], clamping to one second so a
    /// zero in the config file cannot make every save expire instantly.
    /// Values beyond `i64::MAX` saturate instead of wrapping negative.
    pub fn ttl(&self) -> Duration {
        let seconds = i64::try_from(self.ttl_seconds.max(1)).unwrap_or(i64::MAX);
        Duration::seconds(seconds)
    }
}
