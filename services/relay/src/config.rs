//! Relay configuration loading.
//!
//! TOML is the sole config source. Every field is optional and defaults to
//! the values below, so the relay runs with no config file at all; the
//! path comes from the `RELAY_CONFIG` environment variable when set.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::rate_limit::RateConfig;
use crate::storage::{StorageConfig, DEFAULT_TTL_SECS};
use crate::validator::ValidatorConfig;

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address for the WebSocket endpoint.
    pub bind_addr: String,
    /// Directory holding event bodies and the persisted index.
    pub data_dir: PathBuf,
    /// Relay name advertised in the information document.
    pub name: String,
    pub description: String,

    /// Seconds before a stored event expires (0 disables the TTL).
    pub default_ttl_secs: u32,
    /// Reject events older than this many seconds (0 disables).
    pub max_event_age_secs: u64,
    /// Reject events this far in the future.
    pub max_future_secs: i64,
    /// Required leading-zero bits on event ids (0 disables).
    pub min_pow_difficulty: u32,

    /// EVENT messages admitted per connection per minute.
    pub events_per_minute: u32,
    /// REQ messages admitted per connection per minute.
    pub reqs_per_minute: u32,
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4869".to_owned(),
            data_dir: PathBuf::from("/var/lib/waxwing"),
            name: "waxwing".to_owned(),
            description: "Minimal Nostr relay with 21-day TTL".to_owned(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_event_age_secs: 0,
            max_future_secs: 900,
            min_pow_difficulty: 0,
            events_per_minute: 30,
            reqs_per_minute: 60,
            max_connections: 8,
        }
    }
}

impl RelayConfig {
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_event_age_secs: self.max_event_age_secs,
            max_future_secs: self.max_future_secs,
            min_pow_difficulty: self.min_pow_difficulty,
            check_duplicates: true,
        }
    }

    pub fn rate_config(&self) -> RateConfig {
        RateConfig {
            events_per_minute: self.events_per_minute,
            reqs_per_minute: self.reqs_per_minute,
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        let mut config = StorageConfig::new(self.data_dir.clone());
        config.default_ttl_secs = self.default_ttl_secs;
        config
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    bind_addr: Option<String>,
    data_dir: Option<PathBuf>,
    name: Option<String>,
    description: Option<String>,
    storage: Option<RawStorage>,
    limits: Option<RawLimits>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorage {
    default_ttl_secs: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLimits {
    max_event_age_secs: Option<u64>,
    max_future_secs: Option<i64>,
    min_pow_difficulty: Option<u32>,
    events_per_minute: Option<u32>,
    reqs_per_minute: Option<u32>,
    max_connections: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load configuration from a TOML file.
pub fn load_config_from_path(path: &Path) -> Result<RelayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&toml_str)
}

/// Load configuration from a TOML string, applying defaults per field.
pub fn load_config_from_str(toml_str: &str) -> Result<RelayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;
    let defaults = RelayConfig::default();
    let storage = raw.storage.unwrap_or_default();
    let limits = raw.limits.unwrap_or_default();

    Ok(RelayConfig {
        bind_addr: raw.bind_addr.unwrap_or(defaults.bind_addr),
        data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
        name: raw.name.unwrap_or(defaults.name),
        description: raw.description.unwrap_or(defaults.description),
        default_ttl_secs: storage.default_ttl_secs.unwrap_or(defaults.default_ttl_secs),
        max_event_age_secs: limits
            .max_event_age_secs
            .unwrap_or(defaults.max_event_age_secs),
        max_future_secs: limits.max_future_secs.unwrap_or(defaults.max_future_secs),
        min_pow_difficulty: limits
            .min_pow_difficulty
            .unwrap_or(defaults.min_pow_difficulty),
        events_per_minute: limits
            .events_per_minute
            .unwrap_or(defaults.events_per_minute),
        reqs_per_minute: limits.reqs_per_minute.unwrap_or(defaults.reqs_per_minute),
        max_connections: limits.max_connections.unwrap_or(defaults.max_connections),
    })
}
