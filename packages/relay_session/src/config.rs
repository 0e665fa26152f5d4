use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::DEFAULT_BUS_CAPACITY;

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
//   relay.toml:      address = "ws://chat.internal:8080"
//                    reconnect_backoff_ms = 2000
//
//   env var:         RELAY_RECONNECT_BACKOFF_MS=2000
//
// CLI flags are merged last and win over both.

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Tunable session configuration, deserialized by figment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionFileConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

fn default_address() -> String {
    "ws://localhost:8080".to_string()
}
fn default_reconnect_backoff_ms() -> u64 {
    6000
}
fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

/// Overrides that only exist when the caller passed them explicitly.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_backoff_ms: Option<u64>,
}

/// Build a figment that layers: defaults → config file → RELAY_* env vars → overrides.
///
/// A missing config file is not an error; figment skips it.
pub fn load_config(config_path: Option<&Path>, overrides: &ConfigOverrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let path: PathBuf = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    debug!(path = %path.display(), "loading session config");

    Figment::from(Serialized::defaults(SessionFileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RELAY_").split("__"))
        .merge(Serialized::defaults(overrides))
}

// =============================================================================
// Runtime view
// =============================================================================

/// Resolved settings used by the session controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    /// Endpoint passed to the connector on every attempt.
    pub address: String,
    /// Fixed delay between a lost connection and the next open.
    pub reconnect_backoff: Duration,
    /// Event bus capacity (at least 1).
    pub bus_capacity: usize,
}

impl SessionSettings {
    /// Settings for `address` with every other knob at its default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::from_file(&SessionFileConfig::default())
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn from_file(fc: &SessionFileConfig) -> Self {
        Self {
            address: fc.address.clone(),
            reconnect_backoff: Duration::from_millis(fc.reconnect_backoff_ms),
            bus_capacity: fc.bus_capacity.max(1),
        }
    }

    /// Extract and resolve settings from a figment built by [`load_config`].
    pub fn extract(figment: &figment::Figment) -> Result<Self> {
        let fc: SessionFileConfig = figment
            .extract()
            .context("invalid session configuration")?;
        Ok(Self::from_file(&fc))
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_file(&SessionFileConfig::default())
    }
}
