//! Keyscope configuration
//!
//! Every limit the engine enforces lives here, with the defaults operators
//! get when a field (or the whole file) is absent. The file format is TOML:
//!
//! ```toml
//! [connection]
//! connect_timeout_ms = 3000
//!
//! [discovery]
//! max_keys = 10000
//!
//! [inspector]
//! max_entries = 500
//! ```

use crate::{KeyscopeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyscopeConfig {
    pub connection: ConnectionSettings,
    pub discovery: DiscoveryLimits,
    pub inspector: InspectorLimits,
}

/// Socket timeouts, applied per operation and never retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Budget for TCP connect plus TLS handshake
    pub connect_timeout_ms: u64,
    /// Budget for each command's write and reply
    pub command_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            command_timeout_ms: 10_000,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Limits for the key discovery scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryLimits {
    /// COUNT hint passed to SCAN
    pub count_hint: u32,
    /// Maximum number of distinct keys emitted by one job
    pub max_keys: usize,
    /// Wall-clock budget for one job
    pub max_duration_ms: u64,
    /// TYPE/TTL lookups allowed in flight at once
    pub metadata_concurrency: usize,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            count_hint: 250,
            max_keys: 5_000,
            max_duration_ms: 15_000,
            metadata_concurrency: 4,
        }
    }
}

impl DiscoveryLimits {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

/// Limits for previewing a single key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorLimits {
    /// Byte budget for a string value or a collection's accumulated entries
    pub max_bytes: usize,
    /// COUNT hint for HSCAN pages
    pub hash_chunk_size: u32,
    /// Page size for LRANGE windows and COUNT hint for SSCAN/ZSCAN
    pub collection_chunk_size: u32,
    /// Entries fetched by the single XREVRANGE call
    pub stream_count: u32,
    /// Maximum entries accumulated for any collection type
    pub max_entries: usize,
}

impl Default for InspectorLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1_048_576,
            hash_chunk_size: 200,
            collection_chunk_size: 200,
            stream_count: 200,
            max_entries: 2_000,
        }
    }
}

impl KeyscopeConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: KeyscopeConfig = toml::from_str(text)
            .map_err(|e| KeyscopeError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            KeyscopeError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the default location if that
    /// file exists, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/keyscope/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keyscope").join("config.toml"))
    }

    /// Reject limits that would stall or disable a job
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, u64); 11] = [
            (
                "connection.connect_timeout_ms",
                self.connection.connect_timeout_ms,
            ),
            (
                "connection.command_timeout_ms",
                self.connection.command_timeout_ms,
            ),
            ("discovery.count_hint", self.discovery.count_hint as u64),
            ("discovery.max_keys", self.discovery.max_keys as u64),
            ("discovery.max_duration_ms", self.discovery.max_duration_ms),
            (
                "discovery.metadata_concurrency",
                self.discovery.metadata_concurrency as u64,
            ),
            ("inspector.max_bytes", self.inspector.max_bytes as u64),
            (
                "inspector.hash_chunk_size",
                self.inspector.hash_chunk_size as u64,
            ),
            (
                "inspector.collection_chunk_size",
                self.inspector.collection_chunk_size as u64,
            ),
            ("inspector.stream_count", self.inspector.stream_count as u64),
            ("inspector.max_entries", self.inspector.max_entries as u64),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(KeyscopeError::Configuration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}
