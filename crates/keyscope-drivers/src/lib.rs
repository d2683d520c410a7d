//! Keyscope Drivers - wire clients for the supported key-value stores
//!
//! Each backend lives in its own crate and is compiled in behind a cargo
//! feature of the same name.

#[cfg(feature = "memcached")]
pub use keyscope_driver_memcached as memcached;
#[cfg(feature = "redis")]
pub use keyscope_driver_redis as redis;

use serde::{Deserialize, Serialize};

/// Re-export commonly used types from keyscope-core
pub use keyscope_core::{
    CommandExecutor, ErrorInfo, KeyscopeConfig, KeyscopeError, RespValue, Result, TlsConfig,
    TlsMode,
};

/// A key-value store this build can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Redis,
    Memcached,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Redis => "redis",
            Backend::Memcached => "memcached",
        }
    }

    /// Port the server listens on when none is given
    pub fn default_port(&self) -> u16 {
        match self {
            Backend::Redis => 6379,
            Backend::Memcached => 11211,
        }
    }

    /// Whether support for this backend was compiled in
    pub fn is_enabled(&self) -> bool {
        match self {
            Backend::Redis => cfg!(feature = "redis"),
            Backend::Memcached => cfg!(feature = "memcached"),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Backends compiled into this build
pub fn enabled_backends() -> Vec<Backend> {
    [Backend::Redis, Backend::Memcached]
        .into_iter()
        .filter(Backend::is_enabled)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Redis.to_string(), "redis");
        assert_eq!(
            serde_json::to_string(&Backend::Memcached).unwrap(),
            "\"memcached\""
        );
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_default_ports_match_drivers() {
        assert_eq!(Backend::Redis.default_port(), redis::DEFAULT_REDIS_PORT);
    }

    #[cfg(feature = "memcached")]
    #[test]
    fn test_memcached_port_matches_driver() {
        assert_eq!(
            Backend::Memcached.default_port(),
            memcached::DEFAULT_MEMCACHED_PORT
        );
        assert!(enabled_backends().contains(&Backend::Memcached));
    }
}
