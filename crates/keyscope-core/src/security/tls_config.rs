//! TLS/SSL Configuration Types
//!
//! Defines configuration types for TLS connections to Redis servers.
//! There is deliberately no opportunistic mode: once TLS is requested, a
//! failed handshake fails the connection instead of retrying in plaintext.

use crate::{KeyscopeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TLS mode for server connections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain TCP
    #[default]
    Disable,
    /// Encrypt, but trust any certificate the server presents.
    ///
    /// This is the explicit opt-in for self-signed or mismatched
    /// certificates; it still never downgrades to plaintext.
    Require,
    /// Encrypt and verify both the certificate chain and the hostname
    VerifyFull,
}

impl TlsMode {
    /// Returns true if this mode requires encryption
    pub fn requires_encryption(&self) -> bool {
        matches!(self, TlsMode::Require | TlsMode::VerifyFull)
    }

    /// Returns true if the server certificate must chain to a trusted root
    pub fn requires_ca_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyFull)
    }

    /// Returns true if the certificate must match the host being dialled
    pub fn requires_hostname_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyFull)
    }
}

/// Configuration for TLS connections
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// TLS mode determining the level of security
    pub mode: TlsMode,
    /// Extra CA certificate (PEM) to trust in addition to the system roots
    pub ca_cert: Option<PathBuf>,
    /// Client certificate (PEM) for mutual TLS
    pub client_cert: Option<PathBuf>,
    /// Client private key (PKCS#8 PEM) for mutual TLS
    pub client_key: Option<PathBuf>,
    /// Name to verify and send as SNI, when it differs from the dialled host
    pub server_name: Option<String>,
}

impl TlsConfig {
    /// Create a new TLS configuration with the specified mode
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Create a disabled TLS configuration
    pub fn disabled() -> Self {
        Self::new(TlsMode::Disable)
    }

    /// Encrypt without certificate verification
    pub fn require() -> Self {
        Self::new(TlsMode::Require)
    }

    /// Create a TLS configuration with full verification
    pub fn verify_full() -> Self {
        Self::new(TlsMode::VerifyFull)
    }

    /// Trust an additional CA certificate
    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Set the client certificate for mutual TLS authentication
    pub fn client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    /// Override the name verified against the server certificate
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Returns true if a TLS handshake should be performed
    pub fn is_enabled(&self) -> bool {
        self.mode.requires_encryption()
    }

    /// Validate the TLS configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ca_cert) = &self.ca_cert
            && ca_cert.as_os_str().is_empty()
        {
            return Err(KeyscopeError::Configuration(
                "CA certificate path cannot be empty".to_string(),
            ));
        }

        if let Some(client_cert) = &self.client_cert
            && client_cert.as_os_str().is_empty()
        {
            return Err(KeyscopeError::Configuration(
                "Client certificate path cannot be empty".to_string(),
            ));
        }

        if let Some(client_key) = &self.client_key
            && client_key.as_os_str().is_empty()
        {
            return Err(KeyscopeError::Configuration(
                "Client key path cannot be empty".to_string(),
            ));
        }

        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(KeyscopeError::Configuration(
                "Client certificate and client key must be provided together".to_string(),
            ));
        }

        if let Some(name) = &self.server_name
            && name.trim().is_empty()
        {
            return Err(KeyscopeError::Configuration(
                "TLS server name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
