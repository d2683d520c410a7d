//! Redis TLS Support
//!
//! Builds a native-tls connector from a `TlsConfig` and performs the
//! handshake over an already connected TCP stream. A failed handshake is
//! always fatal; there is no plaintext fallback.

use keyscope_core::security::{TlsConfig, TlsMode};
use keyscope_core::{KeyscopeError, Result};
use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use std::fs;
use std::path::Path;
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

/// Builds TLS connectors for Redis connections
#[derive(Debug, Clone)]
pub struct RedisTlsConnector;

impl RedisTlsConnector {
    /// Build a connector for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `CONFIGURATION_ERROR` if TLS is disabled, or if a certificate
    /// or key file cannot be read or parsed.
    pub fn build(config: &TlsConfig) -> Result<TlsConnector> {
        config.validate()?;

        if config.mode == TlsMode::Disable {
            return Err(KeyscopeError::Configuration(
                "TLS connector requested for a plaintext connection".to_string(),
            ));
        }

        info!(mode = ?config.mode, "building Redis TLS connector");

        let mut builder = NativeTlsConnector::builder();

        configure_verification(&mut builder, config.mode);

        if let Some(ca_cert_path) = &config.ca_cert {
            apply_ca_cert(&mut builder, ca_cert_path)?;
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.client_key) {
            apply_client_cert(&mut builder, cert_path, key_path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| KeyscopeError::Configuration(format!("TLS setup failed: {}", e)))?;

        Ok(TlsConnector::from(connector))
    }

    /// Run the TLS handshake over `stream`.
    ///
    /// The certificate is checked against `config.server_name` when set,
    /// otherwise against `host`.
    pub async fn handshake(
        stream: TcpStream,
        host: &str,
        config: &TlsConfig,
    ) -> Result<TlsStream<TcpStream>> {
        let connector = Self::build(config)?;
        let domain = config.server_name.as_deref().unwrap_or(host);

        match connector.connect(domain, stream).await {
            Ok(tls) => {
                debug!(domain = %domain, "TLS handshake completed");
                Ok(tls)
            }
            Err(e) => Err(classify_handshake_error(e)),
        }
    }
}

fn configure_verification(builder: &mut TlsConnectorBuilder, mode: TlsMode) {
    match mode {
        TlsMode::Require => {
            warn!("TLS certificate verification disabled");
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull | TlsMode::Disable => {
            debug!("enabling full certificate verification");
        }
    }
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<()> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem = read_file(path, "CA certificate")?;
    let cert = Certificate::from_pem(&pem).map_err(|e| {
        KeyscopeError::Configuration(format!(
            "invalid CA certificate {}: {}",
            path.display(),
            e
        ))
    })?;
    builder.add_root_certificate(cert);
    Ok(())
}

fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> Result<()> {
    debug!(cert = %cert_path.display(), "loading client certificate");

    let cert = read_file(cert_path, "client certificate")?;
    let key = read_file(key_path, "client key")?;
    let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
        KeyscopeError::Configuration(format!("invalid client identity (cert + key): {}", e))
    })?;
    builder.identity(identity);
    Ok(())
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        KeyscopeError::Configuration(format!(
            "failed to load {} from {}: {}",
            what,
            path.display(),
            e
        ))
    })
}

/// Certificate problems get their own code so the operator knows to supply a
/// CA or opt into trusting the server; anything else is a plain connection
/// failure.
fn classify_handshake_error(err: native_tls::Error) -> KeyscopeError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    let is_certificate = [
        "certificate",
        "verify",
        "self signed",
        "self-signed",
        "unknown ca",
        "hostname",
    ]
    .iter()
    .any(|needle| lower.contains(needle));

    if is_certificate {
        KeyscopeError::TlsCertInvalid(message)
    } else {
        KeyscopeError::Connection(format!("TLS handshake failed: {}", message))
    }
}
