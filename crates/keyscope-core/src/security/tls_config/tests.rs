//! Tests for TLS Configuration Types

use super::*;
use std::path::PathBuf;

#[test]
fn test_tls_config_default_is_disabled() {
    let config = TlsConfig::default();

    assert_eq!(config.mode, TlsMode::Disable);
    assert!(!config.is_enabled());
    assert!(config.ca_cert.is_none());
}

#[test]
fn test_tls_config_require_skips_verification() {
    let config = TlsConfig::require();

    assert!(config.is_enabled());
    assert!(!config.mode.requires_ca_verification());
    assert!(!config.mode.requires_hostname_verification());
}

#[test]
fn test_tls_config_verify_full() {
    let config = TlsConfig::verify_full();

    assert!(config.is_enabled());
    assert!(config.mode.requires_ca_verification());
    assert!(config.mode.requires_hostname_verification());
    // System roots are used when no CA is given
    assert!(config.validate().is_ok());
}

#[test]
fn test_tls_config_with_ca_cert_and_sni() {
    let config = TlsConfig::verify_full()
        .ca_cert("/etc/ssl/certs/ca.pem")
        .server_name("cache.internal");

    assert_eq!(config.ca_cert, Some(PathBuf::from("/etc/ssl/certs/ca.pem")));
    assert_eq!(config.server_name.as_deref(), Some("cache.internal"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_tls_config_client_cert_pair_required() {
    let mut config = TlsConfig::require().client_cert("/tls/client.crt", "/tls/client.key");
    assert!(config.validate().is_ok());

    config.client_key = None;
    let err = config.validate().unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION_ERROR");
}

#[test]
fn test_tls_config_empty_paths_rejected() {
    assert!(TlsConfig::verify_full().ca_cert("").validate().is_err());
    assert!(TlsConfig::verify_full().server_name("  ").validate().is_err());
}

#[test]
fn test_tls_mode_serialization() {
    let json = serde_json::to_string(&TlsMode::VerifyFull).unwrap();
    assert_eq!(json, "\"verify_full\"");

    let mode: TlsMode = serde_json::from_str("\"require\"").unwrap();
    assert_eq!(mode, TlsMode::Require);
}
