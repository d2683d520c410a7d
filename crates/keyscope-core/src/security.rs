//! Security-related configuration types for server connections
//!
//! Only TLS is modelled here; tunnelling and credential storage belong to the
//! hosting application.

mod tls_config;

pub use tls_config::*;
