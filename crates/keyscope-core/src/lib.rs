//! Keyscope Core - shared abstractions for the key browser engine
//!
//! This crate provides the pieces every other Keyscope crate depends on:
//!
//! - `KeyscopeError` - error type carrying a stable machine-readable code
//! - `RespValue` - a decoded Redis reply
//! - `CommandExecutor` - the seam jobs use to talk to a connected server
//! - `FramedStream` - buffered socket reader with line/exact-length framing
//! - `TlsConfig` - TLS settings for encrypted connections
//! - `KeyscopeConfig` - limits and timeouts, loadable from TOML

mod config;
mod error;
mod executor;
pub mod security;
mod types;
pub mod wire;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use security::*;
pub use types::*;
pub use wire::{FramedStream, WireIo, connect_tcp};
