//! Memcached driver for Keyscope
//!
//! Speaks the Memcached ASCII protocol over plain TCP. Only `get`, `set`,
//! `stats` and `version` are implemented, which is what previewing a value
//! and summarising a server needs.

mod client;
#[cfg(test)]
mod client_tests;
pub mod keys;
pub mod shaping;

pub use client::*;
pub use keys::{MAX_KEY_LENGTH, validate_key};
pub use shaping::{StatsSummary, ValuePreview};
