//! Redis driver for Keyscope
//!
//! A small RESP client over TCP or TLS that keeps one command on the wire at
//! a time. No pipelining, pub/sub or cluster support.

mod client;
#[cfg(test)]
mod client_tests;
mod connection;
pub mod keys;
#[cfg(test)]
mod keys_tests;
pub mod resp;
#[cfg(test)]
mod resp_tests;
#[cfg(test)]
mod test_server;
mod tls;

pub use client::*;
pub use connection::*;
pub use keys::*;
pub use tls::RedisTlsConnector;
