//! `keyscope memcached ...`

use crate::output;
use anyhow::Context;
use clap::{Args, Subcommand};
use keyscope_core::KeyscopeConfig;
use keyscope_drivers::memcached::{
    DEFAULT_MEMCACHED_PORT, MemcachedConfig, MemcachedWireClient, StatsSummary, ValuePreview,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Args, Debug, Clone)]
pub struct MemcachedArgs {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_MEMCACHED_PORT, global = true)]
    pub port: u16,
}

#[derive(Subcommand, Debug)]
pub enum MemcachedCommand {
    /// Preview one value, redacted and size-bounded
    Get { key: String },
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Opaque client flags stored with the item
        #[arg(long, default_value_t = 0)]
        flags: u32,
        /// Expiry in seconds (0 = never)
        #[arg(long, default_value_t = 0)]
        ttl: u32,
    },
    /// Server statistics
    Stats {
        /// Print a JSON summary instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Server version
    Version,
}

/// What `get` prints
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum GetOutput {
    Hit(ValuePreview),
    Miss { key: String },
}

#[derive(Debug, Serialize)]
struct StatsOutput<'a> {
    summary: StatsSummary,
    stats: &'a BTreeMap<String, String>,
}

pub async fn run(
    args: &MemcachedArgs,
    command: MemcachedCommand,
    config: &KeyscopeConfig,
) -> anyhow::Result<()> {
    let client_config =
        MemcachedConfig::new(&args.host, args.port).with_timeouts(&config.connection);
    let mut client = MemcachedWireClient::connect(&client_config)
        .await
        .with_context(|| {
            format!(
                "failed to connect to memcached at {}:{}",
                args.host, args.port
            )
        })?;

    let result = execute(&mut client, command, config).await;
    client.close();
    result
}

async fn execute(
    client: &mut MemcachedWireClient,
    command: MemcachedCommand,
    config: &KeyscopeConfig,
) -> anyhow::Result<()> {
    match command {
        MemcachedCommand::Get { key } => {
            let output = match client.get(&key).await.context("get failed")? {
                Some(item) => GetOutput::Hit(ValuePreview::from_item(
                    &item,
                    config.inspector.max_bytes,
                )),
                None => GetOutput::Miss { key },
            };
            output::print_json(&output)
        }
        MemcachedCommand::Set {
            key,
            value,
            flags,
            ttl,
        } => {
            client
                .set(&key, flags, ttl, value.as_bytes())
                .await
                .context("set failed")?;
            tracing::info!(key = %key, bytes = value.len(), "value stored");
            output::print_json(&serde_json::json!({ "key": key, "stored": true }))
        }
        MemcachedCommand::Stats { json } => {
            let stats = client.stats().await.context("stats failed")?;
            if json {
                output::print_json(&StatsOutput {
                    summary: StatsSummary::from_stats(&stats),
                    stats: &stats,
                })
            } else {
                println!("{}", output::stats_table(&stats));
                Ok(())
            }
        }
        MemcachedCommand::Version => {
            let version = client.version().await.context("version failed")?;
            output::print_json(&serde_json::json!({ "version": version }))
        }
    }
}
