//! keyscope - browse Redis and Memcached keys without leaking secrets
//!
//! Redis jobs print one JSON event per line on stdout; logs go to stderr.

mod logging;
mod memcached;
mod output;
mod redis;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keyscope_core::KeyscopeConfig;
use keyscope_drivers::enabled_backends;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::memcached::{MemcachedArgs, MemcachedCommand};
use crate::redis::RedisCommand;

#[derive(Parser, Debug)]
#[command(name = "keyscope")]
#[command(author, version, about = "Browse Redis and Memcached keys safely", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults to the user config directory
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        env = "KEYSCOPE_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,

    /// Also write JSON logs to the log directory
    #[arg(long = "log-json", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover and inspect Redis keys
    #[command(subcommand)]
    Redis(RedisCommand),

    /// Read, write and summarise a Memcached server
    Memcached {
        #[command(flatten)]
        connection: MemcachedArgs,
        #[command(subcommand)]
        command: MemcachedCommand,
    },

    /// List the backends compiled into this build
    Backends,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging_config = logging::LoggingConfig::default().with_json_logs(cli.log_json);
    let _log_guard = match logging::init(&logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("warning: logging disabled: {:#}", e);
            None
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "command failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = KeyscopeConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Redis(command) => {
            let status = redis::run(command, &config).await?;
            Ok(output::exit_code(status))
        }
        Command::Memcached {
            connection,
            command,
        } => {
            memcached::run(&connection, command, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Backends => {
            for backend in enabled_backends() {
                output::print_json(&output::BackendInfo::from(backend))?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
