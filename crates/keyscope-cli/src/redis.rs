//! `keyscope redis ...`

use crate::output;
use anyhow::{Context, anyhow};
use clap::{Args, Subcommand};
use futures::StreamExt;
use keyscope_core::{ConnectionSettings, KeyscopeConfig, TlsConfig};
use keyscope_drivers::redis::{DEFAULT_REDIS_PORT, RedisClientConfig, RedisConnection};
use keyscope_jobs::{
    DiscoveryRequest, InspectorJob, JobHandle, JobRegistry, JobStatus, KeyDiscoveryJob,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum RedisCommand {
    /// Discover keys with SCAN, printing one JSON event per page
    Scan {
        #[command(flatten)]
        connection: RedisArgs,
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Preview a single key's value, redacted and size-bounded
    Inspect {
        #[command(flatten)]
        connection: RedisArgs,
        /// Key to inspect
        key: String,
    },
}

/// How to reach the Redis server
#[derive(Args, Debug, Clone)]
pub struct RedisArgs {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_REDIS_PORT)]
    pub port: u16,

    /// Password (AUTH)
    #[arg(long, env = "KEYSCOPE_REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// ACL user name, used together with --password
    #[arg(long, requires = "password")]
    pub username: Option<String>,

    /// Logical database to SELECT
    #[arg(long, default_value_t = 0)]
    pub db: u16,

    /// Connect over TLS, verifying the server certificate
    #[arg(long)]
    pub tls: bool,

    /// Extra CA certificate (PEM) to trust
    #[arg(long, value_name = "FILE", requires = "tls")]
    pub ca_cert: Option<PathBuf>,

    /// Accept any server certificate (still encrypted)
    #[arg(long, requires = "tls")]
    pub insecure_skip_verify: bool,
}

impl RedisArgs {
    pub fn tls_config(&self) -> TlsConfig {
        if !self.tls {
            return TlsConfig::disabled();
        }
        let tls = if self.insecure_skip_verify {
            TlsConfig::require()
        } else {
            TlsConfig::verify_full()
        };
        match &self.ca_cert {
            Some(path) => tls.ca_cert(path),
            None => tls,
        }
    }

    pub fn client_config(&self, settings: &ConnectionSettings) -> RedisClientConfig {
        let mut config = RedisClientConfig::new(&self.host, self.port)
            .with_database(self.db)
            .with_tls(self.tls_config())
            .with_timeouts(settings);
        if let Some(password) = &self.password {
            config = config.with_password(password);
        }
        if let Some(username) = &self.username {
            config = config.with_username(username);
        }
        config
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Substring or glob to match keys against
    #[arg(long, short = 'q')]
    pub query: Option<String>,

    /// Only keys under this prefix, e.g. `session:`
    #[arg(long)]
    pub prefix: Option<String>,

    /// Look up TYPE and TTL for every key found
    #[arg(long)]
    pub metadata: bool,

    /// Stop after this many keys (overrides the config file)
    #[arg(long, value_name = "N")]
    pub max_keys: Option<usize>,

    /// Continue from the cursor of a previous run
    #[arg(long, value_name = "CURSOR")]
    pub resume: Option<String>,
}

impl ScanArgs {
    pub fn request(&self) -> DiscoveryRequest {
        let mut request = DiscoveryRequest::default().with_metadata(self.metadata);
        if let Some(query) = &self.query {
            request = request.with_query(query);
        }
        if let Some(prefix) = &self.prefix {
            request = request.with_prefix(prefix);
        }
        if let Some(cursor) = &self.resume {
            request = request.resume_from(cursor);
        }
        request
    }
}

pub async fn run(command: RedisCommand, config: &KeyscopeConfig) -> anyhow::Result<JobStatus> {
    let registry = JobRegistry::new();

    match command {
        RedisCommand::Scan { connection, scan } => {
            let conn = connect(&connection, config).await?;
            let mut limits = config.discovery.clone();
            if let Some(max_keys) = scan.max_keys {
                anyhow::ensure!(max_keys > 0, "--max-keys must be at least 1");
                limits.max_keys = max_keys;
            }

            let handle = KeyDiscoveryJob::new(conn.clone(), scan.request())
                .with_limits(limits)
                .spawn(&registry);
            let status = drive(&registry, handle).await;
            conn.close().await;
            status
        }
        RedisCommand::Inspect { connection, key } => {
            let conn = connect(&connection, config).await?;
            let handle = InspectorJob::new(conn.clone(), key)
                .with_limits(config.inspector.clone())
                .spawn(&registry);
            let status = drive(&registry, handle).await;
            conn.close().await;
            status
        }
    }
}

async fn connect(
    args: &RedisArgs,
    config: &KeyscopeConfig,
) -> anyhow::Result<Arc<RedisConnection>> {
    let client_config = args.client_config(&config.connection);
    let conn = RedisConnection::connect(&client_config)
        .await
        .with_context(|| format!("failed to connect to redis at {}:{}", args.host, args.port))?;
    Ok(Arc::new(conn))
}

/// Print every event of `handle` until the job is done.
///
/// The first Ctrl-C cancels whatever is running; the job still gets to emit
/// its `done` event with a continuation.
async fn drive<P: Serialize>(
    registry: &JobRegistry,
    mut handle: JobHandle<P>,
) -> anyhow::Result<JobStatus> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let job_id = handle.id();
    let mut interrupted = false;
    let mut status = None;

    loop {
        tokio::select! {
            event = handle.next() => match event {
                Some(event) => {
                    if event.is_done() {
                        status = Some(event.status());
                    }
                    output::print_json(&event)?;
                }
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                let cancelled = registry.cancel_all();
                tracing::info!(job_id = %job_id, cancelled, "interrupted, cancelling");
            }
        }
    }

    status.ok_or_else(|| anyhow!("job {} ended without a done event", job_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_core::TlsMode;
    use pretty_assertions::assert_eq;

    fn args() -> RedisArgs {
        RedisArgs {
            host: "cache.internal".to_string(),
            port: 6380,
            password: None,
            username: None,
            db: 0,
            tls: false,
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }

    #[test]
    fn test_tls_modes() {
        assert_eq!(args().tls_config().mode, TlsMode::Disable);

        let verified = RedisArgs {
            tls: true,
            ca_cert: Some(PathBuf::from("/etc/ca.pem")),
            ..args()
        };
        let tls = verified.tls_config();
        assert_eq!(tls.mode, TlsMode::VerifyFull);
        assert_eq!(tls.ca_cert, Some(PathBuf::from("/etc/ca.pem")));

        let insecure = RedisArgs {
            tls: true,
            insecure_skip_verify: true,
            ..args()
        };
        assert_eq!(insecure.tls_config().mode, TlsMode::Require);
    }

    #[test]
    fn test_client_config_carries_credentials_and_timeouts() {
        let settings = ConnectionSettings {
            connect_timeout_ms: 250,
            command_timeout_ms: 750,
        };
        let config = RedisArgs {
            password: Some("hunter2".to_string()),
            username: Some("reader".to_string()),
            db: 3,
            ..args()
        }
        .client_config(&settings);

        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.port, 6380);
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.username.as_deref(), Some("reader"));
        assert_eq!(config.database, 3);
        assert_eq!(config.connect_timeout, settings.connect_timeout());
        assert_eq!(config.command_timeout, settings.command_timeout());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_scan_request() {
        let request = ScanArgs {
            query: Some("user".to_string()),
            prefix: Some("app:".to_string()),
            metadata: true,
            max_keys: None,
            resume: Some("1234".to_string()),
        }
        .request();

        assert_eq!(request.query.as_deref(), Some("user"));
        assert_eq!(request.prefix.as_deref(), Some("app:"));
        assert!(request.include_metadata);
        assert_eq!(request.resume_cursor.as_deref(), Some("1234"));
        assert_eq!(ScanArgs::default().request(), DiscoveryRequest::default());
    }
}
