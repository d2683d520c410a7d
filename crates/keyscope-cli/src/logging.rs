//! Logging and tracing setup for the `keyscope` binary
//!
//! Console logs go to stderr, leaving stdout to the JSON event lines.
//! `--log-json` adds a daily-rotated JSON log file, which is what bug
//! reports should attach. `RUST_LOG` overrides the default filter.

use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where JSON log files are written
    pub log_dir: PathBuf,

    /// Whether to also write JSON logs to a file
    pub enable_json_logs: bool,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close (job and connect timings)
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::development()
        } else {
            Self::production()
        }
    }
}

impl LoggingConfig {
    /// Quiet console, only warnings and job lifecycle
    pub fn production() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: false,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,keyscope_cli=info,keyscope_jobs=info".to_string(),
        }
    }

    /// Verbose console with locations and span timings
    pub fn development() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: false,
            include_location: true,
            enable_spans: true,
            default_filter: "info,keyscope_cli=debug,keyscope_jobs=debug,keyscope_driver_redis=debug,keyscope_driver_memcached=debug".to_string(),
        }
    }

    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.enable_json_logs = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the JSON file writer when dropped, so it must
/// live until the program exits.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter))
    };

    // NEW/CLOSE rather than ENTER: async spans are re-entered on every poll
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_ansi(std::io::stderr().is_terminal())
        .with_filter(filter())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "keyscope.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(filter())
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        "logging initialized"
    );

    Ok(guard)
}

/// `<local data dir>/keyscope/logs`
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keyscope")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory() {
        assert!(log_directory().ends_with("keyscope/logs"));
    }

    #[test]
    fn test_json_logs_are_opt_in() {
        assert!(!LoggingConfig::default().enable_json_logs);
        assert!(!LoggingConfig::production().enable_json_logs);
        assert!(
            LoggingConfig::production()
                .with_json_logs(true)
                .enable_json_logs
        );
    }

    #[test]
    fn test_production_is_quieter() {
        let production = LoggingConfig::production();
        assert!(production.default_filter.starts_with("warn"));
        assert!(!production.enable_spans);
        assert!(LoggingConfig::development().include_location);
    }
}
