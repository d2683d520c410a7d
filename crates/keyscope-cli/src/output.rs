//! Terminal output: JSON lines on stdout, tables for humans

use anyhow::Context;
use comfy_table::{Table, presets::UTF8_FULL};
use keyscope_drivers::Backend;
use keyscope_jobs::JobStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::ExitCode;

/// Write `value` as one line of JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let line = serde_json::to_string(value).context("failed to serialize output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line).context("failed to write to stdout")?;
    stdout.flush()?;
    Ok(())
}

/// One line of `keyscope backends`
#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub backend: Backend,
    pub default_port: u16,
}

impl From<Backend> for BackendInfo {
    fn from(backend: Backend) -> Self {
        Self {
            backend,
            default_port: backend.default_port(),
        }
    }
}

/// Two-column table of raw `stats` fields, sorted by name
pub fn stats_table(stats: &BTreeMap<String, String>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Stat", "Value"]);
    for (name, value) in stats {
        table.add_row(vec![name.as_str(), value.as_str()]);
    }
    table
}

/// Caps and cancellation are normal endings; only errors fail the process
pub fn is_failure(status: JobStatus) -> bool {
    matches!(status, JobStatus::Error)
}

pub fn exit_code(status: JobStatus) -> ExitCode {
    if is_failure(status) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table_rows() {
        let stats: BTreeMap<String, String> = [("uptime", "42"), ("curr_items", "7")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let rendered = stats_table(&stats).to_string();

        assert!(rendered.contains("Stat"));
        assert!(rendered.contains("uptime"));
        assert!(rendered.contains("42"));
        let items = rendered.find("curr_items").unwrap();
        let uptime = rendered.find("uptime").unwrap();
        assert!(items < uptime);
    }

    #[test]
    fn test_backend_info_json() {
        let json = serde_json::to_value(BackendInfo::from(Backend::Memcached)).unwrap();
        assert_eq!(json, serde_json::json!({"backend": "memcached", "default_port": 11211}));
    }

    #[test]
    fn test_exit_codes() {
        assert!(is_failure(JobStatus::Error));
        assert!(!is_failure(JobStatus::LimitReached));
        assert!(!is_failure(JobStatus::Cancelled));
        assert!(!is_failure(JobStatus::Completed));
    }
}
