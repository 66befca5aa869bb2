//! Tracing setup for the two binaries.
//!
//! The server (`docqa`) logs compact lines to stdout and mirrors them into a log file: the path
//! in `DOCQA_LOG_FILE` when set, `logs/docqa.log` otherwise. The file layer writes through a
//! non-blocking appender whose guard is parked in a static for the life of the process.
//!
//! The CLI (`docqa-cli`) keeps stdout for command output, so its logs go to stderr only and
//! default to `warn`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCQA_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "docqa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the server subscriber: stdout plus the log file. `RUST_LOG` defaults to `info`.
pub fn init_tracing() {
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = open_log_file(&log_file_path(std::env::var(LOG_FILE_ENV).ok())).map(
        |writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact()
        },
    );

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Install the CLI subscriber: stderr only. `RUST_LOG` defaults to `warn`.
pub fn init_cli_tracing() {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(stderr_layer)
        .init();
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Resolve the server log file from the `DOCQA_LOG_FILE` value; blank counts as unset.
fn log_file_path(explicit: Option<String>) -> PathBuf {
    explicit
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

/// Appending writer for `path`, or `None` (with a note on stderr) when it cannot be prepared.
fn open_log_file(path: &Path) -> Option<NonBlocking> {
    let Some(file_name) = path.file_name() else {
        eprintln!("Log path {} does not name a file", path.display());
        return None;
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {err}", dir.display());
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_file_lives_under_logs() {
        assert_eq!(log_file_path(None), PathBuf::from("logs/docqa.log"));
        assert_eq!(log_file_path(Some("  ".into())), PathBuf::from("logs/docqa.log"));
    }

    #[test]
    fn explicit_log_file_wins() {
        assert_eq!(
            log_file_path(Some("/var/log/docqa/server.log".into())),
            PathBuf::from("/var/log/docqa/server.log")
        );
    }

    #[test]
    fn log_file_parent_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("server.log");
        assert!(open_log_file(&path).is_some());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn path_without_file_name_is_refused() {
        assert!(open_log_file(Path::new("/")).is_none());
    }
}
