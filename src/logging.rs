//! Tracing configuration and log routing.
//!
//! Stage banners and diagnostics go to stderr with a compact formatter, leaving stdout for answers.
//! A second, non-blocking layer appends the same events to a log file: the `--log-file` flag wins,
//! then `RUSTY_COUNSEL_LOG_FILE`, then `logs/rusty-counsel.log`. Setting the variable to `off`
//! disables the file layer.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "RUSTY_COUNSEL_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/rusty-counsel.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stderr and file layers.
///
/// `RUST_LOG` controls filtering (default `info`). Calling this twice is harmless; the second
/// subscriber is discarded.
pub fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    let file = resolve_log_path(log_file, std::env::var(LOG_FILE_ENV).ok())
        .and_then(|path| open_writer(&path))
        .map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
        });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn resolve_log_path(flag: Option<&Path>, env_value: Option<String>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path.to_path_buf());
    }
    match env_value.as_deref().map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("off") => None,
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => Some(PathBuf::from(DEFAULT_LOG_FILE)),
    }
}

fn open_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_environment() {
        let resolved = resolve_log_path(Some(Path::new("run.log")), Some("env.log".into()));
        assert_eq!(resolved, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn environment_value_and_default() {
        assert_eq!(
            resolve_log_path(None, Some("/tmp/counsel.log".into())),
            Some(PathBuf::from("/tmp/counsel.log"))
        );
        assert_eq!(
            resolve_log_path(None, Some("  ".into())),
            Some(PathBuf::from(DEFAULT_LOG_FILE))
        );
        assert_eq!(resolve_log_path(None, None), Some(PathBuf::from(DEFAULT_LOG_FILE)));
        assert_eq!(resolve_log_path(None, Some("OFF".into())), None);
    }

    #[test]
    fn writer_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/counsel.log");
        assert!(open_writer(&path).is_some());
        assert!(path.exists());
    }
}
