//! Tracing setup: human-readable stderr plus a JSON file log.
//!
//! The console honours `RUST_LOG` and falls back to `warn` (or brewery's
//! debug events with `--verbose`). The file sink always records `info` and
//! above as one JSON object per line. The file is rotated at start-up once
//! it grows past [`MAX_LOG_BYTES`].

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const MAX_LOG_BYTES: u64 = 2 * 1024 * 1024;
pub const LOG_BACKUPS: usize = 2;

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `log`, `log.1`, ... up by one when `log` exceeds `max_bytes`.
///
/// Returns whether a rotation happened. The oldest backup is discarded.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, backups: usize) -> io::Result<bool> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(false);
    }
    if backups == 0 {
        std::fs::remove_file(path)?;
        return Ok(true);
    }

    let oldest = backup_path(path, backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup_path(path, n);
        if from.exists() {
            std::fs::rename(&from, backup_path(path, n + 1))?;
        }
    }
    std::fs::rename(path, backup_path(path, 1))?;
    Ok(true)
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rotate_if_needed(path, MAX_LOG_BYTES, LOG_BACKUPS)?;
    OpenOptions::new().create(true).append(true).open(path)
}

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "warn,brewery=debug" } else { "warn" })
    })
}

/// Install the global subscriber. Safe to call more than once.
///
/// A log file that cannot be opened only disables the file sink.
pub fn init(log_file: Option<&Path>, verbose: bool) {
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter(verbose));

    let mut file_error = None;
    let file = log_file.and_then(|path| match open_log(path) {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_current_span(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::INFO),
        ),
        Err(e) => {
            file_error = Some((path.to_path_buf(), e));
            None
        }
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();

    if let Some((path, e)) = file_error {
        tracing::warn!(event = "log_file_unavailable", path = %path.display(), error = %e);
    }
}
