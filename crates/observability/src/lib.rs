// crates/observability/src/lib.rs
//! Process-wide `tracing` setup for posboard binaries.
//!
//! Console output goes to stderr (human-readable or JSON). An optional log
//! file rolls daily and is always written as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn,posboard=info";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Emit console logs as JSON lines.
    pub json: bool,
    /// Also append JSON logs to a daily-rolling file at this path.
    /// The date is appended to the file name.
    pub log_file: Option<PathBuf>,
    /// Overrides [`DEFAULT_FILTER`].
    pub default_filter: Option<String>,
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and closes the log file.
pub fn init(opts: &LogOptions) -> Result<Option<WorkerGuard>> {
    let default = opts.default_filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), default);

    let console = if opts.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &opts.log_file {
        Some(path) => {
            let (dir, prefix) = file_target(path)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(&dir, &prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

/// `RUST_LOG` when it parses, else `default`.
pub fn build_filter(rust_log: Option<&str>, default: &str) -> EnvFilter {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

/// Split a log path into the directory and file-name prefix the rolling
/// appender wants. A bare file name logs into the current directory.
fn file_target(path: &Path) -> Result<(PathBuf, String)> {
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .with_context(|| format!("log file path has no file name: {}", path.display()))?
        .to_string();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, prefix))
}
