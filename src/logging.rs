//! Tracing setup for the `forge-dash` binary.
//!
//! Logs go to stderr so stdout stays clean for command output. `RUST_LOG`
//! overrides the default filter.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{Error, Result};

/// Logging switches taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable logs on stderr
    pub json: bool,
    /// Also append JSON logs to this file
    pub file: Option<PathBuf>,
}

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,forge_dashboard=debug"
    } else {
        "warn,forge_dashboard=info"
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file when dropped; keep it alive for
/// the life of the process.
pub fn init_logging(opts: &LogOptions) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(opts.verbose)));

    let (file_writer, guard) = match &opts.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_json = opts
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let stderr_text = (!opts.json).then(|| fmt::layer().with_writer(std::io::stderr));
    let file_layer = file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_json)
        .with(stderr_text)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to initialize logging: {}", e)))?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("log file has no name: {}", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}
