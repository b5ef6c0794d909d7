//! Process-wide tracing setup: screen, rolling history and last-run file.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

pub const HISTORY_LOG: &str = "history.log";
pub const LAST_RUN_LOG: &str = "last-run.log";

/// Keeps the background log writers alive; drop at process exit to flush.
#[must_use]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `record_last_run` is false for commands that read the last-run file, so the
/// file survives until it has been printed.
pub fn init(log_dir: &Path, record_last_run: bool) -> Result<LogGuards> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let screen = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    let (history_writer, history_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, HISTORY_LOG));
    let history = fmt::layer()
        .with_writer(history_writer)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let mut guards = vec![history_guard];

    let last_run = if record_last_run {
        let path = log_dir.join(LAST_RUN_LOG);
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        guards.push(guard);

        Some(fmt::layer().with_writer(writer).with_ansi(false).with_filter(LevelFilter::INFO))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(screen)
        .with(history)
        .with(last_run)
        .try_init()
        .context("Failed to install logger")?;

    Ok(LogGuards { _guards: guards })
}

/// Contents of the previous run's log, if there is one.
pub fn read_last_run(log_dir: &Path) -> Result<Option<String>> {
    let path = log_dir.join(LAST_RUN_LOG);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
