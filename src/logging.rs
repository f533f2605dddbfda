use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LogConfig;

fn env_filter(default_level: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid log level {:?}", default_level))
}

/// Sends all tracing output to a daily-rotated file, keeping
/// `max_files` of them. Keep the guard alive until exit or buffered lines
/// are lost.
pub fn init(config: &LogConfig) -> anyhow::Result<WorkerGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .max_log_files(config.max_files)
        .build(&config.directory)
        .with_context(|| format!("Failed to open log directory {}", config.directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(&config.level)?)
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting default subscriber failed")?;

    Ok(guard)
}

/// Console logging for the diagnostic tool.
pub fn init_stderr(default_level: &str) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level)?)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting default subscriber failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_level_is_accepted() {
        assert!(env_filter("debug").is_ok());
    }
}
