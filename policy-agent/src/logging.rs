//! Logging setup.
//!
//! Console output in text or JSON, optional daily-rolling log file, local
//! timezone timestamps. `RUST_LOG` overrides the configured level.

use std::path::Path;

use chrono::Local;
use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "policy_agent=info,cron_scheduler=info,tower_http=info";

/// Log file name prefix inside the log directory.
const LOG_FILE_NAME: &str = "policy-agent.log";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Console log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Build the filter: `RUST_LOG` if set, else `level` applied to the agent's
/// crates, else [`DEFAULT_LOG_FILTER`].
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = match level {
        Some(level) => format!("policy_agent={level},cron_scheduler={level},tower_http={level}"),
        None => DEFAULT_LOG_FILTER.to_string(),
    };
    EnvFilter::try_new(&directive)
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", directive, e)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file and must be held until exit.
pub fn init_logging(
    level: Option<&str>,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(level)?;

    let console = match format {
        LogFormat::Text => fmt::layer().with_timer(LocalTimer).boxed(),
        LogFormat::Json => fmt::layer().json().with_timer(LocalTimer).boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("policy_agent=info"));
        assert!(DEFAULT_LOG_FILTER.contains("cron_scheduler=info"));
    }

    #[test]
    fn test_log_format_values() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("TEXT", true), Ok(LogFormat::Text));
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
