//! Subscriber setup.
//!
//! Host and workers share this so a task's logs look the same whichever
//! process ran it; only the writer differs.

use crate::{LogWriter, TelemetryConfig, TelemetryError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Outcome of [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogInit {
    /// This call installed the global subscriber.
    Installed,
    /// A global subscriber was already in place; nothing changed.
    AlreadyInstalled,
}

/// Install the global `tracing` subscriber. Safe to call repeatedly.
pub fn init_logging(config: &TelemetryConfig) -> Result<LogInit, TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Filter(format!("'{}': {e}", config.log_level)))?;

    if INSTALLED.load(Ordering::SeqCst) {
        return Ok(LogInit::AlreadyInstalled);
    }

    let writer = match config.writer {
        LogWriter::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogWriter::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let installed = if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(config.writer == LogWriter::Stdout)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    INSTALLED.store(true, Ordering::SeqCst);
    match installed {
        Ok(()) => {
            tracing::debug!(
                filter = %config.log_level,
                json = config.json_logs,
                writer = %config.writer,
                "Logging initialized"
            );
            Ok(LogInit::Installed)
        }
        // Someone else (a test harness, the embedding app) got there first.
        Err(_) => Ok(LogInit::AlreadyInstalled),
    }
}

/// Log an event tagged with the component that emitted it.
///
/// ```rust,ignore
/// log_event!(info, "calc", "Expression evaluated", expression = %expr);
/// ```
#[macro_export]
macro_rules! log_event {
    ($level:ident, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the global subscriber can only be installed once per process.
    #[test]
    fn test_init_is_idempotent() {
        let config = TelemetryConfig {
            log_level: "debug".to_string(),
            ..TelemetryConfig::default()
        };
        let first = init_logging(&config).unwrap();
        assert!(matches!(first, LogInit::Installed | LogInit::AlreadyInstalled));
        assert_eq!(init_logging(&config).unwrap(), LogInit::AlreadyInstalled);

        log_event!(info, "telemetry", "macro expands", attempt = 2);
    }
}
