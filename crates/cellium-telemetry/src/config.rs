//! Telemetry configuration from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;

/// Where formatted log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogWriter {
    #[default]
    Stdout,
    /// Worker processes log here; their stdout is the task protocol.
    Stderr,
}

impl fmt::Display for LogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

impl FromStr for LogWriter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            other => Err(format!("unknown log writer '{other}'")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter directive (trace, debug, info, warn, error, or `target=level` lists)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    pub writer: LogWriter,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            writer: LogWriter::Stdout,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CELLIUM_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `CELLIUM_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `CELLIUM_LOG_WRITER`: `stdout` or `stderr` (default: stdout)
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("CELLIUM_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("CELLIUM_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),

            writer: env::var("CELLIUM_LOG_WRITER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Configuration for a pool worker: same filter, logs on stderr.
    pub fn for_worker() -> Self {
        Self {
            writer: LogWriter::Stderr,
            ..Self::from_env()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert_eq!(config.writer, LogWriter::Stdout);
    }

    #[test]
    fn test_for_worker_uses_stderr() {
        assert_eq!(TelemetryConfig::for_worker().writer, LogWriter::Stderr);
    }

    #[test]
    fn test_writer_parsing() {
        assert_eq!("STDERR".parse::<LogWriter>(), Ok(LogWriter::Stderr));
        assert!("file".parse::<LogWriter>().is_err());
    }
}
