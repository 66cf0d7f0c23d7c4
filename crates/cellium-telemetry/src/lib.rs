//! # Cellium Telemetry
//!
//! Structured logging for the host process and its pool workers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cellium_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&TelemetryConfig::from_env())?;
//!     tracing::info!("host started");
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CELLIUM_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `CELLIUM_JSON_LOGS` | `false` | JSON formatted output |
//! | `CELLIUM_LOG_WRITER` | `stdout` | `stdout` or `stderr` |

mod config;
mod logging;

pub use config::{LogWriter, TelemetryConfig};
pub use logging::{init_logging, LogInit};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter {0}")]
    Filter(String),
}
