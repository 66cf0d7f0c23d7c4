//! # Runtime Configuration
//!
//! Unified configuration for the worker pool, logging and the set of cells
//! to load.
//!
//! ## Environment Variables
//!
//! | Variable                 | Default           |
//! |--------------------------|-------------------|
//! | `CELLIUM_MP_ENABLED`     | `true`            |
//! | `CELLIUM_POOL_SIZE`      | CPU cores         |
//! | `CELLIUM_WORKER_PROGRAM` | current exe       |
//! | `CELLIUM_CELLS`          | all built-in cells|
//! | `CELLIUM_LOG_LEVEL`      | `info`            |
//! | `CELLIUM_JSON_LOGS`      | `false`           |

use crate::cells::{is_builtin, BUILTIN_CELLS};
use cellium_compute::MultiprocessConfig;
use cellium_telemetry::TelemetryConfig;
use std::collections::HashSet;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Pool size must be at least 1")]
    ZeroPoolSize,

    #[error("Unknown cell '{0}' in configuration")]
    UnknownCell(String),

    #[error("Cell '{0}' is listed more than once")]
    DuplicateCell(String),
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub multiprocess: MultiprocessConfig,
    pub telemetry: TelemetryConfig,
    pub cells: CellConfig,
}

/// Which cells are instantiated at bootstrap, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConfig {
    pub enabled: Vec<String>,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            enabled: BUILTIN_CELLS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CellConfig {
    /// Comma-separated list from `CELLIUM_CELLS`; blank entries are skipped.
    pub fn from_env() -> Self {
        match env::var("CELLIUM_CELLS") {
            Ok(list) => Self {
                enabled: list
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
                    .collect(),
            },
            Err(_) => Self::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            multiprocess: MultiprocessConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
            cells: CellConfig::from_env(),
        }
    }

    /// Same as the default, with worker processes turned off.
    #[must_use]
    pub fn in_process() -> Self {
        Self {
            multiprocess: MultiprocessConfig::disabled(),
            ..Self::default()
        }
    }

    /// Reject settings that would only fail later, at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multiprocess.pool_size == Some(0) {
            return Err(ConfigError::ZeroPoolSize);
        }

        let mut seen = HashSet::new();
        for name in &self.cells.enabled {
            if !is_builtin(name) {
                return Err(ConfigError::UnknownCell(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateCell(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.multiprocess.enabled);
        assert_eq!(config.cells.enabled, vec!["calc", "greeter", "jsontest"]);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_in_process() {
        assert!(!RuntimeConfig::in_process().multiprocess.enabled);
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = RuntimeConfig::default();
        config.multiprocess.pool_size = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPoolSize));
    }

    #[test]
    fn test_unknown_and_duplicate_cells() {
        let mut config = RuntimeConfig::default();
        config.cells.enabled = vec!["calc".into(), "files".into()];
        assert_eq!(config.validate(), Err(ConfigError::UnknownCell("files".into())));

        config.cells.enabled = vec!["calc".into(), "calc".into()];
        assert_eq!(config.validate(), Err(ConfigError::DuplicateCell("calc".into())));
    }
}
