//! Pool configuration from environment variables.

use std::env;
use std::path::PathBuf;

/// Multiprocess manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiprocessConfig {
    /// Run tasks in worker processes (`false` runs them inline).
    pub enabled: bool,

    /// Worker count; `None` means one per CPU core.
    pub pool_size: Option<usize>,

    /// Executable started as a worker; `None` means the current executable.
    pub worker_program: Option<PathBuf>,
}

impl Default for MultiprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_size: None,
            worker_program: None,
        }
    }
}

impl MultiprocessConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CELLIUM_MP_ENABLED`: Use worker processes (default: true)
    /// - `CELLIUM_POOL_SIZE`: Worker count (default: CPU cores)
    /// - `CELLIUM_WORKER_PROGRAM`: Worker executable (default: current executable)
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("CELLIUM_MP_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            pool_size: env::var("CELLIUM_POOL_SIZE")
                .ok()
                .and_then(|v| v.trim().parse().ok()),

            worker_program: env::var_os("CELLIUM_WORKER_PROGRAM").map(PathBuf::from),
        }
    }

    /// Configuration with worker processes turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Effective worker count.
    #[must_use]
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(num_cpus::get).max(1)
    }
}
