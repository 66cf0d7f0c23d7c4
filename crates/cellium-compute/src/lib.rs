//! # Cellium Compute - Multiprocess Task Manager
//!
//! Moves CPU-bound work off the caller's thread and into separate OS
//! processes, so a slow computation never blocks the UI thread of the host.
//!
//! ## Model
//!
//! - Tasks are plain functions registered by name in a [`TaskRegistry`]
//! - The host executable doubles as the worker (see [`worker`])
//! - The pool is created on first submission, sized to the CPU count
//! - With multiprocessing disabled, the same registry runs tasks inline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cellium_compute::{MultiprocessConfig, MultiprocessManager, TaskCall, TaskRegistry};
//!
//! let mut registry = TaskRegistry::new();
//! registry.register("math.square", |args| {
//!     let n = args.arg(0).and_then(|v| v.as_f64()).unwrap_or_default();
//!     Ok((n * n).into())
//! });
//!
//! fn main() -> anyhow::Result<()> {
//!     if cellium_compute::is_worker_process() {
//!         return cellium_compute::run_worker(&registry);
//!     }
//!     let manager = MultiprocessManager::new(registry.into(), &MultiprocessConfig::from_env());
//!     let value = manager.submit(TaskCall::new("math.square").arg(4))?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod errors;
pub mod handle;
pub mod manager;
mod pool;
pub mod protocol;
pub mod registry;
pub mod worker;

pub use config::MultiprocessConfig;
pub use errors::{ComputeError, WorkerFailure};
pub use handle::TaskHandle;
pub use manager::MultiprocessManager;
pub use registry::{TaskArgs, TaskCall, TaskFn, TaskRegistry};
pub use worker::{is_worker_process, run_worker, WORKER_ENV};
