//! # Cellium Host
//!
//! Reads `cell:command:args` lines from stdin and prints each result, one
//! line per command. Stands in for the native bridge.
//!
//! With `CELLIUM_WORKER=1` the same executable serves as a pool worker and
//! speaks the task protocol on stdin/stdout instead.

use anyhow::{Context, Result};
use cellium_compute::{is_worker_process, run_worker};
use cellium_runtime::{task_registry, Runtime, RuntimeConfig};
use cellium_telemetry::{init_logging, LogWriter};
use std::io::{self, BufRead, Write};
use tracing::info;

fn main() -> Result<()> {
    if is_worker_process() {
        return run_worker(&task_registry());
    }

    let mut config = RuntimeConfig::from_env();
    // stdout carries command results
    config.telemetry.writer = LogWriter::Stderr;
    init_logging(&config.telemetry).context("Failed to initialize logging")?;

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let _guard = tokio_runtime.enter();

    let runtime = Runtime::bootstrap(config)?;
    runtime
        .install_as_global()
        .context("Failed to install global container")?;
    info!("Cellium is running. Reading commands from stdin.");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command")?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        writeln!(stdout, "{}", runtime.dispatch_to_string(command))?;
        stdout.flush()?;
    }

    runtime.shutdown();
    Ok(())
}
