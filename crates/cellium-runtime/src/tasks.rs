//! Task functions shipped to pool workers.
//!
//! The same [`task_registry`] is compiled into the host and the worker, so a
//! task is addressed by name only. Anything a cell wants to run off-thread
//! is registered here.

use crate::arith;
use anyhow::Context;
use cellium_compute::{TaskArgs, TaskRegistry};
use cellium_telemetry::{init_logging, log_event, TelemetryConfig};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;

/// Evaluate a sanitized arithmetic expression; args: `[expression]`.
pub const CALC_EVALUATE: &str = "calc.evaluate";

/// Worker initializer that installs stderr logging.
pub const TELEMETRY_INIT: &str = "telemetry.init";

/// `{ "pid": <id>, "logging": <bool> }` of the process that ran the task;
/// `logging` is set once a global subscriber is installed there.
pub const PROCESS_INFO: &str = "process.info";

/// Block for `[millis]` (capped at [`MAX_SLEEP_MS`]), then return `millis`.
pub const PROCESS_SLEEP: &str = "process.sleep";

pub const MAX_SLEEP_MS: u64 = 60_000;

/// Registry of every task the runtime knows.
#[must_use]
pub fn task_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register(CALC_EVALUATE, calc_evaluate)
        .register(TELEMETRY_INIT, telemetry_init)
        .register(PROCESS_INFO, process_info)
        .register(PROCESS_SLEEP, process_sleep);
    registry
}

fn calc_evaluate(args: &TaskArgs) -> anyhow::Result<Value> {
    let expression = args.str_arg(0)?;
    let result = arith::evaluate(expression)?;
    log_event!(debug, "task", "Expression evaluated", expression, result = %result);
    Ok(Value::String(result.to_string()))
}

fn telemetry_init(_args: &TaskArgs) -> anyhow::Result<Value> {
    let outcome = init_logging(&TelemetryConfig::for_worker())
        .context("failed to initialize worker logging")?;
    log_event!(debug, "task", "Worker telemetry ready", ?outcome);
    Ok(Value::Null)
}

fn process_info(_args: &TaskArgs) -> anyhow::Result<Value> {
    Ok(json!({
        "pid": std::process::id(),
        "logging": tracing::dispatcher::has_been_set(),
    }))
}

fn process_sleep(args: &TaskArgs) -> anyhow::Result<Value> {
    let millis = args
        .arg(0)
        .and_then(Value::as_u64)
        .context("argument 0 must be a non-negative integer")?
        .min(MAX_SLEEP_MS);
    thread::sleep(Duration::from_millis(millis));
    Ok(json!(millis))
}
