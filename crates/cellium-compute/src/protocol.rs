//! Host ↔ worker wire protocol.
//!
//! One JSON document per line. The host writes [`WorkerRequest`]s to the
//! worker's stdin and reads [`WorkerResponse`]s from its stdout:
//!
//! ```text
//! host                         worker
//!  │── Init { initializers } ──→ │
//!  │←────────── Ready { pid } ── │   (or InitFailed)
//!  │── Run { id, call } ───────→ │
//!  │←──── Done { id, outcome } ─ │
//!  │── Shutdown / EOF ─────────→ │   exits
//! ```

use crate::errors::{ComputeError, WorkerFailure};
use crate::registry::TaskCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Run the named initializers, then report `Ready`.
    Init { initializers: Vec<String> },
    Run { id: u64, call: TaskCall },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready { pid: u32 },
    InitFailed { pid: u32, message: String },
    Done { id: u64, outcome: TaskOutcome },
}

/// Result of one task as it crosses the pipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Ok { value: Value },
    Failed { failure: WorkerFailure },
    UnknownTask { task: String },
}

impl From<Result<Value, ComputeError>> for TaskOutcome {
    fn from(result: Result<Value, ComputeError>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(ComputeError::UnknownTask(task)) => Self::UnknownTask { task },
            Err(ComputeError::TaskFailed(failure)) => Self::Failed { failure },
            // The registry only produces the two variants above.
            Err(other) => Self::Failed {
                failure: WorkerFailure {
                    task: String::new(),
                    message: other.to_string(),
                    chain: Vec::new(),
                    pid: None,
                },
            },
        }
    }
}

impl From<TaskOutcome> for Result<Value, ComputeError> {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Ok { value } => Ok(value),
            TaskOutcome::Failed { failure } => Err(ComputeError::TaskFailed(failure)),
            TaskOutcome::UnknownTask { task } => Err(ComputeError::UnknownTask(task)),
        }
    }
}

/// Write one message followed by a newline and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read the next message. `Ok(None)` on EOF; blank lines are skipped.
pub fn read_message<R: BufRead, T: for<'de> Deserialize<'de>>(reader: &mut R) -> io::Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        return serde_json::from_str(line.trim_end())
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
    }
}
