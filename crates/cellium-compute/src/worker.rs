//! # Worker Side
//!
//! A worker is the host executable started again with [`WORKER_ENV`] set.
//! Its `main` checks [`is_worker_process`] first and hands control to
//! [`run_worker`], which serves requests until stdin closes.
//!
//! stdout carries the protocol; anything a task prints there corrupts the
//! stream. Logs belong on stderr.

use crate::protocol::{read_message, write_message, WorkerRequest, WorkerResponse};
use crate::registry::{TaskArgs, TaskRegistry};
use crate::WorkerFailure;
use anyhow::Context;
use std::io::{self, BufRead, Write};
use tracing::{debug, error, info};

/// Environment variable marking a process as a pool worker.
pub const WORKER_ENV: &str = "CELLIUM_WORKER";

/// `true` when this process was started by the pool.
#[must_use]
pub fn is_worker_process() -> bool {
    std::env::var(WORKER_ENV).is_ok_and(|v| v == "1")
}

/// Serve pool requests on stdin/stdout until EOF or `Shutdown`.
pub fn run_worker(registry: &TaskRegistry) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(registry, &mut stdin.lock(), &mut stdout.lock())
}

/// Request loop over arbitrary streams.
pub fn serve<R: BufRead, W: Write>(
    registry: &TaskRegistry,
    reader: &mut R,
    writer: &mut W,
) -> anyhow::Result<()> {
    let pid = std::process::id();

    loop {
        let request = read_message::<_, WorkerRequest>(reader).context("reading request")?;
        match request {
            None | Some(WorkerRequest::Shutdown) => {
                debug!(pid, "[Worker] Stopping");
                return Ok(());
            }
            Some(WorkerRequest::Init { initializers }) => {
                match run_initializers(registry, &initializers, pid) {
                    Ok(()) => {
                        write_message(writer, &WorkerResponse::Ready { pid })
                            .context("writing ready")?;
                        info!(pid, initializers = initializers.len(), "[Worker] Ready");
                    }
                    Err(failure) => {
                        error!(pid, error = %failure, "[Worker] Initializer failed");
                        write_message(
                            writer,
                            &WorkerResponse::InitFailed {
                                pid,
                                message: failure.to_string(),
                            },
                        )
                        .context("writing init failure")?;
                        return Ok(());
                    }
                }
            }
            Some(WorkerRequest::Run { id, call }) => {
                debug!(pid, id, task = %call.task, "[Worker] Running task");
                let outcome = registry.execute(&call, Some(pid)).into();
                write_message(writer, &WorkerResponse::Done { id, outcome })
                    .context("writing result")?;
            }
        }
    }
}

fn run_initializers(
    registry: &TaskRegistry,
    initializers: &[String],
    pid: u32,
) -> Result<(), WorkerFailure> {
    let args = TaskArgs::default();
    for name in initializers {
        let task = registry.get(name).ok_or_else(|| WorkerFailure {
            task: name.clone(),
            message: format!("unknown initializer '{name}'"),
            chain: Vec::new(),
            pid: Some(pid),
        })?;
        task(&args).map_err(|e| WorkerFailure::from_anyhow(name, &e, Some(pid)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskOutcome;
    use crate::registry::tests::registry;
    use crate::TaskCall;
    use serde_json::json;
    use std::io::Cursor;

    fn session(requests: &[WorkerRequest]) -> Vec<WorkerResponse> {
        session_with(&registry(), requests)
    }

    fn session_with(registry: &TaskRegistry, requests: &[WorkerRequest]) -> Vec<WorkerResponse> {
        let mut input = Vec::new();
        for request in requests {
            write_message(&mut input, request).unwrap();
        }
        let mut output = Vec::new();
        serve(registry, &mut Cursor::new(input), &mut output).unwrap();

        let mut reader = Cursor::new(output);
        let mut responses = Vec::new();
        while let Some(response) = read_message(&mut reader).unwrap() {
            responses.push(response);
        }
        responses
    }

    #[test]
    fn test_init_then_run() {
        let responses = session(&[
            WorkerRequest::Init {
                initializers: Vec::new(),
            },
            WorkerRequest::Run {
                id: 1,
                call: TaskCall::new("test.add").arg(20).arg(22),
            },
            WorkerRequest::Run {
                id: 2,
                call: TaskCall::new("missing"),
            },
        ]);

        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0], WorkerResponse::Ready { .. }));
        assert_eq!(
            responses[1],
            WorkerResponse::Done {
                id: 1,
                outcome: TaskOutcome::Ok { value: json!(42) }
            }
        );
        assert_eq!(
            responses[2],
            WorkerResponse::Done {
                id: 2,
                outcome: TaskOutcome::UnknownTask {
                    task: "missing".into()
                }
            }
        );
    }

    #[test]
    fn test_failing_task_reports_pid() {
        let responses = session(&[WorkerRequest::Run {
            id: 9,
            call: TaskCall::new("test.fail"),
        }]);
        match &responses[0] {
            WorkerResponse::Done {
                id: 9,
                outcome: TaskOutcome::Failed { failure },
            } => assert_eq!(failure.pid, Some(std::process::id())),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_failed_initializer_stops_worker() {
        let responses = session(&[
            WorkerRequest::Init {
                initializers: vec!["test.fail".into()],
            },
            WorkerRequest::Run {
                id: 1,
                call: TaskCall::new("test.add"),
            },
        ]);
        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0], WorkerResponse::InitFailed { .. }));
    }

    #[test]
    fn test_shutdown_ends_session() {
        let responses = session(&[
            WorkerRequest::Shutdown,
            WorkerRequest::Run {
                id: 1,
                call: TaskCall::new("test.add"),
            },
        ]);
        assert!(responses.is_empty());
    }
}
