use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A task that ran and failed, as reported by the process that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    /// Registered task name.
    pub task: String,
    /// Top-level error message.
    pub message: String,
    /// Cause chain below the top-level message, outermost first.
    #[serde(default)]
    pub chain: Vec<String>,
    /// Worker pid, `None` when the task ran in the host process.
    #[serde(default)]
    pub pid: Option<u32>,
}

impl WorkerFailure {
    pub(crate) fn from_anyhow(task: &str, err: &anyhow::Error, pid: Option<u32>) -> Self {
        Self {
            task: task.to_string(),
            message: err.to_string(),
            chain: err.chain().skip(1).map(ToString::to_string).collect(),
            pid,
        }
    }

    pub(crate) fn panicked(task: &str, message: String, pid: Option<u32>) -> Self {
        Self {
            task: task.to_string(),
            message: format!("task panicked: {message}"),
            chain: Vec::new(),
            pid,
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.chain {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Multiprocess manager errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// The task itself returned an error or panicked.
    #[error("Task '{}' failed: {0}", .0.task)]
    TaskFailed(WorkerFailure),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Worker process {pid} exited while running '{task}'")]
    WorkerCrashed { task: String, pid: u32 },

    #[error("Process pool is shut down")]
    PoolShutdown,

    #[error("Failed to start worker process: {0}")]
    Spawn(String),

    #[error("Task submission failed: {0}")]
    Submission(String),
}

impl ComputeError {
    /// `true` when the task ran and failed, as opposed to never running to
    /// completion because of the pool.
    #[must_use]
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_includes_chain() {
        let err = anyhow::anyhow!("division by zero").context("evaluating 1/0");
        let failure = WorkerFailure::from_anyhow("calc.evaluate", &err, Some(42));

        assert_eq!(failure.message, "evaluating 1/0");
        assert_eq!(failure.chain, vec!["division by zero".to_string()]);
        assert_eq!(failure.to_string(), "evaluating 1/0: division by zero");

        let err = ComputeError::TaskFailed(failure);
        assert!(err.is_task_failure());
        assert_eq!(
            err.to_string(),
            "Task 'calc.evaluate' failed: evaluating 1/0: division by zero"
        );
    }

    #[test]
    fn test_pool_errors_are_not_task_failures() {
        assert!(!ComputeError::PoolShutdown.is_task_failure());
        assert!(!ComputeError::UnknownTask("x".into()).is_task_failure());
        assert!(!ComputeError::WorkerCrashed {
            task: "x".into(),
            pid: 1
        }
        .is_task_failure());
    }
}
