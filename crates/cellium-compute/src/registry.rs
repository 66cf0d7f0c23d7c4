//! # Task Registry
//!
//! Closures can't cross a process boundary, so work is addressed by name.
//! The same registry is compiled into the host and into the worker
//! executable; a [`TaskCall`] only carries the name plus JSON arguments.

use crate::errors::{ComputeError, WorkerFailure};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// A task body. Arguments and results are JSON so they survive the pipe.
pub type TaskFn = fn(&TaskArgs) -> anyhow::Result<Value>;

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    #[must_use]
    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Map::new(),
        }
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Positional argument `index` as a string, or an error naming it.
    pub fn str_arg(&self, index: usize) -> anyhow::Result<&str> {
        self.arg(index)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("argument {index} must be a string"))
    }
}

/// A named task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCall {
    pub task: String,
    #[serde(flatten)]
    pub args: TaskArgs,
}

impl TaskCall {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: TaskArgs::default(),
        }
    }

    /// Same task, with `args` as positional arguments.
    pub fn with_args(task: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            task: task.into(),
            args: TaskArgs::positional(args),
        }
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.args.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.kwargs.insert(name.into(), value.into());
        self
    }

    /// Append any serializable value as a positional argument.
    pub fn serialized_arg<T: Serialize>(mut self, value: &T) -> Result<Self, ComputeError> {
        let value = serde_json::to_value(value).map_err(|e| {
            ComputeError::Submission(format!("argument for '{}' is not serializable: {e}", self.task))
        })?;
        self.args.args.push(value);
        Ok(self)
    }
}

/// Name → task function table.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskFn>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. A second registration under the same name wins.
    pub fn register(&mut self, name: impl Into<String>, task: TaskFn) -> &mut Self {
        let name = name.into();
        if self.tasks.insert(name.clone(), task).is_some() {
            warn!(task = %name, "Task already registered, replacing");
        } else {
            debug!(task = %name, "Task registered");
        }
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).copied()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run a call in the current process.
    ///
    /// Errors and panics from the task body come back as
    /// [`ComputeError::TaskFailed`]; `pid` is recorded in the failure.
    pub fn execute(&self, call: &TaskCall, pid: Option<u32>) -> Result<Value, ComputeError> {
        let task = self
            .get(&call.task)
            .ok_or_else(|| ComputeError::UnknownTask(call.task.clone()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| task(&call.args))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ComputeError::TaskFailed(WorkerFailure::from_anyhow(
                &call.task, &err, pid,
            ))),
            Err(payload) => Err(ComputeError::TaskFailed(WorkerFailure::panicked(
                &call.task,
                panic_message(payload.as_ref()),
                pid,
            ))),
        }
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
