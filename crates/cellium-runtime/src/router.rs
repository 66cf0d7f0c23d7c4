//! # Command Router
//!
//! Turns `"<cell>:<command>:<args>"` strings into cell invocations. The
//! router is the error boundary: whatever goes wrong below it comes back as
//! a value whose text starts with `Error: `.
//!
//! ```text
//! "calc:eval:2*3+4"
//!        │ parse (two splits)
//!        ▼
//! CommandInvocation { cell: "calc", command: "eval", args: "2*3+4" }
//!        │ registry lookup
//!        ▼
//! cell.execute("eval", "2*3+4") ──→ "10"
//! ```

use crate::cell::CellError;
use crate::registry::CellRegistry;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Prefix of every error value the router produces.
pub const ERROR_PREFIX: &str = "Error: ";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid command format")]
    InvalidFormat,
}

/// One parsed command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub cell_name: String,
    pub command: String,
    /// Everything after the second colon, verbatim (may contain colons).
    pub args: String,
}

impl CommandInvocation {
    /// Split `input` on the first two colons.
    ///
    /// Both colons are required; the args segment may be empty
    /// (`"greeter:greet:"`).
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut parts = input.splitn(3, ':');
        let (Some(cell_name), Some(command), Some(args)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidFormat);
        };

        if cell_name.is_empty() {
            return Err(ParseError::InvalidFormat);
        }

        Ok(Self {
            cell_name: cell_name.to_string(),
            command: command.to_string(),
            args: args.to_string(),
        })
    }
}

impl FromStr for CommandInvocation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.cell_name, self.command, self.args)
    }
}

/// Build the `Error: ...` value for `message`.
#[must_use]
pub fn error_value(message: impl fmt::Display) -> Value {
    Value::String(format!("{ERROR_PREFIX}{message}"))
}

/// `true` for values produced by [`error_value`].
#[must_use]
pub fn is_error_value(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.starts_with(ERROR_PREFIX))
}

/// Render a dispatch result for a string-only caller: strings verbatim,
/// everything else as JSON text.
#[must_use]
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves command strings against a [`CellRegistry`].
#[derive(Clone)]
pub struct CommandRouter {
    registry: Arc<CellRegistry>,
}

impl CommandRouter {
    pub fn new(registry: Arc<CellRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<CellRegistry> {
        &self.registry
    }

    /// Parse and run one command string. Never fails; errors are values.
    pub fn dispatch(&self, input: &str) -> Value {
        match CommandInvocation::parse(input) {
            Ok(invocation) => self.invoke(&invocation),
            Err(e) => {
                warn!(input, "[Router] Unparseable command");
                error_value(e)
            }
        }
    }

    /// [`dispatch`](Self::dispatch), rendered for the bridge.
    pub fn dispatch_to_string(&self, input: &str) -> String {
        render(&self.dispatch(input))
    }

    /// Run an already parsed invocation.
    pub fn invoke(&self, invocation: &CommandInvocation) -> Value {
        let Some(cell) = self.registry.get(&invocation.cell_name) else {
            warn!(cell = %invocation.cell_name, "[Router] Cell not found");
            return error_value(format!("Cell '{}' not found", invocation.cell_name));
        };

        info!(command = %invocation, "[Router] Executing command");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            cell.execute(&invocation.command, &invocation.args)
        }));

        match outcome {
            Ok(Ok(value)) => {
                debug!(cell = %invocation.cell_name, command = %invocation.command, "[Router] Command completed");
                value
            }
            Ok(Err(e)) => {
                log_cell_error(invocation, &e);
                error_value(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    cell = %invocation.cell_name,
                    command = %invocation.command,
                    panic = %message,
                    "[Router] Cell panicked"
                );
                error_value(message)
            }
        }
    }
}

impl fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRouter")
            .field("cells", &self.registry.names())
            .finish()
    }
}

fn log_cell_error(invocation: &CommandInvocation, err: &CellError) {
    match err {
        CellError::CommandNotFound { .. } | CellError::InvalidArguments { .. } => warn!(
            cell = %invocation.cell_name,
            command = %invocation.command,
            error = %err,
            "[Router] Command rejected"
        ),
        _ => error!(
            cell = %invocation.cell_name,
            command = %invocation.command,
            error = %err,
            "[Router] Command failed"
        ),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "cell panicked".to_string()
    }
}
