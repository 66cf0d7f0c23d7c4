//! # Cells
//!
//! A cell is a named unit of command-handling logic. The router addresses
//! it as `name:command:args`; the cell only sees `command` and the raw
//! `args` text.
//!
//! Most cells keep a [`CommandTable`] built once in their constructor and
//! forward [`Cell::execute`] and [`Cell::get_commands`] to it.

use cellium_compute::ComputeError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors a cell reports back to the router.
#[derive(Debug, Error)]
pub enum CellError {
    #[error("Command not found: '{command}' in cell '{cell}'")]
    CommandNotFound { command: String, cell: String },

    #[error("Invalid arguments for '{command}': {message}")]
    InvalidArguments { command: String, message: String },

    /// Deliberate business-logic failure.
    #[error("{0}")]
    Component(String),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

/// Raw argument text of one command, with JSON helpers.
///
/// Text that parses as a JSON object or array is also available as a
/// structured value. Anything else (including JSON scalars like `42` or
/// `"x"`) stays plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandArgs {
    raw: String,
    json: Option<Value>,
}

impl CommandArgs {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim_start();
        let json = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str::<Value>(&raw)
                .ok()
                .filter(|v| v.is_object() || v.is_array())
        } else {
            None
        };
        Self { raw, json }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The structured value, when the text is a JSON object or array.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Deserialize the structured value into `T`.
    pub fn parse_json<T: DeserializeOwned>(&self, command: &str) -> Result<T, CellError> {
        let value = self.json.clone().ok_or_else(|| CellError::InvalidArguments {
            command: command.to_string(),
            message: "expected a JSON object or array".to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| CellError::InvalidArguments {
            command: command.to_string(),
            message: e.to_string(),
        })
    }
}

impl From<&str> for CommandArgs {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A named unit of logic reachable through the router.
pub trait Cell: Send + Sync {
    /// Stable lowercase identifier used as the first command segment.
    fn cell_name(&self) -> &str;

    /// Run `command` with the raw argument text.
    fn execute(&self, command: &str, args: &str) -> Result<Value, CellError>;

    /// Command name → one-line description.
    fn get_commands(&self) -> BTreeMap<String, String>;
}

/// Handler bound to a concrete cell type.
pub type CommandHandler<C> = fn(&C, &CommandArgs) -> Result<Value, CellError>;

struct CommandEntry<C> {
    handler: CommandHandler<C>,
    description: &'static str,
}

/// Explicit command → handler table, built once per cell.
pub struct CommandTable<C> {
    commands: BTreeMap<&'static str, CommandEntry<C>>,
}

impl<C> Default for CommandTable<C> {
    fn default() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }
}

impl<C> CommandTable<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. Builder style, for use in cell constructors.
    #[must_use]
    pub fn command(
        mut self,
        name: &'static str,
        description: &'static str,
        handler: CommandHandler<C>,
    ) -> Self {
        self.commands.insert(
            name,
            CommandEntry {
                handler,
                description,
            },
        );
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run the handler for `command` against `cell`.
    pub fn dispatch(
        &self,
        cell: &C,
        cell_name: &str,
        command: &str,
        args: &str,
    ) -> Result<Value, CellError> {
        let entry = self
            .commands
            .get(command)
            .ok_or_else(|| CellError::CommandNotFound {
                command: command.to_string(),
                cell: cell_name.to_string(),
            })?;
        (entry.handler)(cell, &CommandArgs::new(args))
    }

    /// Command name → description, suitable for [`Cell::get_commands`].
    #[must_use]
    pub fn describe(&self) -> BTreeMap<String, String> {
        self.commands
            .iter()
            .map(|(name, entry)| ((*name).to_string(), entry.description.to_string()))
            .collect()
    }
}

impl<C> fmt::Debug for CommandTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.commands.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Counter {
        step: i64,
        table: CommandTable<Counter>,
    }

    impl Counter {
        fn new(step: i64) -> Self {
            Self {
                step,
                table: CommandTable::<Self>::new()
                    .command("next", "Add the step to the argument", Self::cmd_next)
                    .command("fail", "Always fails", Self::cmd_fail),
            }
        }

        fn cmd_next(&self, args: &CommandArgs) -> Result<Value, CellError> {
            let n: i64 = args.raw().trim().parse().map_err(|_| CellError::InvalidArguments {
                command: "next".into(),
                message: format!("'{}' is not a number", args.raw()),
            })?;
            Ok(json!(n + self.step))
        }

        fn cmd_fail(&self, _: &CommandArgs) -> Result<Value, CellError> {
            Err(CellError::Component("counter jammed".into()))
        }
    }

    impl Cell for Counter {
        fn cell_name(&self) -> &str {
            "counter"
        }

        fn execute(&self, command: &str, args: &str) -> Result<Value, CellError> {
            self.table.dispatch(self, self.cell_name(), command, args)
        }

        fn get_commands(&self) -> BTreeMap<String, String> {
            self.table.describe()
        }
    }

    #[test]
    fn test_dispatch_runs_handler() {
        let cell = Counter::new(2);
        assert_eq!(cell.execute("next", "40").unwrap(), json!(42));
    }

    #[test]
    fn test_unknown_command() {
        let err = Counter::new(1).execute("reset", "").unwrap_err();
        assert!(matches!(
            &err,
            CellError::CommandNotFound { command, cell } if command == "reset" && cell == "counter"
        ));
        assert_eq!(err.to_string(), "Command not found: 'reset' in cell 'counter'");
    }

    #[test]
    fn test_component_error_message() {
        let err = Counter::new(1).execute("fail", "").unwrap_err();
        assert_eq!(err.to_string(), "counter jammed");
    }

    #[test]
    fn test_describe_lists_commands() {
        let commands = Counter::new(1).get_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands["next"], "Add the step to the argument");
    }

    #[test]
    fn test_args_json_only_for_objects_and_arrays() {
        assert!(CommandArgs::new(r#"{"name":"Ada"}"#).json().is_some());
        assert!(CommandArgs::new("[1, 2]").json().is_some());
        assert!(CommandArgs::new("42").json().is_none());
        assert!(CommandArgs::new("\"quoted\"").json().is_none());
        assert!(CommandArgs::new("{not json").json().is_none());
        assert_eq!(CommandArgs::new("{not json").raw(), "{not json");
    }

    #[test]
    fn test_parse_json() {
        #[derive(Deserialize)]
        struct Greeting {
            name: String,
        }

        let args = CommandArgs::new(r#"{"name":"Ada"}"#);
        assert_eq!(args.parse_json::<Greeting>("greet").unwrap().name, "Ada");

        let err = CommandArgs::new("Ada").parse_json::<Greeting>("greet").err().unwrap();
        assert!(matches!(err, CellError::InvalidArguments { .. }));
    }
}
