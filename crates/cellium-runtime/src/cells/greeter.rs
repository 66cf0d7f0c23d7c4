//! `greeter:greet:<text>` appends a fixed salutation.

use crate::cell::{Cell, CellError, CommandArgs, CommandTable};
use serde_json::Value;
use std::collections::BTreeMap;

const SALUTATION: &str = "Hallo Cellium";

pub struct Greeter {
    table: CommandTable<Self>,
}

impl Default for Greeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Greeter {
    pub const NAME: &'static str = "greeter";

    #[must_use]
    pub fn new() -> Self {
        Self {
            table: CommandTable::<Self>::new().command(
                "greet",
                "Append a greeting to the given text",
                Self::cmd_greet,
            ),
        }
    }

    fn cmd_greet(&self, args: &CommandArgs) -> Result<Value, CellError> {
        let text = args.raw().trim_end();
        let greeting = if text.is_empty() {
            SALUTATION.to_string()
        } else {
            format!("{text} {SALUTATION}")
        };
        Ok(Value::String(greeting))
    }
}

impl Cell for Greeter {
    fn cell_name(&self) -> &str {
        Self::NAME
    }

    fn execute(&self, command: &str, args: &str) -> Result<Value, CellError> {
        self.table.dispatch(self, Self::NAME, command, args)
    }

    fn get_commands(&self) -> BTreeMap<String, String> {
        self.table.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_greet() {
        let greeter = Greeter::new();
        assert_eq!(greeter.execute("greet", "Hi").unwrap(), json!("Hi Hallo Cellium"));
        assert_eq!(greeter.execute("greet", "").unwrap(), json!("Hallo Cellium"));
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            Greeter::new().execute("wave", ""),
            Err(CellError::CommandNotFound { .. })
        ));
    }
}
