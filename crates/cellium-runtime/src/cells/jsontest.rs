//! # JSON Test Cell
//!
//! Exercises structured arguments end to end: the bridge sends JSON text as
//! the args segment and gets text back.
//!
//! | Command   | Args               | Result                         |
//! |-----------|--------------------|--------------------------------|
//! | `echo`    | any text           | `Echo: <text>`                 |
//! | `greet`   | `{name, language}` | localized greeting             |
//! | `batch`   | JSON array         | item count and items           |
//! | `complex` | JSON object        | JSON text with `status`        |

use crate::cell::{Cell, CellError, CommandArgs, CommandTable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct GreetRequest {
    name: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ComplexPayload {
    #[serde(default)]
    user: Value,
    #[serde(default)]
    tags: Vec<Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ComplexReply {
    status: &'static str,
    #[serde(flatten)]
    payload: ComplexPayload,
}

pub struct JsonTest {
    table: CommandTable<Self>,
}

impl Default for JsonTest {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonTest {
    pub const NAME: &'static str = "jsontest";

    #[must_use]
    pub fn new() -> Self {
        Self {
            table: CommandTable::<Self>::new()
                .command("echo", "Echo the argument text", Self::cmd_echo)
                .command("greet", "Greet {name, language}", Self::cmd_greet)
                .command("batch", "Summarize a JSON array", Self::cmd_batch)
                .command("complex", "Echo {user, tags, metadata} with a status", Self::cmd_complex),
        }
    }

    fn cmd_echo(&self, args: &CommandArgs) -> Result<Value, CellError> {
        Ok(Value::String(format!("Echo: {}", args.raw())))
    }

    fn cmd_greet(&self, args: &CommandArgs) -> Result<Value, CellError> {
        let request: GreetRequest = args.parse_json("greet")?;
        let greeting = match request.language.as_deref() {
            Some("zh") => format!("你好，{}！", request.name),
            Some("de") => format!("Hallo, {}!", request.name),
            _ => format!("Hello, {}!", request.name),
        };
        Ok(Value::String(greeting))
    }

    fn cmd_batch(&self, args: &CommandArgs) -> Result<Value, CellError> {
        let items: Vec<Value> = args.parse_json("batch")?;
        let rendered: Vec<String> = items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        Ok(Value::String(format!(
            "Received {} items: {}",
            items.len(),
            rendered.join(", ")
        )))
    }

    fn cmd_complex(&self, args: &CommandArgs) -> Result<Value, CellError> {
        let payload: ComplexPayload = args.parse_json("complex")?;
        let reply = ComplexReply {
            status: "success",
            payload,
        };
        serde_json::to_string(&reply)
            .map(Value::String)
            .map_err(|e| CellError::Component(e.to_string()))
    }
}

impl Cell for JsonTest {
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

    fn run(command: &str, args: &str) -> Result<Value, CellError> {
        JsonTest::new().execute(command, args)
    }

    #[test]
    fn test_echo_keeps_raw_text() {
        assert_eq!(run("echo", "a:b c").unwrap(), json!("Echo: a:b c"));
    }

    #[test]
    fn test_greet_languages() {
        assert_eq!(run("greet", r#"{"name":"Ada"}"#).unwrap(), json!("Hello, Ada!"));
        assert_eq!(
            run("greet", r#"{"name":"Ada","language":"de"}"#).unwrap(),
            json!("Hallo, Ada!")
        );
        assert_eq!(
            run("greet", r#"{"name":"Ada","language":"zh"}"#).unwrap(),
            json!("你好，Ada！")
        );
    }

    #[test]
    fn test_greet_requires_object() {
        assert!(matches!(run("greet", "Ada"), Err(CellError::InvalidArguments { .. })));
        assert!(matches!(run("greet", r#"{"nom":"Ada"}"#), Err(CellError::InvalidArguments { .. })));
    }

    #[test]
    fn test_batch() {
        assert_eq!(
            run("batch", r#"["a", 2, {"k":true}]"#).unwrap(),
            json!(r#"Received 3 items: a, 2, {"k":true}"#)
        );
        assert_eq!(run("batch", "[]").unwrap(), json!("Received 0 items: "));
    }

    #[test]
    fn test_complex() {
        let reply = run("complex", r#"{"user":{"id":1},"tags":["x"],"metadata":{"v":2}}"#).unwrap();
        let parsed: Value = serde_json::from_str(reply.as_str().unwrap()).unwrap();
        assert_eq!(
            parsed,
            json!({"status": "success", "user": {"id": 1}, "tags": ["x"], "metadata": {"v": 2}})
        );
    }
}
