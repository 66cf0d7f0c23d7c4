//! # Calculator Cell
//!
//! `calc:eval:<expression>` and `calc:calc:<expression>`.
//!
//! ```text
//! raw text ──sanitize──→ "2*3+4" ──calc.evaluate (worker)──→ "10"
//!                                                       │
//!                                   CalcResult event ←──┘
//! ```
//!
//! Failed evaluations publish a `CalcResult` too, carrying the same
//! `Error: <message>` text the caller gets back.
//!
//! Sanitization keeps only digits, operators, parentheses, dots and spaces,
//! so the worker never sees anything but arithmetic.

use crate::arith;
use crate::cell::{Cell, CellError, CommandArgs, CommandTable};
use crate::router::ERROR_PREFIX;
use crate::tasks::CALC_EVALUATE;
use cellium_bus::{Event, EventBus, EventType, HandlerRef};
use cellium_compute::{ComputeError, MultiprocessManager, TaskCall};
use cellium_di::dependencies;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

dependencies! {
    pub struct CalculatorDeps {
        pub bus: EventBus,
        pub compute: MultiprocessManager,
    }
}

pub struct Calculator {
    deps: CalculatorDeps,
    table: CommandTable<Self>,
    result_logger: HandlerRef,
}

impl Calculator {
    pub const NAME: &'static str = "calc";

    pub fn new(deps: CalculatorDeps) -> Self {
        let result_logger = deps
            .bus
            .subscribe_fn(EventType::CalcResult, "calc.result_logger", |event| {
                if let Some(calc) = event.as_calc_result() {
                    if calc.result.starts_with(ERROR_PREFIX) {
                        warn!(
                            expression = calc.expression.as_deref().unwrap_or_default(),
                            error = %calc.result,
                            "[Calc] Evaluation failed"
                        );
                        return Ok(None);
                    }
                    info!(
                        expression = calc.expression.as_deref().unwrap_or_default(),
                        result = %calc.result,
                        "[Calc] Result published"
                    );
                }
                Ok(None)
            });

        Self {
            deps,
            table: CommandTable::<Self>::new()
                .command("calc", "Evaluate an arithmetic expression", Self::cmd_calc)
                .command(
                    "eval",
                    "Evaluate an arithmetic expression (+ - * / // ** and parentheses)",
                    Self::cmd_eval,
                ),
            result_logger,
        }
    }

    /// Sanitize and evaluate `expression` in the worker pool, publishing a
    /// `CalcResult` event with the outcome.
    pub fn evaluate(&self, expression: &str) -> Result<String, CellError> {
        let sanitized = arith::sanitize(expression);
        if sanitized.len() != expression.len() {
            debug!(original = expression, sanitized = %sanitized, "[Calc] Expression sanitized");
        }

        let outcome = self
            .deps
            .compute
            .submit(TaskCall::new(CALC_EVALUATE).arg(sanitized))
            .map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .map_err(|e| match e {
                ComputeError::TaskFailed(failure) => CellError::Component(failure.to_string()),
                other => CellError::Compute(other),
            });

        let published = match &outcome {
            Ok(result) => result.clone(),
            Err(e) => format!("{ERROR_PREFIX}{e}"),
        };
        self.deps
            .bus
            .publish(Event::calc_result(published, Some(expression.to_string())));
        outcome
    }

    fn cmd_calc(&self, args: &CommandArgs) -> Result<Value, CellError> {
        self.evaluate(args.raw()).map(Value::String)
    }

    fn cmd_eval(&self, args: &CommandArgs) -> Result<Value, CellError> {
        self.evaluate(args.raw()).map(Value::String)
    }
}

impl Cell for Calculator {
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

impl Drop for Calculator {
    fn drop(&mut self) {
        self.deps
            .bus
            .unsubscribe(EventType::CalcResult, &self.result_logger);
    }
}
