//! # Built-in Cells
//!
//! Catalog of the cells the runtime can instantiate by name. Configuration
//! picks which ones are loaded; each is built through the container so its
//! dependencies are resolved the same way everywhere.

pub mod calculator;
pub mod greeter;
pub mod jsontest;

pub use calculator::{Calculator, CalculatorDeps};
pub use greeter::Greeter;
pub use jsontest::JsonTest;

use crate::registry::CellRef;
use cellium_di::{Container, DiError};
use std::sync::Arc;
use thiserror::Error;

/// Names accepted by [`build_cell`], in default load order.
pub const BUILTIN_CELLS: [&str; 3] = [Calculator::NAME, Greeter::NAME, JsonTest::NAME];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unknown cell '{0}'")]
    UnknownCell(String),

    #[error("Cell '{cell}' could not be built: {source}")]
    Dependency {
        cell: String,
        #[source]
        source: DiError,
    },
}

#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_CELLS.contains(&name)
}

/// Instantiate the built-in cell called `name`.
pub fn build_cell(name: &str, container: &Container) -> Result<CellRef, CatalogError> {
    let dependency = |source| CatalogError::Dependency {
        cell: name.to_string(),
        source,
    };

    let cell: CellRef = match name {
        Calculator::NAME => Arc::new(Calculator::new(
            container.build::<CalculatorDeps>().map_err(dependency)?,
        )),
        Greeter::NAME => Arc::new(Greeter::new()),
        JsonTest::NAME => Arc::new(JsonTest::new()),
        other => return Err(CatalogError::UnknownCell(other.to_string())),
    };
    Ok(cell)
}
