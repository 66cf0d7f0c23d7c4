//! # Cell Registry
//!
//! Name → cell map consulted by the router on every dispatch.
//!
//! ## Duplicate Names
//!
//! [`CellRegistry::register`] rejects a second cell under an existing name
//! and keeps the first one reachable. [`CellRegistry::replace`] is the only
//! way to swap a cell out.

use crate::cell::Cell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Cell '{0}' is already registered")]
    DuplicateCell(String),

    #[error("Cell name '{0}' is invalid: names are non-empty, lowercase and contain no ':'")]
    InvalidName(String),
}

/// Shared reference to a registered cell.
pub type CellRef = Arc<dyn Cell>;

#[derive(Default)]
pub struct CellRegistry {
    cells: RwLock<HashMap<String, CellRef>>,
}

impl CellRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a cell reachable under its `cell_name`.
    pub fn register(&self, cell: CellRef) -> Result<(), RegistryError> {
        let name = validated_name(cell.as_ref())?;
        let mut cells = self.cells.write();
        if cells.contains_key(&name) {
            warn!("[Registry] Rejecting duplicate cell: {}", name);
            return Err(RegistryError::DuplicateCell(name));
        }
        info!("[Registry] Registering cell: {}", name);
        cells.insert(name, cell);
        Ok(())
    }

    /// Register or overwrite, returning the cell that was replaced.
    pub fn replace(&self, cell: CellRef) -> Result<Option<CellRef>, RegistryError> {
        let name = validated_name(cell.as_ref())?;
        let previous = self.cells.write().insert(name.clone(), cell);
        if previous.is_some() {
            warn!("[Registry] Cell {} replaced", name);
        } else {
            info!("[Registry] Registering cell: {}", name);
        }
        Ok(previous)
    }

    pub fn unregister(&self, name: &str) -> Option<CellRef> {
        let removed = self.cells.write().remove(name);
        if removed.is_some() {
            info!("[Registry] Unregistered cell: {}", name);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<CellRef> {
        self.cells.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.cells.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cells.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    pub fn clear(&self) {
        self.cells.write().clear();
    }
}

fn validated_name(cell: &dyn Cell) -> Result<String, RegistryError> {
    let name = cell.cell_name();
    let valid = !name.is_empty()
        && !name.contains(':')
        && !name.chars().any(char::is_whitespace)
        && name.chars().all(|c| !c.is_uppercase());
    if valid {
        Ok(name.to_string())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}
