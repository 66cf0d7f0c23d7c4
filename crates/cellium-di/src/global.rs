//! Process-wide container accessor.
//!
//! The runtime installs its container once during bootstrap; components that
//! cannot be handed a reference (worker-side code, free functions) read it here.

use crate::container::Container;
use crate::errors::DiError;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL: RwLock<Option<Arc<Container>>> = RwLock::new(None);
}

/// Install the process-wide container. Fails if one is already installed.
pub fn install_global(container: Arc<Container>) -> Result<(), DiError> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(DiError::AlreadyInitialized);
    }
    *slot = Some(container);
    Ok(())
}

/// The process-wide container.
pub fn global() -> Result<Arc<Container>, DiError> {
    GLOBAL.read().clone().ok_or(DiError::NotInitialized)
}

/// Remove the process-wide container, returning it if present.
pub fn reset_global() -> Option<Arc<Container>> {
    GLOBAL.write().take()
}
