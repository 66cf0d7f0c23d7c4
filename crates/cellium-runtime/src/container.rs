//! # Service Container Setup
//!
//! Registers the shared services every cell may depend on.
//!
//! ```text
//! RuntimeConfig ──┐
//! TaskRegistry  ──┼──→ MultiprocessManager
//! EventBus        │
//! CellRegistry    │   (all singletons, built on first resolve)
//! ```

use crate::config::RuntimeConfig;
use crate::registry::CellRegistry;
use crate::tasks::{task_registry, TELEMETRY_INIT};
use cellium_bus::EventBus;
use cellium_compute::{MultiprocessManager, TaskRegistry};
use cellium_di::{Container, DiError, Lifetime};
use std::sync::Arc;
use tracing::debug;

/// Build the container for `config`. Nothing is constructed until the
/// first resolve.
pub fn setup_container(config: &RuntimeConfig) -> Result<Arc<Container>, DiError> {
    let container = Container::new();

    container.register_instance(Arc::new(config.clone()))?;

    container.register::<EventBus, _>(Lifetime::Singleton, |_| Ok(Arc::new(EventBus::new())))?;

    container.register::<TaskRegistry, _>(Lifetime::Singleton, |_| Ok(Arc::new(task_registry())))?;

    container.register::<MultiprocessManager, _>(Lifetime::Singleton, |c| {
        let config = c.resolve::<RuntimeConfig>()?;
        let registry = c.resolve::<TaskRegistry>()?;
        let manager = MultiprocessManager::new(registry, &config.multiprocess);
        manager
            .register_initializer(TELEMETRY_INIT)
            .map_err(|e| DiError::provider("MultiprocessManager", e))?;
        Ok(Arc::new(manager))
    })?;

    container.register::<CellRegistry, _>(Lifetime::Singleton, |_| Ok(Arc::new(CellRegistry::new())))?;

    debug!(bindings = ?container.registered(), "[Container] Services registered");
    Ok(Arc::new(container))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_are_singletons() {
        let container = setup_container(&RuntimeConfig::in_process()).unwrap();
        let a = container.resolve::<EventBus>().unwrap();
        let b = container.resolve::<EventBus>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_manager_gets_config_and_initializer() {
        let container = setup_container(&RuntimeConfig::in_process()).unwrap();
        let manager = container.resolve::<MultiprocessManager>().unwrap();
        assert!(!manager.is_enabled());
        assert_eq!(manager.initializers(), vec![TELEMETRY_INIT.to_string()]);
        assert!(Arc::ptr_eq(
            manager.registry(),
            &container.resolve::<TaskRegistry>().unwrap()
        ));
    }

    #[test]
    fn test_container_seals_after_resolve() {
        let container = setup_container(&RuntimeConfig::in_process()).unwrap();
        container.resolve::<CellRegistry>().unwrap();
        let err = container
            .register_instance(Arc::new(EventBus::new()))
            .unwrap_err();
        assert!(matches!(err, DiError::Sealed { .. }));
    }
}
