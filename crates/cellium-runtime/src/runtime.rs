//! # Runtime
//!
//! Composition root. Owns the container, the loaded cells and the message
//! handler, and is the one place that shuts the worker pool down.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Register services in the container
//! 3. Instantiate configured cells and register them
//! 4. Attach the message handler to the event bus
//!
//! The worker pool is not started here; it starts with the first submitted
//! task.

use crate::cells::build_cell;
use crate::config::RuntimeConfig;
use crate::container::setup_container;
use crate::message::MessageHandler;
use crate::registry::{CellRef, CellRegistry, RegistryError};
use crate::router::CommandRouter;
use anyhow::{Context, Result};
use cellium_bus::EventBus;
use cellium_compute::MultiprocessManager;
use cellium_di::{global, install_global, reset_global, Container, DiError};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct Runtime {
    config: RuntimeConfig,
    container: Arc<Container>,
    bus: Arc<EventBus>,
    compute: Arc<MultiprocessManager>,
    router: CommandRouter,
    messages: MessageHandler,
    shut_down: AtomicBool,
}

impl Runtime {
    pub fn bootstrap(config: RuntimeConfig) -> Result<Self> {
        config.validate().context("Invalid runtime configuration")?;

        let container = setup_container(&config).context("Failed to set up service container")?;
        let bus = container
            .resolve::<EventBus>()
            .context("Failed to resolve event bus")?;
        let compute = container
            .resolve::<MultiprocessManager>()
            .context("Failed to resolve multiprocess manager")?;
        let registry = container
            .resolve::<CellRegistry>()
            .context("Failed to resolve cell registry")?;

        for name in &config.cells.enabled {
            let cell = build_cell(name, &container)
                .with_context(|| format!("Failed to load cell '{name}'"))?;
            registry
                .register(cell)
                .with_context(|| format!("Failed to register cell '{name}'"))?;
        }

        let router = CommandRouter::new(Arc::clone(&registry));
        let messages = MessageHandler::attach(Arc::clone(&bus), router.clone());

        info!(
            cells = ?registry.names(),
            multiprocess = compute.is_enabled(),
            pool_size = compute.pool_size(),
            "[Runtime] Bootstrap complete"
        );

        Ok(Self {
            config,
            container,
            bus,
            compute,
            router,
            messages,
            shut_down: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn compute(&self) -> &Arc<MultiprocessManager> {
        &self.compute
    }

    #[must_use]
    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    #[must_use]
    pub fn messages(&self) -> &MessageHandler {
        &self.messages
    }

    /// Publish this runtime's container as the process-wide one. Removed
    /// again on shutdown.
    pub fn install_as_global(&self) -> Result<(), DiError> {
        install_global(Arc::clone(&self.container))
    }

    /// Add a cell that is not part of the built-in catalog.
    pub fn register_cell(&self, cell: CellRef) -> Result<(), RegistryError> {
        self.router.registry().register(cell)
    }

    pub fn dispatch(&self, command: &str) -> Value {
        self.router.dispatch(command)
    }

    pub fn dispatch_to_string(&self, command: &str) -> String {
        self.router.dispatch_to_string(command)
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Detach from the bus and stop the worker pool, waiting for running
    /// tasks. Idempotent; also run on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[Runtime] Shutting down");
        self.messages.detach();
        if global().is_ok_and(|installed| Arc::ptr_eq(&installed, &self.container)) {
            reset_global();
        }
        self.compute.shutdown(true);
        info!("[Runtime] Shutdown complete");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
