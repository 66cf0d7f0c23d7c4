//! # Cellium Runtime
//!
//! Embeddable component runtime: named cells reached through
//! `cell:command:args` strings, an event bus shared with the native bridge,
//! a dependency container and a process pool for CPU-bound work.
//!
//! ## Modular Structure
//!
//! - `cell` / `registry` - the `Cell` trait, command tables, name → cell map
//! - `router` - parses command strings and converts every failure to text
//! - `message` - bridge events → router dispatches
//! - `cells` - built-in cells and the catalog used at bootstrap
//! - `container` / `config` / `runtime` - composition root
//! - `tasks` - functions the worker pool can run
//!
//! ```text
//!  Native bridge ──JsQuery──→ EventBus ──→ MessageHandler ──→ CommandRouter
//!                                                                  │
//!                                         CellRegistry ←───────────┘
//!                                              │
//!                           Calculator ──submit──→ MultiprocessManager ──→ workers
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cellium_runtime::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::bootstrap(RuntimeConfig::from_env())?;
//! assert_eq!(runtime.dispatch_to_string("calc:eval:2*3+4"), "10");
//! runtime.shutdown();
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod arith;
pub mod cell;
pub mod cells;
pub mod config;
pub mod container;
pub mod message;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod tasks;

pub use cell::{Cell, CellError, CommandArgs, CommandHandler, CommandTable};
pub use config::{CellConfig, ConfigError, RuntimeConfig};
pub use container::setup_container;
pub use message::MessageHandler;
pub use registry::{CellRef, CellRegistry, RegistryError};
pub use router::{CommandInvocation, CommandRouter, ParseError, ERROR_PREFIX};
pub use runtime::Runtime;
pub use tasks::task_registry;
