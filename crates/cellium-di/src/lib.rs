//! # Cellium DI - Dependency Injection Container
//!
//! Keeps construction of shared services (event bus, worker pool, config) in
//! one place so cells only declare what they need.
//!
//! ```text
//! ┌──────────────┐ register()  ┌──────────────┐  resolve()  ┌──────────────┐
//! │  bootstrap   │ ──────────→ │  Container   │ ←────────── │     Cell     │
//! └──────────────┘             └──────────────┘             └──────────────┘
//!                                     │ singleton cache
//!                                     ▼
//!                               Arc<T> shared
//! ```
//!
//! ## Lifecycle
//!
//! 1. Bootstrap registers providers (order does not matter)
//! 2. The first `resolve` seals the container
//! 3. Singletons are built lazily, once, and shared
//!
//! ## Declaring Dependencies
//!
//! ```
//! use cellium_di::{dependencies, Container, Lifetime};
//! use std::sync::Arc;
//!
//! pub struct Settings { pub greeting: String }
//!
//! dependencies! {
//!     pub struct GreeterDeps {
//!         pub settings: Settings,
//!     }
//! }
//!
//! let container = Container::new();
//! container
//!     .register::<Settings, _>(Lifetime::Singleton, |_| {
//!         Ok(Arc::new(Settings { greeting: "hi".into() }))
//!     })
//!     .unwrap();
//! let deps: GreeterDeps = container.build().unwrap();
//! assert_eq!(deps.settings.greeting, "hi");
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
pub mod errors;
pub mod global;

pub use container::{BindingKey, Container, Injectable, Lifetime};
pub use errors::DiError;
pub use global::{global, install_global, reset_global};

/// Declare a dependency struct whose fields are resolved from a [`Container`].
///
/// Each `field: Type` becomes an `Arc<Type>` field, and the struct gets an
/// [`Injectable`] implementation that resolves every field by type.
#[macro_export]
macro_rules! dependencies {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            $($fvis $field: ::std::sync::Arc<$ty>,)*
        }

        impl $crate::Injectable for $name {
            fn inject(
                container: &$crate::Container,
            ) -> ::core::result::Result<Self, $crate::DiError> {
                ::core::result::Result::Ok(Self {
                    $($field: container.resolve::<$ty>()?,)*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    trait Store: Send + Sync {
        fn get(&self) -> u32;
    }

    struct Fixed(u32);

    impl Store for Fixed {
        fn get(&self) -> u32 {
            self.0
        }
    }

    dependencies! {
        struct Deps {
            store: dyn Store,
            label: String,
        }
    }

    #[test]
    fn test_dependencies_macro_resolves_fields() {
        let container = Container::new();
        container
            .register_instance::<dyn Store>(Arc::new(Fixed(7)))
            .unwrap();
        container
            .register_instance(Arc::new("label".to_string()))
            .unwrap();

        let deps: Deps = container.build().unwrap();
        assert_eq!(deps.store.get(), 7);
        assert_eq!(*deps.label, "label");
    }

    #[test]
    fn test_dependencies_macro_reports_missing() {
        let container = Container::new();
        container
            .register_instance::<dyn Store>(Arc::new(Fixed(7)))
            .unwrap();

        let err = container.build::<Deps>().err().unwrap();
        assert!(matches!(err, DiError::NotRegistered { .. }));
    }
}
