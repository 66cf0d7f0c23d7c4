//! # Container
//!
//! Type-keyed registry of providers with lazy, cached singleton resolution.
//!
//! ## Thread Safety
//!
//! - Bindings live behind a `RwLock`; resolution only holds a read lock long
//!   enough to clone the binding handle
//! - Each singleton slot has its own mutex, so two threads racing on the
//!   first resolution still produce exactly one instance
//! - Provider chains are tracked per thread to report cycles instead of
//!   deadlocking

use crate::errors::DiError;
use parking_lot::{Mutex, RwLock};
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// How often a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One shared instance, built on first resolution.
    Singleton,
    /// A fresh instance per resolution.
    Transient,
}

/// Lookup key of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingKey {
    /// Bound by Rust type.
    Type { id: TypeId, name: &'static str },
    /// Bound by string token (and type, so one token can't be read as another type).
    Token {
        token: String,
        id: TypeId,
        name: &'static str,
    },
}

impl BindingKey {
    fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    fn token<T: ?Sized + 'static>(token: &str) -> Self {
        Self::Token {
            token: token.to_string(),
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => f.write_str(name),
            Self::Token { token, name, .. } => write!(f, "'{token}' ({name})"),
        }
    }
}

/// Erased instance: the `Any` is always an `Arc<T>` for the bound `T`.
type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&Container) -> Result<Instance, DiError> + Send + Sync>;

struct Binding {
    lifetime: Lifetime,
    factory: Factory,
    instance: Mutex<Option<Instance>>,
}

thread_local! {
    static RESOLVING: RefCell<Vec<BindingKey>> = const { RefCell::new(Vec::new()) };
}

/// Pops the resolution stack even when a provider fails.
struct ResolvingGuard;

impl ResolvingGuard {
    fn enter(key: &BindingKey) -> Result<Self, DiError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(key) {
                let chain = stack
                    .iter()
                    .chain(std::iter::once(key))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(DiError::CircularDependency { chain });
            }
            stack.push(key.clone());
            Ok(Self)
        })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Something a container can build from its registered providers.
///
/// Usually generated by [`dependencies!`](crate::dependencies).
pub trait Injectable: Sized {
    fn inject(container: &Container) -> Result<Self, DiError>;
}

/// Dependency injection container.
///
/// Registration happens during startup; the first resolution that finds a
/// binding seals the container and later registrations fail with
/// [`DiError::Sealed`]. A lookup of a missing key does not seal.
#[derive(Default)]
pub struct Container {
    bindings: RwLock<HashMap<BindingKey, Arc<Binding>>>,
    sealed: AtomicBool,
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for `T`.
    ///
    /// Registering `T` again replaces the earlier provider.
    pub fn register<T, F>(&self, lifetime: Lifetime, factory: F) -> Result<(), DiError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, DiError> + Send + Sync + 'static,
    {
        self.insert(BindingKey::of::<T>(), lifetime, factory)
    }

    /// Register a ready-made shared instance of `T`.
    pub fn register_instance<T>(&self, instance: Arc<T>) -> Result<(), DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register::<T, _>(Lifetime::Singleton, move |_| Ok(Arc::clone(&instance)))
    }

    /// Register a provider under a string token.
    pub fn register_token<T, F>(&self, token: &str, lifetime: Lifetime, factory: F) -> Result<(), DiError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, DiError> + Send + Sync + 'static,
    {
        self.insert(BindingKey::token::<T>(token), lifetime, factory)
    }

    /// Resolve `T`, building it through its provider if needed.
    pub fn resolve<T>(&self) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_key(BindingKey::of::<T>())
    }

    /// Resolve a token-bound `T`.
    pub fn resolve_token<T>(&self, token: &str) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_key(BindingKey::token::<T>(token))
    }

    /// Build an [`Injectable`] value (typically a cell's dependency struct).
    pub fn build<D: Injectable>(&self) -> Result<D, DiError> {
        D::inject(self)
    }

    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.bindings.read().contains_key(&BindingKey::of::<T>())
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Names of all bindings, for startup diagnostics.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.read().keys().map(ToString::to_string).collect();
        names.sort();
        names
    }

    /// Drop every binding and cached instance and unseal. Test boundaries only.
    pub fn reset(&self) {
        self.bindings.write().clear();
        self.sealed.store(false, Ordering::Release);
    }

    fn insert<T, F>(&self, key: BindingKey, lifetime: Lifetime, factory: F) -> Result<(), DiError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, DiError> + Send + Sync + 'static,
    {
        if self.is_sealed() {
            return Err(DiError::Sealed {
                key: key.to_string(),
            });
        }

        let binding = Binding {
            lifetime,
            factory: Box::new(move |container| {
                let instance: Instance = Arc::new(factory(container)?);
                Ok(instance)
            }),
            instance: Mutex::new(None),
        };

        let mut bindings = self.bindings.write();
        if bindings.contains_key(&key) {
            warn!(key = %key, "Provider already registered, replacing");
        }
        debug!(key = %key, lifetime = ?lifetime, "Provider registered");
        bindings.insert(key, Arc::new(binding));
        Ok(())
    }

    fn resolve_key<T>(&self, key: BindingKey) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let binding = self
            .bindings
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| DiError::NotRegistered {
                key: key.to_string(),
            })?;
        self.sealed.store(true, Ordering::Release);

        let _guard = ResolvingGuard::enter(&key)?;
        let instance = match binding.lifetime {
            Lifetime::Transient => (binding.factory)(self)?,
            Lifetime::Singleton => {
                let mut slot = binding.instance.lock();
                match slot.as_ref() {
                    Some(instance) => Arc::clone(instance),
                    None => {
                        let instance = (binding.factory)(self)?;
                        debug!(key = %key, "Singleton instantiated");
                        *slot = Some(Arc::clone(&instance));
                        instance
                    }
                }
            }
        };

        instance
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| DiError::TypeMismatch {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Clock {
        id: usize,
    }

    trait Greeting: Send + Sync {
        fn hello(&self) -> String;
    }

    struct English;

    impl Greeting for English {
        fn hello(&self) -> String {
            "hello".to_string()
        }
    }

    fn counting_clock(container: &Container, lifetime: Lifetime) -> Arc<AtomicUsize> {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container
            .register::<Clock, _>(lifetime, move |_| {
                let id = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Clock { id }))
            })
            .unwrap();
        built
    }

    #[test]
    fn test_singleton_is_shared() {
        let container = Container::new();
        let built = counting_clock(&container, Lifetime::Singleton);

        let a = container.resolve::<Clock>().unwrap();
        let b = container.resolve::<Clock>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_is_fresh() {
        let container = Container::new();
        let built = counting_clock(&container, Lifetime::Transient);

        let a = container.resolve::<Clock>().unwrap();
        let b = container.resolve::<Clock>().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_not_registered() {
        let container = Container::new();
        let err = container.resolve::<Clock>().err().unwrap();
        assert!(matches!(err, DiError::NotRegistered { .. }));
        assert!(err.to_string().contains("Clock"));
    }

    #[test]
    fn test_trait_object_binding() {
        let container = Container::new();
        container
            .register_instance::<dyn Greeting>(Arc::new(English))
            .unwrap();
        assert_eq!(container.resolve::<dyn Greeting>().unwrap().hello(), "hello");
    }

    #[test]
    fn test_token_binding_is_type_checked() {
        let container = Container::new();
        container
            .register_token::<String, _>("motd", Lifetime::Singleton, |_| Ok(Arc::new("hi".to_string())))
            .unwrap();

        assert_eq!(*container.resolve_token::<String>("motd").unwrap(), "hi");
        assert!(matches!(
            container.resolve_token::<u32>("motd"),
            Err(DiError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_provider_can_resolve_other_bindings() {
        struct Service {
            clock: Arc<Clock>,
        }

        let container = Container::new();
        counting_clock(&container, Lifetime::Singleton);
        container
            .register::<Service, _>(Lifetime::Singleton, |c| {
                Ok(Arc::new(Service {
                    clock: c.resolve::<Clock>()?,
                }))
            })
            .unwrap();

        let service = container.resolve::<Service>().unwrap();
        assert!(Arc::ptr_eq(&service.clock, &container.resolve::<Clock>().unwrap()));
    }

    #[test]
    fn test_circular_dependency_is_reported() {
        struct A;
        struct B;

        let container = Container::new();
        container
            .register::<A, _>(Lifetime::Singleton, |c| {
                c.resolve::<B>()?;
                Ok(Arc::new(A))
            })
            .unwrap();
        container
            .register::<B, _>(Lifetime::Singleton, |c| {
                c.resolve::<A>()?;
                Ok(Arc::new(B))
            })
            .unwrap();

        assert!(matches!(
            container.resolve::<A>(),
            Err(DiError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_sealed_after_first_resolution() {
        let container = Container::new();
        counting_clock(&container, Lifetime::Singleton);
        container.resolve::<Clock>().unwrap();

        assert!(container.is_sealed());
        let err = container.register_instance(Arc::new(42u32)).unwrap_err();
        assert!(matches!(err, DiError::Sealed { .. }));
    }

    #[test]
    fn test_missing_binding_does_not_seal() {
        let container = Container::new();
        assert!(container.resolve::<Clock>().is_err());
        assert!(!container.is_sealed());

        counting_clock(&container, Lifetime::Singleton);
        assert_eq!(container.resolve::<Clock>().unwrap().id, 0);
        assert!(container.is_sealed());
    }

    #[test]
    fn test_reset_unseals() {
        let container = Container::new();
        counting_clock(&container, Lifetime::Singleton);
        container.resolve::<Clock>().unwrap();

        container.reset();
        assert!(!container.is_sealed());
        assert!(!container.contains::<Clock>());
        container.register_instance(Arc::new(42u32)).unwrap();
    }

    #[test]
    fn test_concurrent_first_resolution_builds_once() {
        let container = Arc::new(Container::new());
        let built = counting_clock(&container, Lifetime::Singleton);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || container.resolve::<Clock>().unwrap().id)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0);
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
