//! Providers: one factory plus its cache, per key.
//!
//! A [`Provider<T>`] owns the factory for `T`, a transience flag and, for
//! singletons, a cache cell populated on first resolve. Providers are stored
//! type-erased as [`ErasedProvider`] trait objects and downcast back to
//! `Provider<T>` with the type the caller asks for.
//!
//! # Lifecycle capabilities
//! Instances may need to be stopped on shutdown or probed for health. Rust
//! cannot ask a value at runtime whether it implements a trait, so the
//! capability is attached when the provider is built:
//!
//! ```rust
//! use depot_container::error::BoxError;
//! use depot_container::provider::{HealthProbe, Provider, Stoppable};
//! use std::sync::Arc;
//!
//! struct Pool;
//!
//! impl Stoppable for Pool {
//!     fn stop(&self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! impl HealthProbe for Pool {
//!     fn probe(&self) -> Result<bool, BoxError> {
//!         Ok(true)
//!     }
//! }
//!
//! let provider = Provider::singleton(|_| Ok(Arc::new(Pool))).stoppable().probed();
//! assert!(!provider.is_transient());
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::container::Container;
use crate::error::{BoxError, DepotError, Result};
use crate::key::ServiceKey;

/// Factory closure stored by a provider.
///
/// Receives the container so it can resolve its own dependencies.
pub type FactoryFn<T> = Arc<dyn Fn(&Container) -> Result<T> + Send + Sync>;

type ShutdownHook<T> = Arc<dyn Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync>;
type HealthHook<T> = Arc<dyn Fn(&T) -> std::result::Result<bool, BoxError> + Send + Sync>;

/// A service that must release resources when the container shuts down.
pub trait Stoppable: Send + Sync {
    fn stop(&self) -> std::result::Result<(), BoxError>;
}

/// A service that can report whether it is healthy.
///
/// Returning an error counts as unhealthy.
pub trait HealthProbe: Send + Sync {
    fn probe(&self) -> std::result::Result<bool, BoxError>;
}

/// Type-erased view of a [`Provider<T>`].
pub trait ErasedProvider: Send + Sync + fmt::Debug {
    /// Access for downcasting back to `Provider<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Name of the produced type.
    fn value_type(&self) -> &'static str;

    fn is_transient(&self) -> bool;

    /// Returns `true` once a singleton instance is cached.
    fn is_resolved(&self) -> bool;

    /// Returns `true` if a shutdown hook is attached.
    fn has_shutdown_hook(&self) -> bool;

    /// Runs the shutdown hook on the cached instance, if any.
    fn shutdown(&self) -> std::result::Result<(), BoxError>;

    /// Result of the health hook on the cached instance.
    ///
    /// `None` when there is nothing to probe.
    fn health_check(&self) -> Option<bool>;

    /// Identity of the cached instance, used to stop shared instances once.
    fn instance_identity(&self) -> Option<usize>;
}

/// Factory, transience flag and singleton cache for one key.
pub struct Provider<T> {
    factory: FactoryFn<T>,
    transient: bool,
    cell: OnceCell<T>,
    on_shutdown: Option<ShutdownHook<T>>,
    on_health_check: Option<HealthHook<T>>,
    identity: Option<fn(&T) -> usize>,
}

impl<T: Clone + Send + Sync + 'static> Provider<T> {
    /// Creates a provider. `transient` is fixed for its lifetime.
    pub fn new(
        factory: impl Fn(&Container) -> Result<T> + Send + Sync + 'static,
        transient: bool,
    ) -> Self {
        Self {
            factory: Arc::new(factory),
            transient,
            cell: OnceCell::new(),
            on_shutdown: None,
            on_health_check: None,
            identity: None,
        }
    }

    /// Factory runs once; the result is cloned on every resolve.
    ///
    /// **`T` must implement `Clone`**, use `Arc<T>` for services.
    pub fn singleton(factory: impl Fn(&Container) -> Result<T> + Send + Sync + 'static) -> Self {
        Self::new(factory, false)
    }

    /// Factory runs on every resolve.
    pub fn transient(factory: impl Fn(&Container) -> Result<T> + Send + Sync + 'static) -> Self {
        Self::new(factory, true)
    }

    /// A singleton whose instance already exists.
    pub fn value(value: T) -> Self {
        let fallback = value.clone();
        let mut provider = Self::new(move |_| Ok(fallback.clone()), false);
        provider.cell = OnceCell::with_value(value);
        provider
    }

    /// Attaches a health hook.
    pub fn on_health_check(
        mut self,
        hook: impl Fn(&T) -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.on_health_check = Some(Arc::new(hook));
        self
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// The cached instance, if a singleton has been resolved.
    #[inline]
    pub fn cached(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Produces a value for `key`.
    ///
    /// Transients run the factory every time. Singletons return the cached
    /// instance when present without entering the cycle guard; otherwise the
    /// factory runs inside the guard and concurrent first callers wait for
    /// the one construction.
    pub fn resolve(&self, key: &ServiceKey, container: &Container) -> Result<T> {
        if self.transient {
            return container
                .coordinator()
                .with_cycle_guard(key, || (self.factory)(container));
        }

        if let Some(value) = self.cell.get() {
            trace!(key = %key, "Singleton cache hit");
            return Ok(value.clone());
        }

        container.coordinator().with_cycle_guard(key, || {
            self.cell
                .get_or_try_init(|| {
                    debug!(key = %key, "Constructing singleton");
                    (self.factory)(container)
                })
                .cloned()
        })
    }
}

impl<S: ?Sized + Send + Sync + 'static> Provider<Arc<S>> {
    /// Attaches a shutdown hook.
    ///
    /// Hooks are keyed on the `Arc` pointer: several keys handing out clones
    /// of one `Arc` run a hook for it only once per shutdown.
    pub fn on_shutdown(
        mut self,
        hook: impl Fn(&Arc<S>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.on_shutdown = Some(Arc::new(hook));
        self.identity = Some(arc_identity::<S>);
        self
    }

    /// Stops the instance through [`Stoppable`] on shutdown.
    pub fn stoppable(self) -> Self
    where
        S: Stoppable,
    {
        self.on_shutdown(|instance| instance.stop())
    }

    /// Probes the instance through [`HealthProbe`] during health checks.
    pub fn probed(self) -> Self
    where
        S: HealthProbe,
    {
        self.on_health_check(|instance| instance.probe())
    }
}

fn arc_identity<S: ?Sized>(instance: &Arc<S>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

impl<T: Clone + Send + Sync + 'static> ErasedProvider for Provider<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn is_transient(&self) -> bool {
        self.transient
    }

    fn is_resolved(&self) -> bool {
        !self.transient && self.cell.get().is_some()
    }

    fn has_shutdown_hook(&self) -> bool {
        self.on_shutdown.is_some()
    }

    fn shutdown(&self) -> std::result::Result<(), BoxError> {
        if self.transient {
            return Ok(());
        }
        match (self.cell.get(), &self.on_shutdown) {
            (Some(instance), Some(hook)) => hook(instance),
            _ => Ok(()),
        }
    }

    fn health_check(&self) -> Option<bool> {
        if self.transient {
            return None;
        }
        let instance = self.cell.get()?;
        let hook = self.on_health_check.as_ref()?;
        match hook(instance) {
            Ok(healthy) => Some(healthy),
            Err(err) => {
                warn!(value_type = type_name::<T>(), error = %err, "Health probe failed");
                Some(false)
            }
        }
    }

    fn instance_identity(&self) -> Option<usize> {
        let instance = self.cell.get()?;
        self.identity.map(|identity| identity(instance))
    }
}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("value_type", &type_name::<T>())
            .field("transient", &self.transient)
            .field("resolved", &self.cell.get().is_some())
            .field("shutdown_hook", &self.on_shutdown.is_some())
            .field("health_hook", &self.on_health_check.is_some())
            .finish()
    }
}

/// Downcasts an erased provider to the concrete `Provider<T>`.
///
/// # Errors
/// [`DepotError::TypeMismatch`] when the provider produces another type.
pub fn downcast<'a, T: Clone + Send + Sync + 'static>(
    provider: &'a dyn ErasedProvider,
    key: &ServiceKey,
) -> Result<&'a Provider<T>> {
    provider
        .as_any()
        .downcast_ref::<Provider<T>>()
        .ok_or_else(|| DepotError::TypeMismatch {
            key: key.clone(),
            expected: type_name::<T>(),
        })
}
