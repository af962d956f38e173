//! Service registry: an ordered key → provider map.
//!
//! The container root is a [`Registry`], and every [`Scope`](crate::scope::Scope)
//! owns one for its local registrations. Besides the map, a registry keeps
//! the order keys were registered in; shutdown walks it backwards.
//!
//! [`ServiceStore`] is the lookup surface shared by the root and by scopes.
//! The root answers from its own map; a scope overrides the lookups to fall
//! through to its parent and the root.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{AlreadyRegisteredError, DepotError, NotFoundError, Result};
use crate::key::ServiceKey;
use crate::provider::ErasedProvider;
use crate::resolver::select_single;

/// Shared, type-erased provider.
pub type SharedProvider = Arc<dyn ErasedProvider>;

/// A key together with the provider registered under it.
pub type Binding = (ServiceKey, SharedProvider);

#[derive(Default)]
struct Entries {
    providers: HashMap<ServiceKey, SharedProvider>,
    order: Vec<ServiceKey>,
}

/// Ordered map of registrations.
///
/// All methods take `&self`; the map is behind a short-lived lock that is
/// never held while user code (factories, hooks) runs.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<Entries>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider for `key`.
    ///
    /// # Errors
    /// [`DepotError::AlreadyRegistered`] if `key` is already present in this
    /// registry. Parents and children are not consulted.
    pub fn register(&self, key: ServiceKey, provider: SharedProvider) -> Result<()> {
        let mut entries = self.entries.write();

        if entries.providers.contains_key(&key) {
            return Err(DepotError::AlreadyRegistered(AlreadyRegisteredError { key }));
        }

        debug!(
            key = %key,
            value_type = provider.value_type(),
            transient = provider.is_transient(),
            "Registered service"
        );
        entries.order.push(key.clone());
        entries.providers.insert(key, provider);
        Ok(())
    }

    /// Local lookup.
    pub fn get_local(&self, key: &ServiceKey) -> Option<SharedProvider> {
        self.entries.read().providers.get(key).cloned()
    }

    /// Returns `true` if `key` is registered locally.
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.entries.read().providers.contains_key(key)
    }

    /// Local bindings of `interface`, in registration order.
    pub fn local_bindings(&self, interface: &str) -> Vec<Binding> {
        self.collect(|key| key.is_binding_of(interface))
    }

    /// Local bindings of `interface` registered under `alias`.
    pub fn local_named_bindings(&self, interface: &str, alias: &str) -> Vec<Binding> {
        self.collect(|key| key.is_binding_of(interface) && key.name() == Some(alias))
    }

    /// Keys in registration order.
    pub fn order(&self) -> Vec<ServiceKey> {
        self.entries.read().order.clone()
    }

    /// Keys in reverse registration order.
    pub fn reverse_order(&self) -> Vec<ServiceKey> {
        let mut order = self.order();
        order.reverse();
        order
    }

    /// Every registration, in registration order.
    pub fn snapshot(&self) -> Vec<Binding> {
        self.collect(|_| true)
    }

    /// Empties the registry and returns what it held, newest first.
    ///
    /// Snapshot and clear happen under one write lock.
    pub fn drain_reverse(&self) -> Vec<Binding> {
        let mut entries = self.entries.write();
        let Entries { mut providers, order } = std::mem::take(&mut *entries);
        drop(entries);

        order
            .into_iter()
            .rev()
            .filter_map(|key| providers.remove(&key).map(|provider| (key, provider)))
            .collect()
    }

    /// Empties the local map and order.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.providers.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().providers.is_empty()
    }

    fn collect(&self, mut filter: impl FnMut(&ServiceKey) -> bool) -> Vec<Binding> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter(|key| filter(key))
            .filter_map(|key| {
                entries
                    .providers
                    .get(key)
                    .map(|provider| (key.clone(), provider.clone()))
            })
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.order())
            .finish()
    }
}

/// Lookup surface shared by the root registry and scopes.
///
/// The provided methods answer from [`ServiceStore::local`] only; scopes
/// override them to delegate to their ancestors.
pub trait ServiceStore: Send + Sync {
    /// The store's own registrations.
    fn local(&self) -> &Registry;

    /// Looks `key` up in this store and, for scopes, its ancestors.
    fn get_opt(&self, key: &ServiceKey) -> Option<SharedProvider> {
        self.local().get_local(key)
    }

    /// Bindings of `interface` visible from this store.
    fn bindings(&self, interface: &str) -> Vec<Binding> {
        self.local().local_bindings(interface)
    }

    /// Bindings of `interface` under `alias` visible from this store.
    fn named_bindings(&self, interface: &str, alias: &str) -> Vec<Binding> {
        self.local().local_named_bindings(interface, alias)
    }

    /// Every key visible from this store.
    fn visible_keys(&self) -> Vec<ServiceKey> {
        self.local().order()
    }

    /// Like [`ServiceStore::get_opt`], failing when absent.
    ///
    /// # Errors
    /// [`DepotError::NotFound`] if no store in the chain has `key`.
    fn get(&self, key: &ServiceKey) -> Result<SharedProvider> {
        trace!(key = %key, "Looking up service");
        self.get_opt(key).ok_or_else(|| {
            DepotError::NotFound(NotFoundError {
                key: key.clone(),
                suggestions: Vec::new(),
            })
        })
    }

    /// The single binding of `interface` registered under `alias`.
    ///
    /// # Errors
    /// - [`DepotError::NotFound`] when nothing matches.
    /// - [`DepotError::AmbiguousService`] when several implementations do.
    fn find_by_name(&self, interface: &str, alias: &str) -> Result<SharedProvider> {
        let matches = self.named_bindings(interface, alias);
        match select_single(interface, Some(alias), matches)? {
            Some((_, provider)) => Ok(provider),
            None => Err(DepotError::NotFound(NotFoundError {
                key: ServiceKey::build(interface, None, Some(alias)),
                suggestions: Vec::new(),
            })),
        }
    }
}

impl ServiceStore for Registry {
    fn local(&self) -> &Registry {
        self
    }
}
