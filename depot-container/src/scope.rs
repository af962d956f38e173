//! Child stores for hierarchical scoping.
//!
//! A [`Scope`] owns a [`Registry`] for services registered while it is open
//! and delegates every miss upwards:
//!
//! ```text
//! local registry  ──miss──>  parent scope (recursively)  ──miss──>  root registry
//! ```
//!
//! Only a scope opened at the top level links to the root registry; nested
//! scopes reach it through their outermost ancestor. The link is live, so
//! services registered at the root after the scope opened are visible too.
//!
//! Shadowing rules differ by lookup:
//! - exact keys and interface bindings: a local registration with the same
//!   key hides the ancestor's, everything else stays visible;
//! - named interface lookups: any local binding under the alias hides every
//!   ancestor binding under that alias.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::key::ServiceKey;
use crate::registry::{Binding, Registry, ServiceStore, SharedProvider};

/// A child store with its own shutdown boundary.
pub struct Scope {
    id: u64,
    name: String,
    registry: Registry,
    parent: Option<Arc<Scope>>,
    fallback: Option<Arc<Registry>>,
}

impl Scope {
    /// A scope opened with no other scope active; misses go to `root`.
    pub fn root_level(name: impl Into<String>, root: Arc<Registry>) -> Self {
        Self::with_links(name.into(), None, Some(root))
    }

    /// A scope nested inside `parent`.
    pub fn child_of(name: impl Into<String>, parent: Arc<Scope>) -> Self {
        Self::with_links(name.into(), Some(parent), None)
    }

    fn with_links(name: String, parent: Option<Arc<Scope>>, fallback: Option<Arc<Registry>>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            registry: Registry::new(),
            parent,
            fallback,
        }
    }

    /// Process-unique id, for logs.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Number of scopes from the root down to this one, this one included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |parent| parent.depth())
    }

    /// Registers a service local to this scope.
    pub fn register(&self, key: ServiceKey, provider: SharedProvider) -> crate::Result<()> {
        self.registry.register(key, provider)
    }

    /// Every registry visible from here, root first, this scope's last.
    pub fn lineage(&self) -> Vec<&Registry> {
        let mut chain = match (&self.parent, &self.fallback) {
            (Some(parent), _) => parent.lineage(),
            (None, Some(root)) => vec![root.as_ref()],
            (None, None) => Vec::new(),
        };
        chain.push(&self.registry);
        chain
    }
}

impl ServiceStore for Scope {
    fn local(&self) -> &Registry {
        &self.registry
    }

    fn get_opt(&self, key: &ServiceKey) -> Option<SharedProvider> {
        if let Some(provider) = self.registry.get_local(key) {
            return Some(provider);
        }
        match (&self.parent, &self.fallback) {
            (Some(parent), _) => parent.get_opt(key),
            (None, Some(root)) => root.get_local(key),
            (None, None) => None,
        }
    }

    fn bindings(&self, interface: &str) -> Vec<Binding> {
        let mut merged = match (&self.parent, &self.fallback) {
            (Some(parent), _) => parent.bindings(interface),
            (None, Some(root)) => root.local_bindings(interface),
            (None, None) => Vec::new(),
        };

        for (key, provider) in self.registry.local_bindings(interface) {
            match merged.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = provider,
                None => merged.push((key, provider)),
            }
        }
        merged
    }

    fn named_bindings(&self, interface: &str, alias: &str) -> Vec<Binding> {
        let local = self.registry.local_named_bindings(interface, alias);
        if !local.is_empty() {
            return local;
        }
        match (&self.parent, &self.fallback) {
            (Some(parent), _) => parent.named_bindings(interface, alias),
            (None, Some(root)) => root.local_named_bindings(interface, alias),
            (None, None) => Vec::new(),
        }
    }

    fn visible_keys(&self) -> Vec<ServiceKey> {
        let mut seen = HashSet::new();
        self.lineage()
            .into_iter()
            .flat_map(Registry::order)
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depth", &self.depth())
            .field("registered", &self.registry.len())
            .finish()
    }
}
