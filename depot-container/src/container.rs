//! # The Container, heart of Depot
//!
//! Registers factories, resolves services, opens and closes scopes, and
//! drives the shutdown and health-check protocol.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──open_scope()──> ScopeHandle
//!                                  │                            │
//!                            root Registry  <──fallback──  Scope (per context)
//! ```
//!
//! Every call targets the innermost scope opened by the calling thread (or
//! tokio task, with the `async` feature), or the root registry when none is
//! open.
//!
//! # Examples
//! ```rust
//! use depot_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct Repository {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::builder()
//!     .singleton_with(|_| Ok(Database { url: "postgres://localhost".into() }))
//!     .singleton_with(|c| Ok(Repository { db: c.get::<Database>()? }))
//!     .build()
//!     .expect("Failed to build container");
//!
//! let repo: Arc<Repository> = container.get().expect("Failed to resolve");
//! let db: Arc<Database> = container.get().expect("Failed to resolve");
//! assert!(Arc::ptr_eq(&repo.db, &db));
//! assert_eq!(db.url, "postgres://localhost");
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use depot_support::rendering::suggest_similar;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::context::ContextId;
use crate::coordinator::{DEFAULT_MAX_DEPTH, ResolutionCoordinator};
use crate::error::{
    DepotError, NotFoundError, Result, ScopeError, ShutdownError, ShutdownFailure,
};
use crate::health::HealthReport;
use crate::key::ServiceKey;
use crate::provider::{Provider, downcast};
use crate::registry::{Binding, Registry, ServiceStore, SharedProvider};
use crate::resolver;
use crate::scope::Scope;

// ============================================================
// Configuration
// ============================================================

/// Tunables for a [`Container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Maximum nesting of resolutions in one context.
    pub max_depth: usize,
    /// Maximum "did you mean" entries on a not-found error.
    pub suggestion_limit: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            suggestion_limit: 3,
        }
    }
}

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] with pre-registered services.
///
/// # Examples
/// ```rust,ignore
/// let container = Container::builder()
///     .max_depth(64)
///     .singleton_value(Config::load())
///     .singleton_with(|c| Ok(Database::connect(&c.get::<Config>()?.url)))
///     .transient_with(|c| Ok(UserService::new(c.get()?)))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    registrations: Vec<Binding>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Limit on nested resolutions; deeper chains fail with
    /// [`DepotError::DepthExceeded`].
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Number of suggestions attached to not-found errors.
    pub fn suggestion_limit(mut self, limit: usize) -> Self {
        self.config.suggestion_limit = limit;
        self
    }

    /// Registers an explicit provider under `key`.
    pub fn provider<T: Clone + Send + Sync + 'static>(
        mut self,
        key: ServiceKey,
        provider: Provider<T>,
    ) -> Self {
        self.registrations.push((key, Arc::new(provider)));
        self
    }

    /// Register a pre-built value as a singleton, resolved as `Arc<S>`.
    pub fn singleton_value<S: Send + Sync + 'static>(self, value: S) -> Self {
        self.provider(ServiceKey::of::<S>(), Provider::value(Arc::new(value)))
    }

    /// Register a singleton factory, resolved as `Arc<S>`.
    pub fn singleton_with<S: Send + Sync + 'static>(
        self,
        factory: impl Fn(&Container) -> Result<S> + Send + Sync + 'static,
    ) -> Self {
        self.provider(
            ServiceKey::of::<S>(),
            Provider::singleton(move |c| factory(c).map(Arc::new)),
        )
    }

    /// Register a transient factory, resolved as `Arc<S>`.
    pub fn transient_with<S: Send + Sync + 'static>(
        self,
        factory: impl Fn(&Container) -> Result<S> + Send + Sync + 'static,
    ) -> Self {
        self.provider(
            ServiceKey::of::<S>(),
            Provider::transient(move |c| factory(c).map(Arc::new)),
        )
    }

    /// Bind implementation `Impl` to interface `I` as a singleton.
    pub fn bind_with<I: ?Sized + Send + Sync + 'static, Impl: 'static>(
        self,
        factory: impl Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.provider(ServiceKey::binding::<I, Impl>(), Provider::singleton(factory))
    }

    /// Build the container.
    ///
    /// # Errors
    /// [`DepotError::AlreadyRegistered`] if two registrations share a key.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        info!(registered = self.registrations.len(), "Building container");

        let container = Container::with_config(self.config);
        for (key, provider) in self.registrations {
            container.root.register(key, provider)?;
        }

        info!("Container built successfully ✓");
        Ok(container)
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Scope bookkeeping for one execution context.
#[derive(Default)]
struct ContextScopes {
    stack: Vec<Arc<Scope>>,
    named: HashMap<String, Arc<Scope>>,
}

/// Thread-safe service container.
pub struct Container {
    root: Arc<Registry>,
    coordinator: ResolutionCoordinator,
    /// Per-context scope stacks; held only for short map updates.
    contexts: Mutex<HashMap<ContextId, ContextScopes>>,
    /// Serializes shutdown, reset and scope-open accounting.
    control: Mutex<()>,
    config: ContainerConfig,
}

impl Container {
    /// An empty container with default configuration.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            root: Arc::new(Registry::new()),
            coordinator: ResolutionCoordinator::new(config.max_depth),
            contexts: Mutex::new(HashMap::new()),
            control: Mutex::new(()),
            config,
        }
    }

    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Resolution chains and the open-scope count.
    ///
    /// Scope accounting is only changed by opening and closing scopes.
    pub fn coordinator(&self) -> &ResolutionCoordinator {
        &self.coordinator
    }


    // ── Registration ──

    /// Registers `factory` under `key` in the active scope, or the root.
    ///
    /// # Errors
    /// [`DepotError::AlreadyRegistered`] if the target store already has `key`.
    pub fn register<T: Clone + Send + Sync + 'static>(
        &self,
        key: ServiceKey,
        factory: impl Fn(&Container) -> Result<T> + Send + Sync + 'static,
        transient: bool,
    ) -> Result<()> {
        self.register_provider(key, Provider::new(factory, transient))
    }

    /// Registers a prepared provider in the active scope, or the root.
    pub fn register_provider<T: Clone + Send + Sync + 'static>(
        &self,
        key: ServiceKey,
        provider: Provider<T>,
    ) -> Result<()> {
        self.register_shared(key, Arc::new(provider))
    }

    fn register_shared(&self, key: ServiceKey, provider: SharedProvider) -> Result<()> {
        match self.current_scope() {
            Some(scope) => {
                trace!(key = %key, scope = scope.name(), "Registering in scope");
                scope.register(key, provider)
            }
            None => self.root.register(key, provider),
        }
    }

    /// Singleton factory resolved as `Arc<S>` under `ServiceKey::of::<S>()`.
    pub fn singleton<S: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&Container) -> Result<S> + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(ServiceKey::of::<S>(), move |c| factory(c).map(Arc::new), false)
    }

    /// Transient factory resolved as `Arc<S>` under `ServiceKey::of::<S>()`.
    pub fn transient<S: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&Container) -> Result<S> + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(ServiceKey::of::<S>(), move |c| factory(c).map(Arc::new), true)
    }

    /// Existing value resolved as `Arc<S>`.
    pub fn instance<S: Send + Sync + 'static>(&self, value: S) -> Result<()> {
        self.register_provider(ServiceKey::of::<S>(), Provider::value(Arc::new(value)))
    }

    /// Binds implementation `Impl` to interface `I`.
    ///
    /// ```rust
    /// use depot_container::prelude::*;
    /// use std::sync::Arc;
    ///
    /// trait Printable: Send + Sync {
    ///     fn print(&self) -> String;
    /// }
    /// struct Square;
    /// impl Printable for Square {
    ///     fn print(&self) -> String { "square".into() }
    /// }
    ///
    /// let container = Container::new();
    /// container
    ///     .bind::<dyn Printable, Square>(|_| Ok(Arc::new(Square) as Arc<dyn Printable>), false)
    ///     .unwrap();
    /// let shape: Arc<dyn Printable> = container.get().unwrap();
    /// assert_eq!(shape.print(), "square");
    /// ```
    pub fn bind<I: ?Sized + Send + Sync + 'static, Impl: ?Sized + 'static>(
        &self,
        factory: impl Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
        transient: bool,
    ) -> Result<()> {
        self.register(ServiceKey::binding::<I, Impl>(), factory, transient)
    }

    /// Like [`Container::bind`], under an alias.
    pub fn bind_named<I: ?Sized + Send + Sync + 'static, Impl: ?Sized + 'static>(
        &self,
        name: &str,
        factory: impl Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
        transient: bool,
    ) -> Result<()> {
        self.register(ServiceKey::named_binding::<I, Impl>(name), factory, transient)
    }

    // ── Resolution ──

    /// Resolves `key` as a `T`.
    ///
    /// # Errors
    /// - [`DepotError::NotFound`]: nothing visible under `key`.
    /// - [`DepotError::AmbiguousService`]: several interface bindings match.
    /// - [`DepotError::CircularDependency`] / [`DepotError::DepthExceeded`].
    /// - [`DepotError::TypeMismatch`]: `key` produces another type.
    /// - Errors raised by the factory, unchanged.
    pub fn resolve<T: Clone + Send + Sync + 'static>(&self, key: &ServiceKey) -> Result<T> {
        trace!(key = %key, "Resolving");
        match self.locate(key)? {
            Some(binding) => self.resolve_binding(binding),
            None => Err(self.not_found(key)),
        }
    }

    /// Like [`Container::resolve`], returning `None` when `key` is not
    /// registered. Ambiguity and factory errors still fail.
    pub fn resolve_optional<T: Clone + Send + Sync + 'static>(
        &self,
        key: &ServiceKey,
    ) -> Result<Option<T>> {
        self.locate(key)?
            .map(|binding| self.resolve_binding(binding))
            .transpose()
    }

    /// Resolves every implementation bound to `interface`.
    ///
    /// A named interface key resolves the bindings under that alias.
    pub fn resolve_all<T: Clone + Send + Sync + 'static>(
        &self,
        interface: &ServiceKey,
    ) -> Result<Vec<T>> {
        let parts = interface.parts();
        let bindings = self.with_target(|store| match parts.name {
            None => store.bindings(parts.type_name),
            Some(alias) => store.named_bindings(parts.type_name, alias),
        });

        bindings
            .into_iter()
            .map(|binding| self.resolve_binding(binding))
            .collect()
    }

    /// Resolves `Arc<S>` registered under `ServiceKey::of::<S>()`, or the
    /// only binding of interface `S`.
    pub fn get<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
        self.resolve(&ServiceKey::of::<S>())
    }

    /// Named variant of [`Container::get`].
    pub fn get_named<S: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<S>> {
        self.resolve(&ServiceKey::named::<S>(name))
    }

    /// Every implementation bound to interface `I`.
    pub fn get_all<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<I>>> {
        self.resolve_all(&ServiceKey::of::<I>())
    }

    /// Returns `true` if `key` would resolve to exactly one provider.
    pub fn contains(&self, key: &ServiceKey) -> bool {
        matches!(self.locate(key), Ok(Some(_)))
    }

    fn locate(&self, key: &ServiceKey) -> Result<Option<Binding>> {
        self.with_target(|store| resolver::locate(store, key))
    }

    fn resolve_binding<T: Clone + Send + Sync + 'static>(&self, binding: Binding) -> Result<T> {
        let (key, provider) = binding;
        downcast::<T>(provider.as_ref(), &key)?.resolve(&key, self)
    }

    fn not_found(&self, key: &ServiceKey) -> DepotError {
        let visible = self.with_target(|store| store.visible_keys());
        let suggestions = suggest_similar(key.as_str(), &visible, self.config.suggestion_limit)
            .into_iter()
            .map(ServiceKey::from)
            .collect();

        DepotError::NotFound(NotFoundError { key: key.clone(), suggestions })
    }

    // ── Scopes ──

    /// Opens a scope in the calling context.
    ///
    /// The scope nests inside the innermost open scope of this context, or
    /// links to the root registry. It stays the target of every call from
    /// this context until the handle is closed or dropped. Handles should be
    /// closed innermost first.
    pub fn open_scope(&self, name: &str) -> ScopeHandle<'_> {
        let context = ContextId::current();
        let parent = self.scope_stack_top(context);
        let scope = Arc::new(match parent {
            Some(parent) => Scope::child_of(name, parent),
            None => Scope::root_level(name, self.root.clone()),
        });

        let previous = {
            let _control = self.control.lock();
            self.coordinator.enter_scope();

            let mut contexts = self.contexts.lock();
            let state = contexts.entry(context).or_default();
            state.stack.push(scope.clone());
            state.named.insert(name.to_string(), scope.clone())
        };

        debug!(
            scope = name,
            id = scope.id(),
            depth = scope.depth(),
            context = ?context,
            "Opened scope"
        );

        ScopeHandle {
            container: self,
            scope,
            context,
            previous,
            closed: false,
        }
    }

    /// Runs `body` inside a fresh scope and closes it afterwards.
    ///
    /// Scope-local singletons are shut down on every exit path. When `body`
    /// fails its error is returned and teardown failures are only logged;
    /// when it succeeds, teardown failures are returned as
    /// [`DepotError::Shutdown`].
    ///
    /// ```rust
    /// use depot_container::prelude::*;
    ///
    /// #[derive(Debug)]
    /// struct CurrentUser(&'static str);
    ///
    /// let container = Container::new();
    /// let name = container
    ///     .with_scope(":request", |scope| {
    ///         scope.instance(CurrentUser("ada"))?;
    ///         Ok::<_, DepotError>(scope.get::<CurrentUser>()?.0)
    ///     })
    ///     .unwrap();
    /// assert_eq!(name, "ada");
    /// assert!(matches!(container.get::<CurrentUser>(), Err(e) if e.is_not_found()));
    /// ```
    pub fn with_scope<R, E>(
        &self,
        name: &str,
        body: impl FnOnce(&ScopeHandle<'_>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<DepotError>,
    {
        let handle = self.open_scope(name);
        let outcome = body(&handle);
        settle(name, outcome, handle.close())
    }

    /// Async variant of [`Container::with_scope`].
    ///
    /// The scope belongs to the current tokio task; `body` must run inside
    /// that task, which awaiting it here guarantees.
    #[cfg(feature = "async")]
    pub async fn with_scope_async<R, E, F, Fut>(&self, name: &str, body: F) -> std::result::Result<R, E>
    where
        E: From<DepotError>,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<R, E>>,
    {
        let handle = self.open_scope(name);
        let outcome = body().await;
        settle(name, outcome, handle.close())
    }

    /// Number of scopes open in the calling context.
    pub fn scope_depth(&self) -> usize {
        self.contexts
            .lock()
            .get(&ContextId::current())
            .map_or(0, |state| state.stack.len())
    }

    /// Number of scopes open across all contexts.
    pub fn active_scopes(&self) -> usize {
        self.coordinator.active_scopes()
    }

    fn current_scope(&self) -> Option<Arc<Scope>> {
        self.scope_stack_top(ContextId::current())
    }

    fn scope_stack_top(&self, context: ContextId) -> Option<Arc<Scope>> {
        self.contexts
            .lock()
            .get(&context)
            .and_then(|state| state.stack.last().cloned())
    }

    fn with_target<R>(&self, f: impl FnOnce(&dyn ServiceStore) -> R) -> R {
        match self.current_scope() {
            Some(scope) => f(scope.as_ref()),
            None => f(self.root.as_ref()),
        }
    }

    fn close_scope(
        &self,
        context: ContextId,
        scope: &Arc<Scope>,
        previous: Option<Arc<Scope>>,
    ) -> Result<()> {
        let failures = stop_all(scope.local().drain_reverse());

        {
            let mut contexts = self.contexts.lock();
            if let Some(state) = contexts.get_mut(&context) {
                if let Some(position) = state.stack.iter().rposition(|s| Arc::ptr_eq(s, scope)) {
                    state.stack.remove(position);
                }
                self.coordinator.exit_scope();

                let mapped_here = state
                    .named
                    .get(scope.name())
                    .is_some_and(|current| Arc::ptr_eq(current, scope));
                if mapped_here {
                    match previous {
                        Some(previous) => {
                            state.named.insert(scope.name().to_string(), previous);
                        }
                        None => {
                            state.named.remove(scope.name());
                        }
                    }
                }

                if state.stack.is_empty() {
                    contexts.remove(&context);
                }
            }
        }

        debug!(scope = scope.name(), id = scope.id(), "Closed scope");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DepotError::Shutdown(ShutdownError { failures }))
        }
    }

    // ── Lifecycle ──

    /// Shuts down every root singleton, newest first.
    ///
    /// The root registry is emptied before any hook runs. Each cached
    /// instance is stopped once, even when several keys share it, and a
    /// failing hook does not stop the sweep.
    ///
    /// # Errors
    /// - [`DepotError::Scope`] while any scope is open in any context.
    /// - [`DepotError::Shutdown`] listing every hook that failed.
    #[instrument(skip(self), name = "container_shutdown")]
    pub fn shutdown(&self) -> Result<()> {
        let drained = {
            let _control = self.control.lock();
            self.ensure_quiescent("shut down")?;
            self.root.drain_reverse()
        };

        info!(services = drained.len(), "Shutting down container");
        let failures = stop_all(drained);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DepotError::Shutdown(ShutdownError { failures }))
        }
    }

    /// Drops every registration and all per-context state without running
    /// shutdown hooks.
    ///
    /// # Errors
    /// [`DepotError::Scope`] while any scope is open in any context.
    pub fn reset(&self) -> Result<()> {
        let _control = self.control.lock();
        self.ensure_quiescent("reset")?;

        self.root.clear();
        self.contexts.lock().clear();
        self.coordinator.clear();
        debug!("Container reset");
        Ok(())
    }

    fn ensure_quiescent(&self, operation: &'static str) -> Result<()> {
        let active_scopes = self.coordinator.active_scopes();
        if active_scopes > 0 {
            warn!(operation, active_scopes, "Refusing to touch the root while scopes are open");
            return Err(DepotError::Scope(ScopeError { operation, active_scopes }));
        }
        Ok(())
    }

    /// Health of every probed singleton visible from the calling context.
    ///
    /// Entries from closer scopes override the root's for the same key.
    pub fn health_check(&self) -> HealthReport {
        match self.current_scope() {
            Some(scope) => HealthReport::collect(scope.lineage()),
            None => HealthReport::collect([self.root.as_ref()]),
        }
    }

    /// Health as seen from the scope named `name` in the calling context.
    ///
    /// # Errors
    /// [`DepotError::ScopeNotFound`] if no such scope is open here.
    pub fn health_check_scope(&self, name: &str) -> Result<HealthReport> {
        let scope = self
            .contexts
            .lock()
            .get(&ContextId::current())
            .and_then(|state| state.named.get(name).cloned())
            .ok_or_else(|| DepotError::ScopeNotFound { name: name.to_string() })?;

        Ok(HealthReport::collect(scope.lineage()))
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.root.len())
            .field("active_scopes", &self.coordinator.active_scopes())
            .field("config", &self.config)
            .finish()
    }
}

/// Stops resolved singletons in the given order, each instance once.
fn stop_all(bindings: Vec<Binding>) -> Vec<ShutdownFailure> {
    let mut stopped = HashSet::new();
    let mut failures = Vec::new();

    for (key, provider) in bindings {
        if !provider.is_resolved() || !provider.has_shutdown_hook() {
            trace!(key = %key, "Nothing to stop");
            continue;
        }

        let identity = provider
            .instance_identity()
            .unwrap_or(Arc::as_ptr(&provider) as *const () as usize);
        if !stopped.insert(identity) {
            trace!(key = %key, "Instance already stopped under another key");
            continue;
        }

        match provider.shutdown() {
            Ok(()) => debug!(key = %key, "Stopped service"),
            Err(source) => {
                warn!(key = %key, error = %source, "Shutdown hook failed");
                failures.push(ShutdownFailure { key, source });
            }
        }
    }

    failures
}

/// Combines a scope body's outcome with its teardown result.
fn settle<R, E: From<DepotError>>(
    scope: &str,
    outcome: std::result::Result<R, E>,
    teardown: Result<()>,
) -> std::result::Result<R, E> {
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(suppressed)) => {
            warn!(scope, error = %suppressed, "Scope body failed; teardown errors suppressed");
            Err(err)
        }
    }
}

// ═══════════════════════════════════════════
// ScopeHandle
// ═══════════════════════════════════════════

/// An open scope.
///
/// The registration methods defined here always register into this scope,
/// even while a nested scope is open. Everything else is reached through
/// `Deref` to the [`Container`] and targets the innermost scope open in the
/// calling context, as a direct container call would. Closing happens on
/// [`ScopeHandle::close`] or, failing that, on drop, where teardown errors
/// can only be logged.
pub struct ScopeHandle<'a> {
    container: &'a Container,
    scope: Arc<Scope>,
    context: ContextId,
    previous: Option<Arc<Scope>>,
    closed: bool,
}

impl ScopeHandle<'_> {
    pub fn name(&self) -> &str {
        self.scope.name()
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Registers `factory` under `key` in this scope.
    ///
    /// # Errors
    /// [`DepotError::AlreadyRegistered`] if this scope already has `key`.
    pub fn register<T: Clone + Send + Sync + 'static>(
        &self,
        key: ServiceKey,
        factory: impl Fn(&Container) -> Result<T> + Send + Sync + 'static,
        transient: bool,
    ) -> Result<()> {
        self.register_provider(key, Provider::new(factory, transient))
    }

    /// Registers a prepared provider in this scope.
    pub fn register_provider<T: Clone + Send + Sync + 'static>(
        &self,
        key: ServiceKey,
        provider: Provider<T>,
    ) -> Result<()> {
        trace!(key = %key, scope = self.scope.name(), "Registering in scope");
        self.scope.register(key, Arc::new(provider))
    }

    /// Scope-local singleton resolved as `Arc<S>`.
    pub fn singleton<S: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&Container) -> Result<S> + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(ServiceKey::of::<S>(), move |c| factory(c).map(Arc::new), false)
    }

    /// Scope-local transient resolved as `Arc<S>`.
    pub fn transient<S: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&Container) -> Result<S> + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(ServiceKey::of::<S>(), move |c| factory(c).map(Arc::new), true)
    }

    /// Scope-local value resolved as `Arc<S>`.
    pub fn instance<S: Send + Sync + 'static>(&self, value: S) -> Result<()> {
        self.register_provider(ServiceKey::of::<S>(), Provider::value(Arc::new(value)))
    }

    /// Shuts down scope-local singletons and leaves the scope.
    ///
    /// # Errors
    /// [`DepotError::Shutdown`] if any scope-local shutdown hook failed.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let previous = self.previous.take();
        self.container.close_scope(self.context, &self.scope, previous)
    }
}

impl Deref for ScopeHandle<'_> {
    type Target = Container;

    fn deref(&self) -> &Container {
        self.container
    }
}

impl Drop for ScopeHandle<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let previous = self.previous.take();
        if let Err(err) = self.container.close_scope(self.context, &self.scope, previous) {
            warn!(scope = self.scope.name(), error = %err, "Scope dropped with teardown errors");
        }
    }
}

impl fmt::Debug for ScopeHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("scope", &self.scope)
            .field("context", &self.context)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder, ContainerConfig, ScopeHandle};
    pub use crate::error::{BoxError, DepotError, Result};
    pub use crate::health::HealthReport;
    pub use crate::key::ServiceKey;
    pub use crate::provider::{HealthProbe, Provider, Stoppable};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::provider::Stoppable;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Database;

    struct Repository {
        db: Arc<Database>,
    }

    trait Printable: Send + Sync {
        fn label(&self) -> &'static str;
    }

    struct Square;
    struct Circle;

    impl Printable for Square {
        fn label(&self) -> &'static str {
            "square"
        }
    }

    impl Printable for Circle {
        fn label(&self) -> &'static str {
            "circle"
        }
    }

    /// Appends its label to a shared log when stopped.
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Stoppable for Recorder {
        fn stop(&self) -> std::result::Result<(), BoxError> {
            self.log.lock().push(self.label);
            if self.fail {
                Err(format!("{} refused to stop", self.label).into())
            } else {
                Ok(())
            }
        }
    }

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
        fail: bool,
    ) -> Provider<Arc<Recorder>> {
        let log = log.clone();
        Provider::singleton(move |_| Ok(Arc::new(Recorder { label, log: log.clone(), fail })))
            .stoppable()
    }

    #[test]
    fn singleton_factory_called_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = Container::new();
        container
            .singleton({
                let counter = counter.clone();
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Database)
                }
            })
            .unwrap();

        let a = container.get::<Database>().unwrap();
        let b = container.get::<Database>().unwrap();
        let c = container.get::<Database>().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
    }

    #[test]
    fn resolve_transient_creates_new_each_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = Container::new();
        container
            .register(
                ServiceKey::of::<u32>(),
                {
                    let counter = counter.clone();
                    move |_| Ok(counter.fetch_add(1, Ordering::SeqCst))
                },
                true,
            )
            .unwrap();

        let key = ServiceKey::of::<u32>();
        let values: Vec<u32> = (0..3).map(|_| container.resolve(&key).unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2]);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn autowired_dependency_is_shared() {
        let container = Container::builder()
            .singleton_with(|_| Ok(Database))
            .singleton_with(|c| Ok(Repository { db: c.get()? }))
            .build()
            .unwrap();

        let repo = container.get::<Repository>().unwrap();
        let db = container.get::<Database>().unwrap();
        assert!(Arc::ptr_eq(&repo.db, &db));
    }

    #[test]
    fn duplicate_registration_fails() {
        let container = Container::new();
        container.instance(Database).unwrap();
        match container.instance(Database) {
            Err(DepotError::AlreadyRegistered(err)) => {
                assert!(err.type_name().ends_with("Database"));
                assert_eq!(err.name(), None);
            }
            other => panic!("Expected AlreadyRegistered, got: {other:?}"),
        }
    }

    #[test]
    fn builder_rejects_duplicates() {
        let result = Container::builder()
            .singleton_value(1u8)
            .singleton_value(2u8)
            .build();
        assert!(matches!(result, Err(DepotError::AlreadyRegistered(_))));
    }

    #[test]
    fn resolve_not_registered() {
        let container = Container::new();
        container.instance(Database).unwrap();

        match container.resolve::<Arc<Database>>(&ServiceKey::named::<Database>("replica")) {
            Err(DepotError::NotFound(err)) => {
                assert_eq!(err.name(), Some("replica"));
                assert_eq!(err.suggestions, vec![ServiceKey::of::<Database>()]);
            }
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_optional_absent() {
        let container = Container::new();
        let value: Option<Arc<Database>> =
            container.resolve_optional(&ServiceKey::of::<Database>()).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn type_mismatch_fails_fast() {
        let container = Container::new();
        container.instance(Database).unwrap();
        let result = container.resolve::<Arc<String>>(&ServiceKey::of::<Database>());
        assert!(matches!(result, Err(DepotError::TypeMismatch { .. })));
    }

    #[test]
    fn factory_errors_propagate_unchanged() {
        let container = Container::new();
        container
            .singleton::<Database>(|_| Err(DepotError::construction("connection refused")))
            .unwrap();

        match container.get::<Database>() {
            Err(DepotError::ConstructionFailed { source }) => {
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("Expected ConstructionFailed, got: {other:?}"),
        }
    }

    #[test]
    fn direct_cycle_detected() {
        #[derive(Debug)]
        struct A;
        #[derive(Debug)]
        struct B;

        let container = Container::new();
        container.singleton(|c| c.get::<B>().map(|_| A)).unwrap();
        container.singleton(|c| c.get::<A>().map(|_| B)).unwrap();

        match container.get::<A>() {
            Err(DepotError::CircularDependency(err)) => {
                assert_eq!(err.chain.len(), 3);
                assert_eq!(err.chain.first(), Some(&ServiceKey::of::<A>()));
                assert_eq!(err.chain.last(), Some(&ServiceKey::of::<A>()));
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }

        assert!(container.coordinator().current_chain().is_empty());
    }

    #[test]
    fn transitive_transient_cycle_detected() {
        #[derive(Debug)]
        struct A;
        #[derive(Debug)]
        struct B;
        #[derive(Debug)]
        struct C;

        let container = Container::new();
        container.transient(|c| c.get::<B>().map(|_| A)).unwrap();
        container.transient(|c| c.get::<C>().map(|_| B)).unwrap();
        container.transient(|c| c.get::<A>().map(|_| C)).unwrap();

        match container.get::<B>() {
            Err(DepotError::CircularDependency(err)) => {
                let expected: Vec<ServiceKey> = vec![
                    ServiceKey::of::<B>(),
                    ServiceKey::of::<C>(),
                    ServiceKey::of::<A>(),
                    ServiceKey::of::<B>(),
                ];
                assert_eq!(err.chain, expected);
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn ambiguous_interface_and_resolve_all() {
        let container = Container::new();
        container
            .bind::<dyn Printable, Square>(|_| Ok(Arc::new(Square) as Arc<dyn Printable>), false)
            .unwrap();
        container
            .bind::<dyn Printable, Circle>(|_| Ok(Arc::new(Circle) as Arc<dyn Printable>), false)
            .unwrap();

        match container.get::<dyn Printable>() {
            Err(DepotError::AmbiguousService(err)) => {
                assert_eq!(err.implementations.len(), 2);
                assert!(err.implementations.iter().any(|i| i.ends_with("Square")));
                assert!(err.implementations.iter().any(|i| i.ends_with("Circle")));
            }
            other => panic!("Expected AmbiguousService, got: {:?}", other.map(|p| p.label())),
        }

        let all = container.get_all::<dyn Printable>().unwrap();
        assert_eq!(all.len(), 2);

        let optional = container.resolve_optional::<Arc<dyn Printable>>(&ServiceKey::of::<dyn Printable>());
        assert!(matches!(optional, Err(DepotError::AmbiguousService(_))));
    }

    #[test]
    fn named_binding_disambiguates() {
        let container = Container::new();
        container
            .bind_named::<dyn Printable, Square>("boxy", |_| Ok(Arc::new(Square) as Arc<dyn Printable>), false)
            .unwrap();
        container
            .bind_named::<dyn Printable, Circle>("round", |_| Ok(Arc::new(Circle) as Arc<dyn Printable>), false)
            .unwrap();

        assert_eq!(container.get_named::<dyn Printable>("round").unwrap().label(), "circle");
        assert!(matches!(container.get_named::<dyn Printable>("oval"), Err(e) if e.is_not_found()));
    }

    #[test]
    fn scoped_service_disappears_after_close() {
        #[derive(Debug)]
        struct CurrentUser;

        let container = Container::new();
        container
            .with_scope(":request", |scope| {
                scope.instance(CurrentUser)?;
                scope.get::<CurrentUser>().map(|_| ())
            })
            .unwrap();

        assert!(container.get::<CurrentUser>().unwrap_err().is_not_found());
        assert_eq!(container.scope_depth(), 0);
        assert_eq!(container.active_scopes(), 0);
    }

    #[test]
    fn child_scope_shadows_parent() {
        let container = Container::new();
        container.instance(String::from("root")).unwrap();

        container
            .with_scope("outer", |_| {
                container.instance(String::from("outer"))?;
                assert_eq!(*container.get::<String>()?, "outer");

                container.with_scope("inner", |_| {
                    assert_eq!(container.scope_depth(), 2);
                    container.instance(String::from("inner"))?;
                    assert_eq!(*container.get::<String>()?, "inner");
                    Ok::<_, DepotError>(())
                })?;

                assert_eq!(*container.get::<String>()?, "outer");
                Ok::<_, DepotError>(())
            })
            .unwrap();

        assert_eq!(*container.get::<String>().unwrap(), "root");
    }

    #[test]
    fn outer_handle_registers_into_its_own_scope() {
        let container = Container::new();
        let outer = container.open_scope("outer");
        let inner = container.open_scope("inner");

        outer.instance(String::from("outer")).unwrap();
        inner.instance(7u8).unwrap();
        assert_eq!(*inner.get::<String>().unwrap(), "outer");
        assert!(outer.scope().local().contains(&ServiceKey::of::<String>()));
        assert!(!inner.scope().local().contains(&ServiceKey::of::<String>()));

        inner.close().unwrap();
        assert_eq!(*outer.get::<String>().unwrap(), "outer");
        assert!(matches!(outer.get::<u8>(), Err(e) if e.is_not_found()));
        outer.close().unwrap();
    }

    #[test]
    fn root_registrations_after_open_are_visible() {
        let container = Container::new();
        let scope = container.open_scope("live");

        std::thread::scope(|s| {
            s.spawn(|| container.instance(Database).unwrap()).join().unwrap();
        });

        assert!(scope.get::<Database>().is_ok());
        scope.close().unwrap();
    }

    #[test]
    fn shutdown_runs_in_reverse_order_and_collects_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container.register_provider(ServiceKey::from("first"), recorder(&log, "first", false)).unwrap();
        container.register_provider(ServiceKey::from("second"), recorder(&log, "second", true)).unwrap();
        container.register_provider(ServiceKey::from("never"), recorder(&log, "never", false)).unwrap();
        container.register_provider(ServiceKey::from("third"), recorder(&log, "third", true)).unwrap();
        container
            .register_provider(
                ServiceKey::from("transient"),
                Provider::transient({
                    let log = log.clone();
                    move |_| Ok(Arc::new(Recorder { label: "transient", log: log.clone(), fail: false }))
                })
                .stoppable(),
            )
            .unwrap();

        for key in ["first", "second", "third", "transient"] {
            container.resolve::<Arc<Recorder>>(&ServiceKey::from(key)).unwrap();
        }

        match container.shutdown() {
            Err(DepotError::Shutdown(err)) => {
                let failed: Vec<&str> = err.keys().map(ServiceKey::as_str).collect();
                assert_eq!(failed, vec!["third", "second"]);
            }
            other => panic!("Expected Shutdown, got: {other:?}"),
        }

        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
        assert!(container.root.is_empty());
    }

    #[test]
    fn shared_instance_stops_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(Recorder { label: "shared", log: log.clone(), fail: false });

        let container = Container::new();
        for key in ["a", "b"] {
            let shared = shared.clone();
            container
                .register_provider(ServiceKey::from(key), Provider::singleton(move |_| Ok(shared.clone())).stoppable())
                .unwrap();
            container.resolve::<Arc<Recorder>>(&ServiceKey::from(key)).unwrap();
        }

        container.shutdown().unwrap();
        assert_eq!(*log.lock(), vec!["shared"]);
    }

    #[test]
    fn probe_only_alias_does_not_swallow_stop() {
        impl crate::provider::HealthProbe for Recorder {
            fn probe(&self) -> std::result::Result<bool, BoxError> {
                Ok(true)
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let conn = Arc::new(Recorder { label: "conn", log: log.clone(), fail: false });

        let container = Container::new();
        let stopped = ServiceKey::from("conn");
        let probed = ServiceKey::from("conn:health");
        container
            .register_provider(stopped.clone(), Provider::value(conn.clone()).stoppable())
            .unwrap();
        // Registered last, so shutdown visits it first.
        container
            .register_provider(probed.clone(), Provider::value(conn.clone()).probed())
            .unwrap();

        container.shutdown().unwrap();
        assert_eq!(*log.lock(), vec!["conn"]);
    }

    #[test]
    fn custom_hook_on_shared_instance_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(Recorder { label: "custom", log: log.clone(), fail: false });

        let container = Container::new();
        for key in ["primary", "replica"] {
            container
                .register_provider(
                    ServiceKey::from(key),
                    Provider::value(shared.clone()).on_shutdown(|recorder| recorder.stop()),
                )
                .unwrap();
        }

        container.shutdown().unwrap();
        assert_eq!(*log.lock(), vec!["custom"]);
    }

    #[test]
    fn shutdown_and_reset_refused_while_scoped() {
        let container = Container::new();
        container.instance(Database).unwrap();
        let scope = container.open_scope("busy");

        match container.shutdown() {
            Err(DepotError::Scope(err)) => assert_eq!(err.active_scopes, 1),
            other => panic!("Expected Scope, got: {other:?}"),
        }
        assert!(matches!(container.reset(), Err(DepotError::Scope(_))));
        assert_eq!(container.root.len(), 1);
        assert!(scope.get::<Database>().is_ok());
        assert_eq!(container.coordinator().active_scopes(), 1);

        scope.close().unwrap();
        assert_eq!(container.active_scopes(), 0);
        assert!(container.shutdown().is_ok());
        assert!(container.root.is_empty());
    }

    #[test]
    fn reset_clears_without_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container.register_provider(ServiceKey::from("svc"), recorder(&log, "svc", false)).unwrap();
        container.resolve::<Arc<Recorder>>(&ServiceKey::from("svc")).unwrap();

        container.reset().unwrap();
        assert!(log.lock().is_empty());
        assert!(!container.contains(&ServiceKey::from("svc")));
        container.register_provider(ServiceKey::from("svc"), recorder(&log, "svc", false)).unwrap();
    }

    #[test]
    fn scope_teardown_stops_local_singletons() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container.register_provider(ServiceKey::from("root"), recorder(&log, "root", false)).unwrap();
        container.resolve::<Arc<Recorder>>(&ServiceKey::from("root")).unwrap();

        let result = container.with_scope("job", |scope| {
            scope.register_provider(ServiceKey::from("a"), recorder(&log, "a", false))?;
            scope.register_provider(ServiceKey::from("b"), recorder(&log, "b", true))?;
            scope.resolve::<Arc<Recorder>>(&ServiceKey::from("a"))?;
            scope.resolve::<Arc<Recorder>>(&ServiceKey::from("b"))?;
            scope.resolve::<Arc<Recorder>>(&ServiceKey::from("root"))?;
            Ok::<_, DepotError>(())
        });

        assert!(matches!(result, Err(DepotError::Shutdown(ref err)) if err.failures.len() == 1));
        assert_eq!(*log.lock(), vec!["b", "a"]);
        assert_eq!(container.active_scopes(), 0);
    }

    #[test]
    fn body_error_wins_over_teardown_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();

        let result = container.with_scope("job", |scope| -> Result<()> {
            scope.register_provider(ServiceKey::from("bad"), recorder(&log, "bad", true))?;
            scope.resolve::<Arc<Recorder>>(&ServiceKey::from("bad"))?;
            Err(DepotError::construction("body failed"))
        });

        assert!(matches!(result, Err(DepotError::ConstructionFailed { .. })));
        assert_eq!(*log.lock(), vec!["bad"]);
    }

    #[test]
    fn dropped_handle_still_tears_down() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        {
            let scope = container.open_scope("early-return");
            scope.register_provider(ServiceKey::from("tmp"), recorder(&log, "tmp", false)).unwrap();
            scope.resolve::<Arc<Recorder>>(&ServiceKey::from("tmp")).unwrap();
        }
        assert_eq!(*log.lock(), vec!["tmp"]);
        assert_eq!(container.scope_depth(), 0);
    }

    #[test]
    fn health_check_merges_scopes() {
        struct Probe(bool);
        impl crate::provider::HealthProbe for Probe {
            fn probe(&self) -> std::result::Result<bool, BoxError> {
                Ok(self.0)
            }
        }

        let container = Container::new();
        let cache = ServiceKey::from("cache");
        let db = ServiceKey::from("db");
        container.register_provider(cache.clone(), Provider::value(Arc::new(Probe(false))).probed()).unwrap();
        container.register_provider(db.clone(), Provider::value(Arc::new(Probe(true))).probed()).unwrap();
        container
            .register_provider(ServiceKey::from("lazy"), Provider::singleton(|_| Ok(Arc::new(Probe(false)))).probed())
            .unwrap();

        let root_report = container.health_check();
        assert_eq!(root_report.get(&cache), Some(false));
        assert_eq!(root_report.len(), 2);

        container
            .with_scope("req", |scope| {
                scope.register_provider(cache.clone(), Provider::value(Arc::new(Probe(true))).probed())?;
                let report = scope.health_check();
                assert_eq!(report.get(&cache), Some(true));
                assert_eq!(report.get(&db), Some(true));
                assert_eq!(scope.health_check_scope("req")?, report);
                Ok::<_, DepotError>(())
            })
            .unwrap();

        assert!(matches!(
            container.health_check_scope("req"),
            Err(DepotError::ScopeNotFound { .. })
        ));
    }

    #[test]
    fn named_scope_restored_after_nested_reuse() {
        let container = Container::new();
        let outer = container.open_scope("job");
        let outer_id = outer.scope().id();
        {
            let inner = container.open_scope("job");
            assert_ne!(inner.scope().id(), outer_id);
            inner.close().unwrap();
        }
        assert!(container.health_check_scope("job").is_ok());
        outer.close().unwrap();
        assert!(container.health_check_scope("job").is_err());
    }

    #[test]
    fn debug_display() {
        let container = Container::builder()
            .singleton_value(1i32)
            .singleton_value(String::from("x"))
            .build()
            .unwrap();

        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("registered: 2"));
    }
}
