//! Resolution coordination: cycle detection and scope accounting.
//!
//! Cycles are detected at resolve time. Every execution context keeps its own
//! chain of keys that are currently being constructed; re-entering a key that
//! is already on the chain is a cycle. Chains are created on first use and
//! dropped as soon as they are empty, so a long-lived worker thread that only
//! resolves now and then holds no state between calls.
//!
//! Two contexts never see each other's chains, which keeps unrelated
//! concurrent resolutions of the same graph from tripping over each other.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::context::ContextId;
use crate::error::{CircularDependencyError, DepotError, Result};
use crate::key::ServiceKey;

/// Default limit on nested resolutions in one context.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Tracks in-flight resolutions per context and the number of open scopes.
#[derive(Debug)]
pub struct ResolutionCoordinator {
    chains: DashMap<ContextId, Vec<ServiceKey>>,
    active_scopes: AtomicUsize,
    max_depth: usize,
}

impl ResolutionCoordinator {
    /// Creates a coordinator allowing at most `max_depth` nested resolutions.
    pub fn new(max_depth: usize) -> Self {
        Self {
            chains: DashMap::new(),
            active_scopes: AtomicUsize::new(0),
            max_depth: max_depth.max(1),
        }
    }

    /// Runs `body` with `key` pushed onto the caller's resolution chain.
    ///
    /// # Errors
    /// - [`DepotError::CircularDependency`] if `key` is already on the chain.
    ///   The reported chain runs from the first occurrence of `key` to the
    ///   re-entry, so it starts and ends with `key`.
    /// - [`DepotError::DepthExceeded`] if the chain is already at the limit.
    /// - Whatever `body` returns.
    pub fn with_cycle_guard<T>(
        &self,
        key: &ServiceKey,
        body: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let context = ContextId::current();

        {
            let mut chain = self.chains.entry(context).or_default();

            if let Some(start) = chain.iter().position(|k| k == key) {
                let mut cycle = chain[start..].to_vec();
                cycle.push(key.clone());

                warn!(key = %key, cycle = ?cycle, "Circular dependency detected");
                return Err(DepotError::CircularDependency(CircularDependencyError {
                    chain: cycle,
                }));
            }

            if chain.len() >= self.max_depth {
                return Err(DepotError::DepthExceeded {
                    key: key.clone(),
                    depth: chain.len(),
                });
            }

            chain.push(key.clone());
            trace!(key = %key, depth = chain.len(), "Entered resolution");
        }

        let _guard = ChainGuard { chains: &self.chains, context };
        body()
    }

    /// Keys currently being resolved in the caller's context, outermost first.
    pub fn current_chain(&self) -> Vec<ServiceKey> {
        self.chains
            .get(&ContextId::current())
            .map(|chain| chain.value().clone())
            .unwrap_or_default()
    }

    /// Number of contexts holding a non-empty chain.
    pub fn tracked_contexts(&self) -> usize {
        self.chains.len()
    }

    /// Records a newly opened scope. Returns the new count.
    pub(crate) fn enter_scope(&self) -> usize {
        self.active_scopes.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records a closed scope. Returns the new count, never below zero.
    pub(crate) fn exit_scope(&self) -> usize {
        match self
            .active_scopes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!("Scope closed with no scope recorded as open");
                0
            }
        }
    }

    /// Number of scopes open across all contexts.
    pub fn active_scopes(&self) -> usize {
        self.active_scopes.load(Ordering::SeqCst)
    }

    /// Drops every chain.
    pub(crate) fn clear(&self) {
        self.chains.clear();
    }
}

impl Default for ResolutionCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// Pops the caller's chain on every exit path, unwinding included.
struct ChainGuard<'a> {
    chains: &'a DashMap<ContextId, Vec<ServiceKey>>,
    context: ContextId,
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut chain) = self.chains.get_mut(&self.context) {
            chain.pop();
        }
        self.chains.remove_if(&self.context, |_, chain| chain.is_empty());
    }
}
