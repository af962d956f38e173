//! Health reports.
//!
//! A report maps keys to the result of their health probe. Only singletons
//! that have been resolved and carry a probe contribute; everything else is
//! simply absent rather than reported as unhealthy.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::key::ServiceKey;
use crate::registry::Registry;

/// Health status per service key.
///
/// Serializes as a flat `{"key": bool}` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthReport {
    entries: BTreeMap<ServiceKey, bool>,
}

impl HealthReport {
    /// Probes `registries` broadest first; entries from later registries
    /// override earlier ones for the same key.
    ///
    /// Providers are snapshotted before probing so a probe may itself
    /// resolve services.
    pub(crate) fn collect<'a>(registries: impl IntoIterator<Item = &'a Registry>) -> Self {
        let mut entries = BTreeMap::new();
        for registry in registries {
            for (key, provider) in registry.snapshot() {
                if let Some(healthy) = provider.health_check() {
                    trace!(key = %key, healthy, "Probed service");
                    entries.insert(key, healthy);
                }
            }
        }
        Self { entries }
    }

    /// Status of `key`, if it was probed.
    pub fn get(&self, key: &ServiceKey) -> Option<bool> {
        self.entries.get(key).copied()
    }

    /// Returns `true` if every probed service reported healthy.
    pub fn is_healthy(&self) -> bool {
        self.entries.values().all(|healthy| *healthy)
    }

    /// Keys whose probe failed or returned `false`.
    pub fn unhealthy(&self) -> impl Iterator<Item = &ServiceKey> {
        self.entries
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(key, _)| key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceKey, bool)> {
        self.entries.iter().map(|(key, healthy)| (key, *healthy))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
