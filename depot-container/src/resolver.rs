//! Interface and ambiguity resolution.
//!
//! A lookup first tries the exact key. When that fails, a plain key `T` falls
//! back to the interface bindings of `T` (`~T:*`), and a named key `T:name`
//! falls back to the bindings of `T` registered under `name`. Exactly one
//! match resolves; several are ambiguous.

use tracing::{trace, warn};

use crate::error::{AmbiguousServiceError, DepotError, Result};
use crate::key::ServiceKey;
use crate::registry::{Binding, ServiceStore};

/// Finds the registration `key` refers to, as seen from `store`.
///
/// Returns the key the provider is actually registered under, which differs
/// from `key` when an interface binding was selected.
///
/// # Errors
/// [`DepotError::AmbiguousService`] when several bindings match.
pub fn locate(store: &dyn ServiceStore, key: &ServiceKey) -> Result<Option<Binding>> {
    if let Some(provider) = store.get_opt(key) {
        return Ok(Some((key.clone(), provider)));
    }

    // Binding keys are exact; they never fan out.
    if key.is_binding() {
        return Ok(None);
    }

    let parts = key.parts();
    let matches = match parts.name {
        None => store.bindings(parts.type_name),
        Some(alias) => store.named_bindings(parts.type_name, alias),
    };

    let selected = select_single(parts.type_name, parts.name, matches)?;
    if let Some((ref bound, _)) = selected {
        trace!(requested = %key, binding = %bound, "Resolved through interface binding");
    }
    Ok(selected)
}

/// Picks the only match, if there is exactly one.
///
/// # Errors
/// [`DepotError::AmbiguousService`] naming every implementation when more
/// than one binding matches.
pub fn select_single(
    interface: &str,
    name: Option<&str>,
    matches: Vec<Binding>,
) -> Result<Option<Binding>> {
    if matches.len() <= 1 {
        return Ok(matches.into_iter().next());
    }

    let implementations: Vec<String> = matches
        .iter()
        .map(|(key, _)| key.implementation().unwrap_or(key.as_str()).to_string())
        .collect();

    warn!(
        interface,
        name,
        implementations = ?implementations,
        "Ambiguous service lookup"
    );

    Err(DepotError::AmbiguousService(AmbiguousServiceError {
        interface: interface.to_string(),
        name: name.map(str::to_string),
        implementations,
    }))
}
