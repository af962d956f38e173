//! Error types for Depot container operations.
//!
//! Every rich variant carries its own struct with a `Display` that ends in a
//! hint, so a failed resolve tells you what to do next.

use std::fmt;

use depot_support::rendering::{render_chain, render_list, shorten_type_name};

use crate::key::ServiceKey;

/// Boxed error returned by factories and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for all Depot operations.
#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    /// Requested service is not registered anywhere in the visible chain.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Key is already registered in the same store.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// Resolution re-entered a key that is still being constructed.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// Several implementations match an interface lookup.
    #[error("{}", .0)]
    AmbiguousService(AmbiguousServiceError),

    /// No scope with this name is open in the current execution context.
    #[error("Scope not found: {name:?}\n  Hint: named scopes are only visible in the context that opened them")]
    ScopeNotFound { name: String },

    /// Root shutdown or reset attempted while scopes are open.
    #[error("{}", .0)]
    Scope(ScopeError),

    /// One or more shutdown hooks failed.
    #[error("{}", .0)]
    Shutdown(ShutdownError),

    /// The stored provider produces a different type than requested.
    #[error("Type mismatch for {key}: requested {expected}\n  Hint: resolve with the same type the service was registered with")]
    TypeMismatch {
        key: ServiceKey,
        expected: &'static str,
    },

    /// Resolution chain grew beyond the configured limit.
    #[error("Resolution depth {depth} exceeded while resolving {key}")]
    DepthExceeded { key: ServiceKey, depth: usize },

    /// Factory returned an error during construction.
    #[error("Failed to construct service: {source}")]
    ConstructionFailed {
        #[source]
        source: BoxError,
    },
}

impl DepotError {
    /// Wraps an application error raised inside a factory.
    ///
    /// ```
    /// use depot_container::error::DepotError;
    ///
    /// let err = DepotError::construction(std::io::Error::other("refused"));
    /// assert!(err.to_string().contains("refused"));
    /// ```
    pub fn construction(source: impl Into<BoxError>) -> Self {
        DepotError::ConstructionFailed { source: source.into() }
    }

    /// Returns `true` for [`DepotError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DepotError::NotFound(_))
    }
}

/// Error when a service was never registered.
#[derive(Debug)]
pub struct NotFoundError {
    /// The key that was requested.
    pub key: ServiceKey,
    /// Similar keys that ARE registered.
    pub suggestions: Vec<ServiceKey>,
}

impl NotFoundError {
    /// Service type of the missing key.
    pub fn type_name(&self) -> &str {
        self.key.type_name()
    }

    /// Alias of the missing key.
    pub fn name(&self) -> Option<&str> {
        self.key.name()
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not found: {}", self.key)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register {} before resolving it, or open the scope that provides it",
            shorten_type_name(self.key.type_name())
        )
    }
}

/// Error when a key is registered twice in the same store.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub key: ServiceKey,
}

impl AlreadyRegisteredError {
    pub fn type_name(&self) -> &str {
        self.key.type_name()
    }

    pub fn name(&self) -> Option<&str> {
        self.key.name()
    }
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service already registered: {}", self.key)?;
        write!(
            f,
            "\n  Hint: open a scope to shadow the registration, or register it under a name"
        )
    }
}

/// Error when a circular dependency is detected.
///
/// The chain starts and ends with the key that was re-entered.
#[derive(Debug)]
pub struct CircularDependencyError {
    pub chain: Vec<ServiceKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<String> = self.chain.iter().map(ServiceKey::short).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&chain))?;
        write!(
            f,
            "\n  Hint: break the cycle by resolving one side lazily inside a method instead of the factory"
        )
    }
}

/// Error when an interface lookup matches more than one implementation.
#[derive(Debug)]
pub struct AmbiguousServiceError {
    /// The interface that was requested.
    pub interface: String,
    /// The alias used for the lookup, if any.
    pub name: Option<String>,
    /// Every matching implementation label.
    pub implementations: Vec<String>,
}

impl fmt::Display for AmbiguousServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let implementations: Vec<String> = self
            .implementations
            .iter()
            .map(|i| shorten_type_name(i))
            .collect();

        write!(
            f,
            "Ambiguous service {}: {} implementations match ({})",
            shorten_type_name(&self.interface),
            implementations.len(),
            render_list(&implementations),
        )?;
        if let Some(ref name) = self.name {
            write!(f, " for name {name:?}")?;
        }
        write!(
            f,
            "\n  Hint: resolve a named binding or request all implementations"
        )
    }
}

/// Error when the root is shut down or reset while scopes are open.
#[derive(Debug)]
pub struct ScopeError {
    pub operation: &'static str,
    pub active_scopes: usize,
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot {} the container: {} scope(s) still open",
            self.operation, self.active_scopes,
        )?;
        write!(f, "\n  Hint: close every scope first, in every thread or task")
    }
}

/// A single failed shutdown hook.
#[derive(Debug)]
pub struct ShutdownFailure {
    pub key: ServiceKey,
    pub source: BoxError,
}

/// Aggregate of every shutdown hook that failed during one sweep.
#[derive(Debug)]
pub struct ShutdownError {
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownError {
    /// Keys whose shutdown failed, in the order they were attempted.
    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.failures.iter().map(|failure| &failure.key)
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} service(s) failed to shut down:", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {}: {}", failure.key.short(), failure.source)?;
        }
        Ok(())
    }
}

/// Convenient Result type for Depot operations.
pub type Result<T> = std::result::Result<T, DepotError>;
