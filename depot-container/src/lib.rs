//! Core container implementation for Depot.
//!
//! Keys, providers, the root registry and child scopes, per-context cycle
//! detection and the [`Container`] facade tying them together.

pub mod container;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod key;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod scope;

pub use container::{Container, ContainerBuilder, ContainerConfig, ScopeHandle, prelude};
pub use error::{DepotError, Result};
pub use health::HealthReport;
pub use key::ServiceKey;
pub use provider::{HealthProbe, Provider, Stoppable};
pub use scope::Scope;
