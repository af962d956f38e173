//! # Depot: runtime service container for Rust
//!
//! Register factories under structured keys, resolve them with singleton
//! caching, nest scopes per thread or task, and shut everything down in
//! reverse registration order.
//!
//! ```rust
//! use depot::prelude::*;
//!
//! struct Config {
//!     url: &'static str,
//! }
//!
//! let container = Container::new();
//! container.instance(Config { url: "postgres://localhost" }).unwrap();
//! assert_eq!(container.get::<Config>().unwrap().url, "postgres://localhost");
//! container.shutdown().unwrap();
//! ```

use once_cell::sync::Lazy;

pub use depot_container::*;
pub use depot_support::*;

/// The process-wide container.
///
/// Created empty on first access and never dropped; call
/// [`Container::shutdown`] before the process exits if registered services
/// need to be stopped.
pub fn global() -> &'static Container {
    static GLOBAL: Lazy<Container> = Lazy::new(Container::new);
    &GLOBAL
}
