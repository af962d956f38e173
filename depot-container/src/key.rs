//! Service identification keys.
//!
//! A [`ServiceKey`] is a flat string with four shapes:
//!
//! | shape                    | example                                 |
//! |--------------------------|-----------------------------------------|
//! | plain                    | `app::Database`                         |
//! | named                    | `app::Database:replica`                 |
//! | interface binding        | `~dyn app::Printable:app::Square`       |
//! | named interface binding  | `~dyn app::Printable:app::Square:big`   |
//!
//! Type names come from [`std::any::type_name`] and therefore contain `::`
//! path separators. Only a single `:` that is not part of a `::` pair
//! separates segments.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use depot_support::rendering::shorten_type_name;

/// Separates the type, implementation and name segments.
pub const SEGMENT_SEPARATOR: char = ':';

/// Prefix that marks an interface-binding key.
pub const BINDING_MARKER: char = '~';

/// Uniquely identifies a registration in the container.
///
/// Cloning is cheap: the flat representation is shared.
///
/// # Examples
/// ```
/// use depot_container::key::ServiceKey;
///
/// let key = ServiceKey::build("app::Database", None, Some("replica"));
/// assert_eq!(key.as_str(), "app::Database:replica");
/// assert_eq!(key.type_name(), "app::Database");
/// assert_eq!(key.name(), Some("replica"));
///
/// let binding = ServiceKey::build("app::Printable", Some("app::Square"), None);
/// assert_eq!(binding.as_str(), "~app::Printable:app::Square");
/// assert!(binding.is_binding_of("app::Printable"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    repr: Arc<str>,
}

/// Decomposed view of a [`ServiceKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParts<'a> {
    /// The service type, or the interface for bindings.
    pub type_name: &'a str,
    /// The implementation label of an interface binding.
    pub implementation: Option<&'a str>,
    /// The optional alias.
    pub name: Option<&'a str>,
}

impl ServiceKey {
    /// Key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::build(type_name::<T>(), None, None)
    }

    /// Named key for type `T`.
    ///
    /// ```
    /// use depot_container::key::ServiceKey;
    ///
    /// let primary = ServiceKey::named::<String>("primary_db");
    /// let replica = ServiceKey::named::<String>("replica_db");
    /// assert_ne!(primary, replica);
    /// ```
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &str) -> Self {
        Self::build(type_name::<T>(), None, Some(name))
    }

    /// Key binding implementation `Impl` to interface `I`.
    #[inline]
    pub fn binding<I: ?Sized + 'static, Impl: ?Sized + 'static>() -> Self {
        Self::build(type_name::<I>(), Some(type_name::<Impl>()), None)
    }

    /// Named key binding implementation `Impl` to interface `I`.
    #[inline]
    pub fn named_binding<I: ?Sized + 'static, Impl: ?Sized + 'static>(name: &str) -> Self {
        Self::build(type_name::<I>(), Some(type_name::<Impl>()), Some(name))
    }

    /// Builds a key from its segments.
    pub fn build(type_name: &str, implementation: Option<&str>, name: Option<&str>) -> Self {
        let mut repr = String::with_capacity(
            type_name.len()
                + implementation.map_or(0, |i| i.len() + 2)
                + name.map_or(0, |n| n.len() + 1),
        );

        if let Some(implementation) = implementation {
            repr.push(BINDING_MARKER);
            repr.push_str(type_name);
            repr.push(SEGMENT_SEPARATOR);
            repr.push_str(implementation);
        } else {
            repr.push_str(type_name);
        }

        if let Some(name) = name {
            repr.push(SEGMENT_SEPARATOR);
            repr.push_str(name);
        }

        Self { repr: repr.into() }
    }

    /// The flat representation.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Splits the key into its segments.
    pub fn parts(&self) -> KeyParts<'_> {
        match self.repr.strip_prefix(BINDING_MARKER) {
            Some(rest) => {
                let (type_name, remainder) = parse(rest);
                let (implementation, name) = match remainder {
                    Some(remainder) => {
                        let (implementation, name) = parse(remainder);
                        (Some(implementation), name)
                    }
                    None => (None, None),
                };
                KeyParts { type_name, implementation, name }
            }
            None => {
                let (type_name, name) = parse(&self.repr);
                KeyParts { type_name, implementation: None, name }
            }
        }
    }

    /// The service type, or the interface for bindings.
    #[inline]
    pub fn type_name(&self) -> &str {
        self.parts().type_name
    }

    /// The implementation label, for interface bindings only.
    #[inline]
    pub fn implementation(&self) -> Option<&str> {
        self.parts().implementation
    }

    /// The alias, if any.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.parts().name
    }

    /// Returns `true` for interface-binding keys.
    #[inline]
    pub fn is_binding(&self) -> bool {
        self.repr.starts_with(BINDING_MARKER)
    }

    /// Returns `true` if this is a binding of exactly `interface`.
    ///
    /// A plain key never matches, and neither does a binding of a type whose
    /// path merely starts with `interface`.
    pub fn is_binding_of(&self, interface: &str) -> bool {
        self.is_binding() && self.parts().type_name == interface
    }

    /// Human-friendly form with module paths stripped from every segment.
    pub fn short(&self) -> String {
        let parts = self.parts();
        let mut out = String::new();
        if self.is_binding() {
            out.push(BINDING_MARKER);
        }
        out.push_str(&shorten_type_name(parts.type_name));
        if let Some(implementation) = parts.implementation {
            out.push(SEGMENT_SEPARATOR);
            out.push_str(&shorten_type_name(implementation));
        }
        if let Some(name) = parts.name {
            out.push(SEGMENT_SEPARATOR);
            out.push_str(name);
        }
        out
    }
}

/// Splits `key` on the first `:` that is not part of a `::` pair.
///
/// Returns the leading segment and everything after the separator.
///
/// ```
/// use depot_container::key::parse;
///
/// assert_eq!(parse("app::db::Pool:replica"), ("app::db::Pool", Some("replica")));
/// assert_eq!(parse("app::db::Pool"), ("app::db::Pool", None));
/// ```
pub fn parse(key: &str) -> (&str, Option<&str>) {
    let bytes = key.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b':' {
            if bytes.get(i + 1) == Some(&b':') {
                i += 2;
                continue;
            }
            return (&key[..i], Some(&key[i + 1..]));
        }
        i += 1;
    }
    (key, None)
}

impl From<&str> for ServiceKey {
    fn from(repr: &str) -> Self {
        Self { repr: repr.into() }
    }
}

impl From<String> for ServiceKey {
    fn from(repr: String) -> Self {
        Self { repr: repr.into() }
    }
}

impl AsRef<str> for ServiceKey {
    fn as_ref(&self) -> &str {
        &self.repr
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.repr)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl serde::Serialize for ServiceKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.repr)
    }
}
