//! Lookup keys.
//!
//! A string passed to `get` is more than an id. It may carry a
//! null-on-invalid marker (`?id`) and, on the type-index fallback path,
//! a selector over the implementers of a type:
//!
//! | Key             | Meaning                                   |
//! |-----------------|-------------------------------------------|
//! | `logger`        | the service `logger`                      |
//! | `?logger`       | the service `logger`, or nothing          |
//! | `app::Cache`    | the single implementer of `app::Cache`    |
//! | `app::Cache[]`  | every implementer, in index order         |
//! | `app::Cache[r]` | the implementer with id `r`               |
//!
//! Exact ids always win: the selector grammar is only consulted once the
//! container has failed to find the raw key, so ids containing brackets
//! remain addressable.

use std::fmt;

/// The optional `?` prefix selecting null-on-invalid behaviour.
const NULLABLE_PREFIX: char = '?';

/// Splits the null-on-invalid marker off a raw key.
///
/// # Examples
/// ```
/// use khazina_container::key::split_nullable;
///
/// assert_eq!(split_nullable("?logger"), ("logger", true));
/// assert_eq!(split_nullable("logger"), ("logger", false));
/// ```
#[inline]
pub fn split_nullable(raw: &str) -> (&str, bool) {
    match raw.strip_prefix(NULLABLE_PREFIX) {
        Some(id) => (id, true),
        None => (raw, false),
    }
}

/// A parsed type-index selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey<'a> {
    /// Plain id or type name.
    Id(&'a str),
    /// `Type[]`: all implementers.
    AllOf(&'a str),
    /// `Type[name]`: one named implementer.
    Named { type_name: &'a str, name: &'a str },
}

impl<'a> LookupKey<'a> {
    /// Parses a key (without the `?` marker) into a selector.
    ///
    /// ```
    /// use khazina_container::key::LookupKey;
    ///
    /// assert_eq!(LookupKey::parse("app::Cache[]"), LookupKey::AllOf("app::Cache"));
    /// assert_eq!(
    ///     LookupKey::parse("app::Cache[redis]"),
    ///     LookupKey::Named { type_name: "app::Cache", name: "redis" },
    /// );
    /// assert_eq!(LookupKey::parse("logger"), LookupKey::Id("logger"));
    /// ```
    pub fn parse(key: &'a str) -> Self {
        let Some(inner) = key.strip_suffix(']') else {
            return Self::Id(key);
        };
        let Some(open) = inner.find('[') else {
            return Self::Id(key);
        };

        let type_name = &inner[..open];
        let name = &inner[open + 1..];

        if type_name.is_empty() {
            return Self::Id(key);
        }

        if name.is_empty() {
            Self::AllOf(type_name)
        } else {
            Self::Named { type_name, name }
        }
    }

    /// Returns the type (or id) part of the key.
    #[inline]
    pub fn type_name(&self) -> &'a str {
        match *self {
            Self::Id(id) | Self::AllOf(id) => id,
            Self::Named { type_name, .. } => type_name,
        }
    }
}

impl fmt::Display for LookupKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::AllOf(ty) => write!(f, "{ty}[]"),
            Self::Named { type_name, name } => write!(f, "{type_name}[{name}]"),
        }
    }
}
