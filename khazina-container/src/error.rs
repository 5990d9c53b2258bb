//! Error types for Khazina container operations.
//!
//! Every failure names the service id involved and, where possible,
//! how to fix it.

use std::fmt;

use khazina_support::rendering::{render_chain, summarize_candidates};

/// Main error type for all Khazina operations.
#[derive(Debug, thiserror::Error)]
pub enum KhazinaError {
    /// Requested id/type has no definition, alias or type-index entry.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Attempt to redefine a service that is already built.
    #[error("{}", .0)]
    Frozen(FrozenError),

    /// A service was requested again while it was still being built.
    #[error("{}", .0)]
    CircularReference(CircularReferenceError),

    /// A type lookup matched more than one service.
    #[error("{}", .0)]
    AmbiguousType(AmbiguousTypeError),

    /// Malformed alias, provider dependency or non-compilable definition.
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// A required constructor/factory parameter could not be bound.
    #[error("{}", .0)]
    Unresolvable(UnresolvableError),

    /// Constructor or factory returned an error, or the built value
    /// had an unexpected type.
    #[error("Failed to construct {id}: {source}")]
    ConstructionFailed {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl KhazinaError {
    pub(crate) fn not_found(id: impl Into<String>, suggestion: Option<String>) -> Self {
        Self::NotFound(NotFoundError {
            requested: id.into(),
            required_by: None,
            suggestion,
            private: false,
        })
    }

    pub(crate) fn frozen(id: impl Into<String>) -> Self {
        Self::Frozen(FrozenError { id: id.into() })
    }

    pub(crate) fn construction(id: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::ConstructionFailed {
            id: id.into(),
            source: message.into(),
        }
    }

    /// Names the service whose construction hit a missing dependency.
    pub(crate) fn required_by(self, id: &str) -> Self {
        match self {
            Self::NotFound(mut inner) if inner.required_by.is_none() && inner.requested != id => {
                inner.required_by = Some(id.to_string());
                Self::NotFound(inner)
            }
            other => other,
        }
    }

    /// Returns `true` for the "nothing matched" family of errors that
    /// lookups may downgrade to `None` under a null-on-invalid policy.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Error when an identifier is not defined.
///
/// Includes a "did you mean?" hint when a close id exists.
#[derive(Debug)]
pub struct NotFoundError {
    /// The id that was requested
    pub requested: String,
    /// What required this service (if known)
    pub required_by: Option<String>,
    /// Closest known id
    pub suggestion: Option<String>,
    /// The id exists but is private to the container
    pub private: bool,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.private {
            write!(
                f,
                "The \"{}\" service is private and cannot be requested from outside the container",
                self.requested
            )?;
        } else {
            write!(
                f,
                "The \"{}\" requested service is not defined in container",
                self.requested
            )?;
        }

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Did you mean: \"{suggestion}\"?")?;
        }

        Ok(())
    }
}

/// Error when trying to modify a frozen service.
#[derive(Debug)]
pub struct FrozenError {
    pub id: String,
}

impl fmt::Display for FrozenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The \"{}\" service is already initialized, and cannot be replaced",
            self.id
        )?;
        write!(f, "\n  Hint: Register or extend services before the first get()")
    }
}

/// Error when a circular reference is detected.
///
/// Shows the full chain so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularReferenceError {
    /// The chain of ids that forms the cycle.
    /// Example: ["a", "b", "c", "a"]
    pub chain: Vec<String>,
}

impl fmt::Display for CircularReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular reference detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: Break the cycle with a factory or restructure the services"
        )
    }
}

/// Error when a type lookup matches several services.
#[derive(Debug)]
pub struct AmbiguousTypeError {
    pub type_name: String,
    pub candidates: Vec<String>,
}

impl fmt::Display for AmbiguousTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Multiple services of type {} found: {}",
            self.type_name,
            summarize_candidates(&self.candidates)
        )?;
        write!(
            f,
            "\n  Hint: Request \"{}[<id>]\" or pass the service explicitly",
            self.type_name
        )
    }
}

/// Error when a required parameter cannot be bound.
#[derive(Debug)]
pub struct UnresolvableError {
    /// Class or factory owning the parameter
    pub owner: String,
    pub parameter: String,
    pub type_hint: Option<String>,
}

impl fmt::Display for UnresolvableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unable to resolve parameter \"{}\" of {}",
            self.parameter, self.owner
        )?;
        if let Some(ref hint) = self.type_hint {
            write!(f, "\n  No service of type {hint} is registered")?;
        }
        write!(
            f,
            "\n  Hint: Pass it as an argument or give the parameter a default"
        )
    }
}

/// Convenient Result type for Khazina operations.
pub type Result<T> = std::result::Result<T, KhazinaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_error_display() {
        let err = KhazinaError::NotFound(NotFoundError {
            requested: "loger".into(),
            required_by: Some("app".into()),
            suggestion: Some("logger".into()),
            private: false,
        });

        let msg = format!("{err}");
        assert!(msg.contains("not defined"));
        assert!(msg.contains("Required by: app"));
        assert!(msg.contains("Did you mean: \"logger\""));
    }

    #[test]
    fn private_not_found_display() {
        let err = KhazinaError::NotFound(NotFoundError {
            requested: "pool".into(),
            required_by: None,
            suggestion: None,
            private: true,
        });
        assert!(format!("{err}").contains("private"));
    }

    #[test]
    fn circular_reference_error_display() {
        let err = KhazinaError::CircularReference(CircularReferenceError {
            chain: vec!["a".into(), "b".into(), "a".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Circular"));
        assert!(msg.contains("a → b → a"));
    }

    #[test]
    fn ambiguous_type_error_display() {
        let err = KhazinaError::AmbiguousType(AmbiguousTypeError {
            type_name: "app::Cache".into(),
            candidates: vec!["redis".into(), "memory".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Multiple services of type app::Cache found: memory, redis"));
        assert!(msg.contains("app::Cache[<id>]"));
    }

    #[test]
    fn frozen_error_display() {
        let msg = format!("{}", KhazinaError::frozen("db"));
        assert!(msg.contains("already initialized"));
        assert!(msg.contains("before the first get()"));
    }

    #[test]
    fn not_found_helper_is_not_found() {
        assert!(KhazinaError::not_found("x", None).is_not_found());
        assert!(!KhazinaError::Misconfiguration("x".into()).is_not_found());
    }
}
