//! The compiled unit: what the container builder emits.
//!
//! Each definition becomes a [`ServiceMethod`] whose body is an [`Expr`]
//! tree. The unit also carries the lookup tables a sealed container
//! needs. It serializes with `serde`, and can be either printed as Rust
//! source (see [`printer`](crate::printer)) or loaded in-process by
//! [`SealedContainer::load`](crate::sealed::SealedContainer::load).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node of a service body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// A literal folded in at compile time.
    Literal { value: Value },
    /// An ordered sequence.
    List { items: Vec<Expr> },
    /// Construct a catalog class from named arguments.
    New {
        class: String,
        args: IndexMap<String, Expr>,
    },
    /// Call a named factory function.
    Call {
        path: String,
        args: IndexMap<String, Expr>,
    },
    /// The service `id`, through its accessor `method`.
    Service { id: String, method: String },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal { value: value.into() }
    }

    /// The value of a fully literal tree, if it is one.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Literal { value } => Some(value.clone()),
            Self::List { items } => items.iter().map(Self::to_value).collect::<Option<Vec<_>>>().map(Value::Array),
            Self::New { .. } | Self::Call { .. } | Self::Service { .. } => None,
        }
    }
}

/// Where a shared accessor stores what it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Services,
    Privates,
}

/// The accessor for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMethod {
    pub id: String,
    pub name: String,
    /// `None` for non-shared services, rebuilt on every call.
    pub tier: Option<Tier>,
    pub body: Expr,
}

/// The type a compiled container wraps.
///
/// With a `constructor`, the generated code calls `path::constructor()`;
/// otherwise it uses `Default`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub path: String,
    #[serde(default)]
    pub constructor: Option<String>,
}

impl Parent {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            constructor: None,
        }
    }

    pub fn constructor(mut self, name: impl Into<String>) -> Self {
        self.constructor = Some(name.into());
        self
    }
}

impl Default for Parent {
    fn default() -> Self {
        Self::new("::khazina::SealedContainer")
    }
}

/// Everything a sealed container is made of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// Name of the generated container type.
    pub name: String,
    pub strict: bool,
    pub parent: Parent,
    /// One accessor per definition, sorted by id.
    pub methods: Vec<ServiceMethod>,
    /// public id => accessor name
    pub methods_map: IndexMap<String, String>,
    /// alias => public id
    pub aliases: IndexMap<String, String>,
    /// type => public ids
    pub types: IndexMap<String, Vec<String>>,
    /// tag => public id => attributes
    pub tags: IndexMap<String, IndexMap<String, Value>>,
    /// Literal parameters, inlined.
    pub parameters: IndexMap<String, Value>,
    /// Computed parameters, evaluated when the container is constructed.
    pub dynamic_parameters: IndexMap<String, Expr>,
    pub resources: Vec<String>,
}

impl CompiledUnit {
    pub fn method(&self, name: &str) -> Option<&ServiceMethod> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Accessors storing into the given tier.
    pub fn methods_in(&self, tier: Tier) -> impl Iterator<Item = &ServiceMethod> {
        self.methods.iter().filter(move |method| method.tier == Some(tier))
    }
}

/// Output of [`ContainerBuilder::compile`](crate::builder::ContainerBuilder::compile).
#[derive(Debug, Clone)]
pub enum Compiled {
    /// Printed source.
    Source(String),
    /// The structured unit, when printing was not requested.
    Unit(CompiledUnit),
}

impl Compiled {
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Source(source) => Some(source),
            Self::Unit(_) => None,
        }
    }

    pub fn into_unit(self) -> Option<CompiledUnit> {
        match self {
            Self::Unit(unit) => Some(unit),
            Self::Source(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_lists_fold_to_values() {
        let expr = Expr::List {
            items: vec![Expr::literal(1), Expr::literal("two")],
        };
        assert_eq!(expr.to_value(), Some(json!([1, "two"])));

        let mixed = Expr::List {
            items: vec![
                Expr::literal(1),
                Expr::Service {
                    id: "a".into(),
                    method: "get_a".into(),
                },
            ],
        };
        assert_eq!(mixed.to_value(), None);
    }

    #[test]
    fn expr_serializes_with_kind_tag() {
        let expr = Expr::Service {
            id: "logger".into(),
            method: "get_logger".into(),
        };
        assert_eq!(
            serde_json::to_value(&expr).unwrap(),
            json!({"kind": "service", "id": "logger", "method": "get_logger"})
        );
    }

    #[test]
    fn parent_constructor_defaults_to_none() {
        let parent: Parent = serde_json::from_value(json!({"path": "crate::Base"})).unwrap();
        assert_eq!(parent, Parent::new("crate::Base"));
        assert_eq!(Parent::default().path, "::khazina::SealedContainer");
    }
}
