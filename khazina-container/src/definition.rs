//! Definitions: the recipe for one service.
//!
//! A [`Definition`] names a [`Target`] (what to build), [`Bindings`]
//! (explicit arguments, which win over autowiring), and the flags that
//! decide how the result is cached and exposed.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::descriptor::{ClassEntry, Factory, Injectable};
use crate::value::Service;

/// Prefix marking a string argument as a service reference.
pub const REFERENCE_PREFIX: char = '@';

/// What a definition builds.
#[derive(Debug, Clone)]
pub enum Target {
    /// An autowired class from the type catalog.
    Class(String),
    /// A factory called with autowired parameters.
    Factory(Factory),
    /// A raw literal, returned as is.
    Value(Value),
    /// A prebuilt instance.
    Instance(Service),
    /// Another service id; `set` copies that definition.
    Reference(String),
}

/// One explicit argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    Reference { id: String, nullable: bool },
    Statement(Statement),
    List(Vec<Argument>),
}

impl Argument {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// A reference to another service (or a lookup key like `Type[]`).
    pub fn reference(id: impl Into<String>) -> Self {
        Self::Reference {
            id: id.into(),
            nullable: false,
        }
    }

    /// Interprets configuration: `"@id"` is a reference, `"@?id"` a
    /// nullable one, `"@@text"` the literal `"@text"`; arrays are parsed
    /// element-wise.
    ///
    /// ```
    /// use khazina_container::definition::Argument;
    /// use serde_json::json;
    ///
    /// assert_eq!(Argument::parse(json!("@logger")), Argument::reference("logger"));
    /// assert_eq!(Argument::parse(json!("@@home")), Argument::value("@home"));
    /// ```
    pub fn parse(value: Value) -> Self {
        match value {
            Value::String(text) => match text.strip_prefix(REFERENCE_PREFIX) {
                Some(rest) if rest.starts_with(REFERENCE_PREFIX) => Self::Value(Value::String(rest.to_string())),
                Some(rest) => match rest.strip_prefix('?') {
                    Some(id) => Self::Reference {
                        id: id.to_string(),
                        nullable: true,
                    },
                    None => Self::reference(rest),
                },
                None => Self::Value(Value::String(text)),
            },
            Value::Array(items) if items.iter().any(is_reference_string) => {
                Self::List(items.into_iter().map(Self::parse).collect())
            }
            other => Self::Value(other),
        }
    }

    /// `true` when the argument is a literal that can be inlined.
    pub fn is_literal(&self) -> bool {
        match self {
            Self::Value(_) => true,
            Self::List(items) => items.iter().all(Self::is_literal),
            Self::Reference { .. } | Self::Statement(_) => false,
        }
    }
}

fn is_reference_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.starts_with(REFERENCE_PREFIX))
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::parse(value)
    }
}

impl From<Statement> for Argument {
    fn from(statement: Statement) -> Self {
        Self::Statement(statement)
    }
}

/// A nested construction used as an argument: build `target` with its
/// own bindings.
#[derive(Debug, Clone)]
pub struct Statement {
    pub target: Box<Target>,
    pub arguments: Bindings,
}

impl Statement {
    pub fn new(target: Target) -> Self {
        Self {
            target: Box::new(target),
            arguments: Bindings::default(),
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::new(Target::Class(name.into()))
    }

    pub fn arg(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>, argument: impl Into<Argument>) -> Self {
        self.arguments.insert(name, argument.into());
        self
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        let same_target = match (&*self.target, &*other.target) {
            (Target::Class(a), Target::Class(b)) | (Target::Reference(a), Target::Reference(b)) => a == b,
            (Target::Value(a), Target::Value(b)) => a == b,
            (Target::Factory(a), Target::Factory(b)) => a.name() == b.name(),
            (Target::Instance(a), Target::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_target && self.arguments == other.arguments
    }
}

/// Explicit argument bindings by position and by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    positional: Vec<Argument>,
    named: IndexMap<String, Argument>,
}

impl Bindings {
    pub fn push(&mut self, argument: Argument) {
        self.positional.push(argument);
    }

    pub fn insert(&mut self, name: impl Into<String>, argument: Argument) {
        self.named.insert(name.into(), argument);
    }

    /// The binding for a parameter: by name first, then by position.
    pub fn lookup(&self, index: usize, name: &str) -> Option<&Argument> {
        self.named.get(name).or_else(|| self.positional.get(index))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Every bound argument, positional first.
    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.positional.iter().chain(self.named.values())
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }
}

/// The recipe for one service.
///
/// # Examples
/// ```
/// use khazina_container::definition::{Definition, Argument};
/// use serde_json::json;
///
/// let def = Definition::class("app::Mailer")
///     .named("sender", json!("noreply@example.com"))
///     .named("transport", Argument::reference("smtp"))
///     .private()
///     .tag("mail.sender", json!(true));
/// assert!(!def.is_public());
/// assert!(def.is_shared());
/// ```
#[derive(Clone)]
pub struct Definition {
    target: Target,
    arguments: Bindings,
    public: bool,
    shared: bool,
    typed: Option<Vec<String>>,
    tags: IndexMap<String, Value>,
    entry: Option<ClassEntry>,
}

impl Definition {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            arguments: Bindings::default(),
            public: true,
            shared: true,
            typed: None,
            tags: IndexMap::new(),
            entry: None,
        }
    }

    /// A class looked up in the container's type catalog by name.
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(Target::Class(name.into()))
    }

    /// A class given by type; its descriptor is registered on `set`.
    pub fn of<T: Injectable>() -> Self {
        let mut definition = Self::class(std::any::type_name::<T>());
        definition.entry = Some(ClassEntry::of::<T>());
        definition
    }

    pub fn factory(factory: Factory) -> Self {
        Self::new(Target::Factory(factory))
    }

    /// A raw value, never interpreted.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new(Target::Value(value.into()))
    }

    pub fn instance<T: Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::new(Target::Instance(instance))
    }

    /// A copy of the definition registered under `id`.
    pub fn reference(id: impl Into<String>) -> Self {
        Self::new(Target::Reference(id.into()))
    }

    // ── Builder-style configuration ──

    /// Appends a positional argument.
    pub fn arg(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Binds an argument by parameter name.
    pub fn named(mut self, name: impl Into<String>, argument: impl Into<Argument>) -> Self {
        self.arguments.insert(name, argument.into());
        self
    }

    /// Resolvable by other services only.
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    /// Built anew on every `get`.
    pub fn non_shared(mut self) -> Self {
        self.shared = false;
        self
    }

    /// Indexes the id under the types its target satisfies.
    pub fn typed(mut self) -> Self {
        self.typed = Some(Vec::new());
        self
    }

    /// Indexes the id under the given types.
    pub fn typed_as<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.typed = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn tag(mut self, name: impl Into<String>, attributes: Value) -> Self {
        self.tags.insert(name.into(), attributes);
        self
    }

    // ── In-place mutation (for `extend`) ──

    pub fn set_target(&mut self, target: Target) -> &mut Self {
        self.target = target;
        self.entry = None;
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, argument: impl Into<Argument>) -> &mut Self {
        self.arguments.insert(name, argument.into());
        self
    }

    pub fn set_public(&mut self, public: bool) -> &mut Self {
        self.public = public;
        self
    }

    pub fn set_shared(&mut self, shared: bool) -> &mut Self {
        self.shared = shared;
        self
    }

    pub fn add_tag(&mut self, name: impl Into<String>, attributes: Value) -> &mut Self {
        self.tags.insert(name.into(), attributes);
        self
    }

    // ── Accessors ──

    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline]
    pub fn arguments(&self) -> &Bindings {
        &self.arguments
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.public
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    #[inline]
    pub fn is_typed(&self) -> bool {
        self.typed.is_some()
    }

    /// Types declared explicitly with [`typed_as`](Self::typed_as).
    pub fn declared_types(&self) -> &[String] {
        self.typed.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn tags(&self) -> &IndexMap<String, Value> {
        &self.tags
    }

    pub(crate) fn class_entry(&self) -> Option<ClassEntry> {
        self.entry
    }
}

impl From<Value> for Definition {
    /// Shorthand normalisation: `"@id"` copies another definition,
    /// anything else is a raw value.
    fn from(value: Value) -> Self {
        if let Value::String(text) = &value
            && let Some(rest) = text.strip_prefix(REFERENCE_PREFIX)
        {
            return match rest.strip_prefix(REFERENCE_PREFIX) {
                Some(_) => Self::value(rest),
                None => Self::reference(rest.trim_start_matches('?')),
            };
        }
        Self::value(value)
    }
}

impl From<Factory> for Definition {
    fn from(factory: Factory) -> Self {
        Self::factory(factory)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("target", &self.target)
            .field("arguments", &self.arguments.len())
            .field("public", &self.public)
            .field("shared", &self.shared)
            .field("typed", &self.typed)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .finish()
    }
}
