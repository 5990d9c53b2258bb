//! Type descriptors: what the resolver knows about a class or factory.
//!
//! Rust has no runtime reflection, so every autowirable type describes
//! itself: its name, the types it satisfies, and its constructor
//! parameters with their hints and defaults. `#[derive(Injectable)]`
//! writes this for structs; factories describe their parameters by hand.
//!
//! Descriptors are gathered in a [`TypeCatalog`]. The catalog is the only
//! place the resolver looks a class up by name.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{KhazinaError, Result};
use crate::value::{Arguments, Resolved, Service};

/// Autowiring hint carried by a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hint {
    /// A single service of the given type.
    Service(String),
    /// Every service of the given type, in index order.
    Collection(String),
}

impl Hint {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Service(ty) | Self::Collection(ty) => ty,
        }
    }
}

/// One constructor or factory parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub hint: Option<Hint>,
    pub default: Option<Value>,
    pub nullable: bool,
    /// Service id bound by an inject attribute.
    pub inject: Option<String>,
}

impl Parameter {
    /// A literal parameter with no autowiring hint.
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: None,
            default: None,
            nullable: false,
            inject: None,
        }
    }

    /// A parameter autowired by the type `T`.
    pub fn service<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::typed(name, type_name::<T>())
    }

    /// A parameter autowired by a type given by name.
    pub fn typed(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            hint: Some(Hint::Service(type_name.into())),
            ..Self::value(name)
        }
    }

    /// A parameter receiving every implementer of `T`.
    pub fn collection<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            hint: Some(Hint::Collection(type_name::<T>().to_string())),
            ..Self::value(name)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn inject(mut self, id: impl Into<String>) -> Self {
        self.inject = Some(id.into());
        self
    }
}

/// Describes an autowirable class.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    name: String,
    implements: Vec<String>,
    parameters: Vec<Parameter>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implements: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Descriptor named after `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(type_name::<T>())
    }

    /// Declares an extra type (usually a trait) this class satisfies.
    pub fn implements(mut self, type_name: impl Into<String>) -> Self {
        self.implements.push(type_name.into());
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Every type this class can be looked up by, its own name first.
    pub fn types(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.implements.iter().cloned())
            .collect()
    }
}

/// A type the container can construct from bound arguments.
///
/// Usually derived:
///
/// ```rust,ignore
/// #[derive(Injectable)]
/// struct Mailer {
///     transport: Arc<SmtpTransport>,
///     #[inject(default = "noreply@example.com")]
///     sender: String,
/// }
/// ```
pub trait Injectable: Send + Sync + Sized + 'static {
    fn descriptor() -> TypeDescriptor;

    fn construct(args: &mut Arguments) -> Result<Self>;
}

/// Type-erased constructor.
pub type ConstructFn = fn(&mut Arguments) -> Result<Service>;

/// Builds `T` and erases it into a [`Service`].
pub fn instantiate<T: Injectable>(args: &mut Arguments) -> Result<Service> {
    Ok(Arc::new(T::construct(args)?))
}

/// Link-time registration record, collected through `inventory`.
#[derive(Debug, Clone, Copy)]
pub struct ClassEntry {
    pub descriptor: fn() -> TypeDescriptor,
    pub construct: ConstructFn,
}

impl ClassEntry {
    pub const fn of<T: Injectable>() -> Self {
        Self {
            descriptor: T::descriptor,
            construct: instantiate::<T>,
        }
    }
}

inventory::collect!(ClassEntry);

/// A class known to the catalog.
#[derive(Clone)]
pub struct Class {
    descriptor: Arc<TypeDescriptor>,
    construct: ConstructFn,
}

impl Class {
    #[inline]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Calls the constructor.
    pub fn construct(&self, args: &mut Arguments) -> Result<Service> {
        (self.construct)(args)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Class").field(&self.descriptor.name).finish()
    }
}

/// Factory body.
pub type FactoryFn = Arc<dyn Fn(&mut Arguments) -> Result<Resolved> + Send + Sync>;

/// A callable producing a service from autowired parameters.
///
/// Factories built with [`Factory::from_fn`] carry a Rust path and can be
/// compiled; closures from [`Factory::new`] only work at runtime.
#[derive(Clone)]
pub struct Factory {
    name: String,
    path: Option<String>,
    parameters: Vec<Parameter>,
    returns: Vec<String>,
    call: FactoryFn,
}

impl Factory {
    /// Wraps a closure. `name` is used in error messages only.
    pub fn new(
        name: impl Into<String>,
        call: impl Fn(&mut Arguments) -> Result<Resolved> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            path: None,
            parameters: Vec::new(),
            returns: Vec::new(),
            call: Arc::new(call),
        }
    }

    /// Wraps a named function that generated code can call by `path`.
    pub fn from_fn(path: impl Into<String>, call: fn(&mut Arguments) -> Result<Resolved>) -> Self {
        let path = path.into();
        Self {
            name: path.clone(),
            path: Some(path),
            parameters: Vec::new(),
            returns: Vec::new(),
            call: Arc::new(call),
        }
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Declares the type this factory returns, for typed definitions.
    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.returns.push(type_name.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[inline]
    pub fn return_types(&self) -> &[String] {
        &self.returns
    }

    pub fn call(&self, args: &mut Arguments) -> Result<Resolved> {
        (self.call)(args)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("parameters", &self.parameters)
            .finish()
    }
}

static DISCOVERED: Lazy<TypeCatalog> = Lazy::new(|| {
    let mut catalog = TypeCatalog::new();
    for entry in inventory::iter::<ClassEntry> {
        catalog.register_entry(*entry);
    }
    debug!(classes = catalog.classes.len(), "Discovered injectable classes");
    catalog
});

/// Name-indexed classes and compilable factories.
#[derive(Clone, Default)]
pub struct TypeCatalog {
    classes: IndexMap<String, Class>,
    functions: IndexMap<String, Factory>,
}

impl TypeCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every class registered through `inventory`.
    pub fn discover() -> Self {
        DISCOVERED.clone()
    }

    pub fn register<T: Injectable>(&mut self) -> &mut Self {
        self.register_entry(ClassEntry::of::<T>())
    }

    pub fn register_entry(&mut self, entry: ClassEntry) -> &mut Self {
        self.add_class((entry.descriptor)(), entry.construct)
    }

    pub fn add_class(&mut self, descriptor: TypeDescriptor, construct: ConstructFn) -> &mut Self {
        trace!(class = %descriptor.name(), "Registered class descriptor");
        self.classes.insert(
            descriptor.name().to_string(),
            Class {
                descriptor: Arc::new(descriptor),
                construct,
            },
        );
        self
    }

    /// Registers a named factory so compiled units can call it.
    ///
    /// # Errors
    /// [`KhazinaError::Misconfiguration`] for closures without a path.
    pub fn add_function(&mut self, factory: Factory) -> Result<&mut Self> {
        let path = factory.path().map(str::to_string).ok_or_else(|| {
            KhazinaError::Misconfiguration(format!(
                "factory \"{}\" has no path and cannot be cataloged",
                factory.name()
            ))
        })?;
        Ok(self.insert_function(path, factory))
    }

    pub(crate) fn insert_function(&mut self, path: String, factory: Factory) -> &mut Self {
        trace!(path = %path, "Registered factory function");
        self.functions.insert(path, factory);
        self
    }

    #[inline]
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    #[inline]
    pub fn function(&self, path: &str) -> Option<&Factory> {
        self.functions.get(path)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("classes", &self.classes.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Clock;

    impl Injectable for Clock {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::of::<Self>()
                .implements("tests::TimeSource")
                .parameter(Parameter::value("zone").with_default("UTC"))
        }

        fn construct(args: &mut Arguments) -> Result<Self> {
            let _zone: String = args.value("zone")?;
            Ok(Clock)
        }
    }

    fn one() -> Resolved {
        Resolved::Value(json!(1))
    }

    fn one_factory(_: &mut Arguments) -> Result<Resolved> {
        Ok(one())
    }

    #[test]
    fn descriptor_types_start_with_own_name() {
        let types = Clock::descriptor().types();
        assert!(types[0].ends_with("Clock"));
        assert_eq!(types[1], "tests::TimeSource");
    }

    #[test]
    fn catalog_constructs_registered_class() {
        let mut catalog = TypeCatalog::new();
        catalog.register::<Clock>();

        let class = catalog.class(type_name::<Clock>()).unwrap();
        let mut args = Arguments::new(class.descriptor().name(), vec![(
            "zone".to_string(),
            Resolved::Value(json!("UTC")),
        )]);
        let service = class.construct(&mut args).unwrap();
        assert!(service.downcast_ref::<Clock>().is_some());
    }

    #[test]
    fn anonymous_factory_cannot_be_cataloged() {
        let mut catalog = TypeCatalog::new();
        let factory = Factory::new("closure", |_| Ok(one()));
        assert!(catalog.add_function(factory).is_err());
    }

    #[test]
    fn named_factory_is_cataloged() {
        let mut catalog = TypeCatalog::new();
        catalog
            .add_function(Factory::from_fn("tests::one_factory", one_factory))
            .unwrap();
        assert!(catalog.function("tests::one_factory").is_some());
    }

    #[test]
    fn parameter_builders() {
        let p = Parameter::service::<Clock>("clock").nullable();
        assert_eq!(p.hint, Some(Hint::Service(type_name::<Clock>().to_string())));
        assert!(p.nullable);

        let p = Parameter::collection::<Clock>("clocks");
        assert!(matches!(p.hint, Some(Hint::Collection(_))));

        let p = Parameter::value("port").with_default(8080);
        assert_eq!(p.default, Some(json!(8080)));
    }
}
