//! The container builder: same registrations, compiled ahead of time.
//!
//! [`ContainerBuilder`] accepts exactly what the runtime
//! [`Container`](crate::container::Container) accepts, but never builds a
//! service. Every definition goes through the [`Resolver`] with an
//! [`ExpressionBuilder`], which records *how* the service would be built
//! as an [`Expr`] tree. `compile` assembles those trees into a
//! [`CompiledUnit`] and hands it to a [`Printer`].
//!
//! ```text
//! set(...) ─┐
//!           ├─ compile ─► ExpressionBuilder ─► CompiledUnit ─► Printer ─► source
//! alias(...)┘
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use khazina_support::rendering::suggest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, trace};

use crate::container::DECORATED_TAG;
use crate::definition::{Argument, Bindings, Definition, Target};
use crate::descriptor::{Class, Factory, TypeCatalog};
use crate::error::{AmbiguousTypeError, KhazinaError, NotFoundError, Result};
use crate::expr::{Compiled, CompiledUnit, Expr, Parent, ServiceMethod, Tier};
use crate::graph::GraphValidator;
use crate::key::{LookupKey, split_nullable};
use crate::printer::{Printer, RustPrinter};
use crate::provider::{self, ProviderRegistry, Providers, ServiceProvider};
use crate::registry::{Registry, Tag};
use crate::resource::Resource;
use crate::resolver::{Builder, Resolver};
use crate::value::Service;

/// Options for [`ContainerBuilder::compile`].
///
/// Deserializes from configuration with every field optional:
///
/// ```
/// use khazina_container::builder::CompileOptions;
///
/// let options: CompileOptions = serde_json::from_str(r#"{"container_class": "AppContainer"}"#).unwrap();
/// assert!(options.strict_type);
/// assert!(options.print_to_string);
/// assert_eq!(options.container_class, "AppContainer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CompileOptions {
    /// Forbid `unsafe` code in the generated impl.
    pub strict_type: bool,
    /// Print the unit; otherwise `compile` returns it as is.
    pub print_to_string: bool,
    /// Name of the generated container type.
    pub container_class: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict_type: true,
            print_to_string: true,
            container_class: "CompiledContainer".to_string(),
        }
    }
}

/// Registers definitions and compiles them into a sealed container.
///
/// # Examples
/// ```rust
/// use khazina_container::prelude::*;
/// use serde_json::json;
///
/// let mut builder = ContainerBuilder::with_catalog(TypeCatalog::new());
/// builder.set("greeting", json!("hello")).unwrap();
///
/// let unit = builder
///     .compile(&CompileOptions { print_to_string: false, ..Default::default() })
///     .unwrap()
///     .into_unit()
///     .unwrap();
/// assert_eq!(unit.methods_map["greeting"], "get_greeting");
/// ```
pub struct ContainerBuilder {
    registry: Registry,
    resolver: Resolver,
    parent: Parent,
    providers: Providers,
    #[cfg(feature = "resources")]
    resources: IndexMap<String, Arc<dyn Resource>>,
    printer: Box<dyn Printer>,
}

impl ContainerBuilder {
    /// A builder over every class registered through `inventory`.
    pub fn new() -> Self {
        Self::with_catalog(TypeCatalog::discover())
    }

    pub fn with_catalog(catalog: TypeCatalog) -> Self {
        Self {
            registry: Registry::new(),
            resolver: Resolver::new(catalog),
            parent: Parent::default(),
            providers: Providers::default(),
            #[cfg(feature = "resources")]
            resources: IndexMap::new(),
            printer: Box::new(RustPrinter::default()),
        }
    }

    /// Catalog the builder resolves classes from. Path factories used by
    /// definitions are added to it on `set`.
    #[inline]
    pub fn catalog(&self) -> &TypeCatalog {
        self.resolver.catalog()
    }

    #[inline]
    pub fn catalog_mut(&mut self) -> &mut TypeCatalog {
        self.resolver.catalog_mut()
    }

    /// The type the compiled container wraps.
    pub fn set_parent(&mut self, parent: Parent) -> &mut Self {
        self.parent = parent;
        self
    }

    pub fn set_printer(&mut self, printer: impl Printer + 'static) -> &mut Self {
        self.printer = Box::new(printer);
        self
    }

    // ── Registration ──

    /// Registers a definition, replacing any previous one.
    ///
    /// # Errors
    /// [`KhazinaError::NotFound`] for a reference to an unknown id.
    pub fn set(&mut self, id: &str, definition: impl Into<Definition>) -> Result<()> {
        let definition = definition.into();
        catalog_functions(self.resolver.catalog_mut(), definition.target(), definition.arguments());
        self.registry.define(&mut self.resolver, id, definition)
    }

    pub fn multiple<I, S, D>(&mut self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, D)>,
        S: AsRef<str>,
        D: Into<Definition>,
    {
        for (id, definition) in definitions {
            self.set(id.as_ref(), definition)?;
        }
        Ok(())
    }

    /// Replaces `id` with `definition`, keeping the old one as `<id>.inner`.
    pub fn decorate(&mut self, id: &str, definition: impl Into<Definition>, new_id: Option<&str>) -> Result<()> {
        let inner = match self.registry.get(id) {
            Some(inner) => inner.clone(),
            None => return Err(self.not_found(id)),
        };

        self.remove_definition(id);
        let inner_id = format!("{id}.inner");
        self.set(&inner_id, inner)?;
        self.registry.tag(&inner_id, Tag::from(DECORATED_TAG));
        self.set(new_id.unwrap_or(id), definition)
    }

    /// Mutable access to a definition.
    pub fn extend(&mut self, id: &str) -> Result<&mut Definition> {
        if !self.registry.contains(id) {
            return Err(self.not_found(id));
        }
        self.registry
            .get_mut(id)
            .ok_or_else(|| KhazinaError::not_found(id, None))
    }

    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.registry.get(id)
    }

    pub fn remove_definition(&mut self, id: &str) {
        self.registry.remove_definition(id);
        self.resolver.remove(id);
    }

    /// Makes `id` resolve to `target`.
    ///
    /// # Errors
    /// [`KhazinaError::Misconfiguration`] for a self-alias or a loop,
    /// [`KhazinaError::NotFound`] if `target` is unknown.
    pub fn alias(&mut self, id: &str, target: &str) -> Result<()> {
        if id == target {
            return Err(KhazinaError::Misconfiguration(format!("\"{id}\" is aliased to itself")));
        }
        if !self.has(target) {
            return Err(self.not_found(target));
        }
        if self.registry.resolve_alias(target) == id {
            return Err(KhazinaError::Misconfiguration(format!(
                "aliasing \"{id}\" to \"{target}\" would loop"
            )));
        }
        self.registry.register_alias(id, target);
        Ok(())
    }

    pub fn aliased(&self, id: &str) -> bool {
        self.registry.aliased(id)
    }

    pub fn tag<I, S>(&mut self, ids: I, tags: Value)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = Tag::parse(tags);
        for id in ids {
            for tag in &tags {
                self.registry.tag(id.as_ref(), tag.clone());
            }
        }
    }

    /// Ids carrying `tag` with their attributes, in tagging order.
    pub fn tagged(&self, tag: &str) -> Vec<(String, Value)> {
        self.registry
            .tagged(tag)
            .into_iter()
            .map(|(id, attributes)| (id.to_string(), attributes.clone()))
            .collect()
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Argument>) {
        let value = value.into();
        if let Argument::Statement(ref statement) = value {
            catalog_functions(self.resolver.catalog_mut(), &statement.target, &statement.arguments);
        }
        self.registry.set_parameter(name, value);
    }

    pub fn parameters(&self) -> &IndexMap<String, Argument> {
        self.registry.parameters()
    }

    pub fn autowire<I, S>(&mut self, id: &str, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resolver.autowire(id, types);
    }

    pub fn exclude(&mut self, type_name: impl Into<String>) {
        self.resolver.exclude(type_name);
    }

    /// Registers a service provider and its dependencies.
    pub fn register(&mut self, service_provider: impl ServiceProvider, config: &Value) -> Result<&mut Self> {
        provider::register(self, Arc::new(service_provider), config)?;
        Ok(self)
    }

    pub fn provider(&self, id: &str) -> Option<Arc<dyn ServiceProvider>> {
        self.providers.get(id)
    }

    /// Drops the alias and tag entries for `id`.
    pub fn remove(&mut self, id: &str) {
        self.registry.remove(id);
    }

    // ── Inspection ──

    /// The expression `id` compiles to.
    ///
    /// Accepts the same keys as the runtime `get`; a leading `?` yields a
    /// `null` literal when nothing matches.
    pub fn get(&self, id: &str) -> Result<Expr> {
        let (key, nullable) = split_nullable(id);
        let ids = self.sorted_ids();
        let builder = ExpressionBuilder::new(&self.registry, &self.resolver, &ids);

        if let Some(definition) = self.registry.get(key) {
            if !definition.is_public() {
                return Err(KhazinaError::NotFound(NotFoundError {
                    requested: key.to_string(),
                    required_by: None,
                    suggestion: None,
                    private: true,
                }));
            }
            return builder.body(key, definition).map(|(body, _)| body);
        }

        Ok(builder
            .service(key, nullable)?
            .unwrap_or_else(|| Expr::literal(Value::Null)))
    }

    pub fn has(&self, id: &str) -> bool {
        let (key, _) = split_nullable(id);
        self.registry.knows(self.resolver.types(), key)
    }

    /// Every defined id, in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.registry.keys().map(str::to_string).collect()
    }

    // ── Resources ──

    /// Records an input the compiled container depends on.
    ///
    /// Without the `resources` feature this does nothing.
    #[cfg(feature = "resources")]
    pub fn add_resource(&mut self, resource: impl Resource) -> &mut Self {
        let key = resource.to_string();
        trace!(resource = %key, "Added resource");
        self.resources.entry(key).or_insert_with(|| Arc::new(resource));
        self
    }

    #[cfg(not(feature = "resources"))]
    pub fn add_resource(&mut self, _resource: impl Resource) -> &mut Self {
        self
    }

    #[cfg(feature = "resources")]
    pub fn resources(&self) -> Vec<Arc<dyn Resource>> {
        self.resources.values().cloned().collect()
    }

    #[cfg(not(feature = "resources"))]
    pub fn resources(&self) -> Vec<Arc<dyn Resource>> {
        Vec::new()
    }

    // ── Compilation ──

    /// Compiles every definition and prints the result, unless
    /// `print_to_string` is off.
    ///
    /// # Errors
    /// - [`KhazinaError::Misconfiguration`] for anonymous factories and
    ///   prebuilt instances, which have no source form
    /// - [`KhazinaError::CircularReference`] for a reference cycle
    /// - any resolution error, naming the service that required it
    #[instrument(skip_all, fields(class = %options.container_class))]
    pub fn compile(&self, options: &CompileOptions) -> Result<Compiled> {
        let unit = self.compile_unit(options)?;
        if !options.print_to_string {
            return Ok(Compiled::Unit(unit));
        }
        let source = self.printer.print(&unit)?;
        info!(bytes = source.len(), "Printed compiled container");
        Ok(Compiled::Source(source))
    }

    /// Builds the structured unit without printing it.
    pub fn compile_unit(&self, options: &CompileOptions) -> Result<CompiledUnit> {
        let ids = self.sorted_ids();
        let builder = ExpressionBuilder::new(&self.registry, &self.resolver, &ids);

        let mut methods = Vec::with_capacity(ids.len());
        let mut methods_map = IndexMap::new();
        let mut edges: IndexMap<String, Vec<String>> = IndexMap::new();

        for id in &ids {
            let Some(definition) = self.registry.definitions().get(*id) else {
                continue;
            };
            let (body, references) = builder.body(id, definition)?;
            let name = builder.method_name(id);

            let tier = definition.is_shared().then_some(if definition.is_public() {
                Tier::Services
            } else {
                Tier::Privates
            });
            if definition.is_public() {
                methods_map.insert(id.to_string(), name.clone());
            }

            trace!(id = %id, method = %name, ?tier, "Compiled service");
            methods.push(ServiceMethod {
                id: id.to_string(),
                name,
                tier,
                body,
            });
            edges.insert(id.to_string(), references);
        }

        let mut parameters = IndexMap::new();
        let mut dynamic_parameters = IndexMap::new();
        for (name, argument) in self.registry.parameters() {
            let expr = builder.argument(argument).map_err(|err| err.required_by(name))?;
            match expr.to_value() {
                Some(value) => {
                    parameters.insert(name.clone(), value);
                }
                None => {
                    dynamic_parameters.insert(name.clone(), expr);
                }
            }
        }

        for (class, discovered) in builder.into_discovered() {
            methods_map.insert(class.clone(), discovered.method.clone());
            edges.insert(class.clone(), discovered.references);
            methods.push(ServiceMethod {
                id: class,
                name: discovered.method,
                tier: Some(Tier::Services),
                body: discovered.body,
            });
        }

        GraphValidator::new(&edges).validate()?;

        let aliases = self
            .registry
            .aliases()
            .iter()
            .filter(|(_, target)| methods_map.contains_key(*target))
            .map(|(alias, target)| (alias.clone(), target.clone()))
            .collect();

        let types = self
            .resolver
            .types()
            .iter()
            .filter_map(|(type_name, ids)| {
                let public: Vec<String> = ids.iter().filter(|id| methods_map.contains_key(*id)).cloned().collect();
                (!public.is_empty()).then(|| (type_name.to_string(), public))
            })
            .collect();

        let mut tags: IndexMap<String, IndexMap<String, Value>> = IndexMap::new();
        for (id, service_tags) in self.registry.tags() {
            if !methods_map.contains_key(id) {
                continue;
            }
            for (tag, attributes) in service_tags {
                tags.entry(tag.clone())
                    .or_default()
                    .insert(id.clone(), attributes.clone());
            }
        }

        debug!(
            methods = methods.len(),
            public = methods_map.len(),
            parameters = parameters.len() + dynamic_parameters.len(),
            "Compiled container unit"
        );

        Ok(CompiledUnit {
            name: options.container_class.clone(),
            strict: options.strict_type,
            parent: self.parent.clone(),
            methods,
            methods_map,
            aliases,
            types,
            tags,
            parameters,
            dynamic_parameters,
            resources: self.resource_names(),
        })
    }

    // ── Internal ──

    fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.registry.keys().collect();
        ids.sort_unstable();
        ids
    }

    #[cfg(feature = "resources")]
    fn resource_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    #[cfg(not(feature = "resources"))]
    fn resource_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn not_found(&self, id: &str) -> KhazinaError {
        let known = self
            .registry
            .keys()
            .chain(self.registry.aliases().keys().map(String::as_str));
        KhazinaError::not_found(id, suggest(id, known))
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("definitions", &self.registry.len())
            .field("aliases", &self.registry.aliases().len())
            .field("parent", &self.parent.path)
            .finish()
    }
}

impl ProviderRegistry for ContainerBuilder {
    fn set(&mut self, id: &str, definition: Definition) -> Result<()> {
        ContainerBuilder::set(self, id, definition)
    }

    fn alias(&mut self, id: &str, target: &str) -> Result<()> {
        ContainerBuilder::alias(self, id, target)
    }

    fn tag(&mut self, id: &str, tags: Value) {
        ContainerBuilder::tag(self, [id], tags);
    }

    fn set_parameter(&mut self, name: &str, value: Argument) {
        ContainerBuilder::set_parameter(self, name, value);
    }

    fn autowire(&mut self, id: &str, types: &[String]) {
        ContainerBuilder::autowire(self, id, types);
    }

    fn exclude(&mut self, type_name: &str) {
        ContainerBuilder::exclude(self, type_name);
    }

    fn providers(&mut self) -> &mut Providers {
        &mut self.providers
    }
}

/// Adds the path factories a definition uses to the catalog, so a
/// compiled unit can be loaded in-process.
fn catalog_functions(catalog: &mut TypeCatalog, target: &Target, args: &Bindings) {
    if let Target::Factory(factory) = target
        && let Some(path) = factory.path()
    {
        catalog.insert_function(path.to_string(), factory.clone());
    }
    for argument in args.iter() {
        catalog_argument(catalog, argument);
    }
}

fn catalog_argument(catalog: &mut TypeCatalog, argument: &Argument) {
    match argument {
        Argument::Statement(statement) => catalog_functions(catalog, &statement.target, &statement.arguments),
        Argument::List(items) => items.iter().for_each(|item| catalog_argument(catalog, item)),
        Argument::Value(_) | Argument::Reference { .. } => {}
    }
}

/// A catalog class reached only through the type fallback.
struct Discovered {
    method: String,
    body: Expr,
    references: Vec<String>,
}

#[derive(Default)]
struct Session {
    /// id => accessor name
    names: IndexMap<String, String>,
    used: HashSet<String>,
    /// References recorded per body being compiled, innermost last.
    frames: Vec<Vec<String>>,
    discovered: IndexMap<String, Discovered>,
    /// Classes being discovered, for cycle detection.
    discovering: Vec<String>,
}

impl Session {
    fn assign(&mut self, id: &str) -> String {
        if let Some(name) = self.names.get(id) {
            return name.clone();
        }
        let base = method_name(id);
        let mut name = base.clone();
        let mut n = 2;
        while self.used.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.used.insert(name.clone());
        self.names.insert(id.to_string(), name.clone());
        name
    }

    fn record(&mut self, id: &str) {
        if let Some(frame) = self.frames.last_mut()
            && !frame.iter().any(|existing| existing == id)
        {
            frame.push(id.to_string());
        }
    }
}

/// `get_` followed by the id lowercased, with runs of other characters
/// replaced by one underscore.
fn method_name(id: &str) -> String {
    let mut name = String::from("get_");
    let mut separated = true;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
            separated = false;
        } else if !separated {
            name.push('_');
            separated = true;
        }
    }
    while name.len() > 4 && name.ends_with('_') {
        name.pop();
    }
    if name.len() == 4 {
        name.push_str("service");
    }
    name
}

/// Builds expression trees: the compile-time side of the [`Resolver`].
///
/// A reference to a defined id becomes [`Expr::Service`] and an edge of
/// the reference graph. Undefined catalog classes reached through the
/// type fallback are compiled once into their own shared accessor.
pub struct ExpressionBuilder<'a> {
    registry: &'a Registry,
    resolver: &'a Resolver,
    session: RefCell<Session>,
}

impl<'a> ExpressionBuilder<'a> {
    /// Names accessors for `ids` in the given order.
    pub(crate) fn new(registry: &'a Registry, resolver: &'a Resolver, ids: &[&str]) -> Self {
        let mut session = Session::default();
        for id in ids {
            session.assign(id);
        }
        Self {
            registry,
            resolver,
            session: RefCell::new(session),
        }
    }

    pub fn method_name(&self, id: &str) -> String {
        self.session.borrow_mut().assign(id)
    }

    /// The body of `id` and the ids it references.
    pub fn body(&self, id: &str, definition: &Definition) -> Result<(Expr, Vec<String>)> {
        self.session.borrow_mut().frames.push(Vec::new());
        let body = self
            .resolver
            .resolve(self, definition.target(), definition.arguments());
        let references = self.session.borrow_mut().frames.pop().unwrap_or_default();
        body.map(|body| (body, references)).map_err(|err| err.required_by(id))
    }

    /// One explicit argument, outside any service body.
    pub fn argument(&self, argument: &Argument) -> Result<Expr> {
        self.resolver.resolve_argument(self, argument)
    }

    fn into_discovered(self) -> IndexMap<String, Discovered> {
        self.session.into_inner().discovered
    }

    fn reference(&self, key: &str) -> Result<Option<Expr>> {
        let id = self.registry.resolve_alias(key);
        if self.registry.definitions().contains_key(id) {
            let method = {
                let mut session = self.session.borrow_mut();
                session.record(id);
                session.assign(id)
            };
            return Ok(Some(Expr::Service {
                id: id.to_string(),
                method,
            }));
        }

        let types = self.resolver.types();
        match LookupKey::parse(id) {
            LookupKey::Id(type_name) => match types.get(type_name) {
                [] => Ok(self.discover(type_name)),
                [single] => self.reference(single),
                many => Err(KhazinaError::AmbiguousType(AmbiguousTypeError {
                    type_name: type_name.to_string(),
                    candidates: many.to_vec(),
                })),
            },
            LookupKey::AllOf(type_name) => {
                let ids = types.get(type_name);
                if ids.is_empty() {
                    return Ok(None);
                }
                let items = ids
                    .iter()
                    .map(|id| self.reference(id)?.ok_or_else(|| KhazinaError::not_found(id, None)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Expr::List { items }))
            }
            LookupKey::Named { type_name, name } => {
                if types.get(type_name).iter().any(|id| id == name) {
                    self.reference(name)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Compiles an undefined catalog class into its own accessor.
    ///
    /// Failures are reported as "not found" rather than propagated, like
    /// the runtime fallback.
    fn discover(&self, class: &str) -> Option<Expr> {
        self.resolver.catalog().class(class)?;

        {
            let mut session = self.session.borrow_mut();
            if session.discovered.contains_key(class) {
                session.record(class);
                let method = session.assign(class);
                return Some(Expr::Service {
                    id: class.to_string(),
                    method,
                });
            }
            if session.discovering.iter().any(|entry| entry == class) {
                let chain = session.discovering.join(" → ");
                debug!(class = %class, chain = %chain, "Autowiring fallback is circular");
                return None;
            }
            session.discovering.push(class.to_string());
            session.frames.push(Vec::new());
        }

        let body = self.resolver.resolve_class(self, class, &Bindings::default());

        let mut session = self.session.borrow_mut();
        let references = session.frames.pop().unwrap_or_default();
        session.discovering.pop();

        match body {
            Ok(body) => {
                let method = session.assign(class);
                session.record(class);
                session.discovered.insert(class.to_string(), Discovered {
                    method: method.clone(),
                    body,
                    references,
                });
                Some(Expr::Service {
                    id: class.to_string(),
                    method,
                })
            }
            Err(err) => {
                debug!(class = %class, error = %err, "Autowiring fallback failed");
                None
            }
        }
    }

    fn not_found(&self, key: &str) -> KhazinaError {
        KhazinaError::not_found(key, suggest(key, self.registry.keys()))
    }
}

impl Builder for ExpressionBuilder<'_> {
    type Output = Expr;

    fn literal(&self, value: &Value) -> Expr {
        Expr::literal(value.clone())
    }

    fn list(&self, items: Vec<Expr>) -> Expr {
        Expr::List { items }
    }

    fn service(&self, id: &str, nullable: bool) -> Result<Option<Expr>> {
        let (key, marked) = split_nullable(id);
        match self.reference(key)? {
            Some(expr) => Ok(Some(expr)),
            None if nullable || marked => Ok(None),
            None => Err(self.not_found(key)),
        }
    }

    fn instantiate(&self, class: &Class, args: Vec<(String, Expr)>) -> Result<Expr> {
        Ok(Expr::New {
            class: class.descriptor().name().to_string(),
            args: args.into_iter().collect(),
        })
    }

    fn invoke(&self, factory: &Factory, args: Vec<(String, Expr)>) -> Result<Expr> {
        let path = factory.path().ok_or_else(|| {
            KhazinaError::Misconfiguration(format!(
                "factory \"{}\" is a closure and cannot be compiled; use Factory::from_fn",
                factory.name()
            ))
        })?;
        Ok(Expr::Call {
            path: path.to_string(),
            args: args.into_iter().collect(),
        })
    }

    fn instance(&self, _instance: &Service) -> Result<Expr> {
        Err(KhazinaError::Misconfiguration(
            "prebuilt instances cannot be compiled; register a class or a path factory".to_string(),
        ))
    }
}

impl fmt::Debug for ExpressionBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.borrow();
        f.debug_struct("ExpressionBuilder")
            .field("names", &session.names.len())
            .field("discovered", &session.discovered.keys().collect::<Vec<_>>())
            .finish()
    }
}
