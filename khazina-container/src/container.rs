//! # The Container: heart of Khazina
//!
//! The runtime container turns definitions into live services on first
//! `get`, caches shared ones, and refuses to redefine what is built.
//!
//! # Architecture
//! ```text
//! set(id, Definition) ──> Registry ──get(id)──> Resolver ──ValueBuilder──> Service
//!                                                  │                          │
//!                                             type index                services / privates
//! ```
//!
//! # Examples
//! ```rust
//! use khazina_container::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl Injectable for Greeter {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::of::<Self>().parameter(Parameter::value("greeting").with_default("hello"))
//!     }
//!
//!     fn construct(args: &mut Arguments) -> Result<Self> {
//!         Ok(Greeter { greeting: args.value("greeting")? })
//!     }
//! }
//!
//! let mut container = Container::new();
//! container.set("greeter", Definition::of::<Greeter>()).unwrap();
//! container.set("name", json!("world")).unwrap();
//!
//! let greeter: Arc<Greeter> = container.get_as("greeter").unwrap();
//! assert_eq!(greeter.greeting, "hello");
//! assert!(Arc::ptr_eq(&container.get("greeter").unwrap(), &(greeter as Service)));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use khazina_support::rendering::suggest;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::ServiceCache;
use crate::definition::{Argument, Bindings, Definition, Target};
use crate::descriptor::{Class, Factory, TypeCatalog};
use crate::error::{
    AmbiguousTypeError, CircularReferenceError, KhazinaError, NotFoundError, Result,
};
use crate::key::{LookupKey, split_nullable};
use crate::provider::{self, ProviderRegistry, Providers, ServiceProvider};
use crate::registry::{Registry, Tag};
use crate::resolver::{Builder, Resolver};
use crate::value::{Arguments, Resolved, Service, downcast};

/// Tag put on the inner definition kept by [`Container::decorate`].
pub const DECORATED_TAG: &str = "container.decorated_services";

/// What a lookup does when nothing matches, and how it caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidBehavior {
    /// Fail with [`KhazinaError::NotFound`].
    #[default]
    Exception,
    /// Yield nothing instead of failing.
    NullOnInvalid,
    /// Build without caching, even for shared services.
    IgnoreFreezing,
    /// Build and keep the instance pending without freezing the id; the
    /// next default lookup promotes it into the cache.
    IgnoreInitializing,
}

/// Runtime dependency injection container.
///
/// Registration takes `&mut self`; resolution takes `&self` and is
/// `Send + Sync`. The container is not `Clone`: share it behind an `Arc`,
/// or share only the public tier through a [`ServiceCache`].
pub struct Container {
    registry: Registry,
    resolver: Resolver,
    services: ServiceCache,
    privates: Mutex<IndexMap<String, Service>>,
    pending: Mutex<IndexMap<String, Service>>,
    /// Ids mid-construction, one path per resolving thread.
    loading: Mutex<HashMap<ThreadId, Vec<String>>>,
    providers: Providers,
}

impl Container {
    /// A container over every class registered through `inventory`.
    pub fn new() -> Self {
        Self::with_catalog(TypeCatalog::discover())
    }

    pub fn with_catalog(catalog: TypeCatalog) -> Self {
        Self {
            registry: Registry::new(),
            resolver: Resolver::new(catalog),
            services: ServiceCache::new(),
            privates: Mutex::new(IndexMap::new()),
            pending: Mutex::new(IndexMap::new()),
            loading: Mutex::new(HashMap::new()),
            providers: Providers::default(),
        }
    }

    /// Uses `cache` as the public service tier.
    pub fn with_cache(mut self, cache: ServiceCache) -> Self {
        self.services = cache;
        self
    }

    #[inline]
    pub fn cache(&self) -> &ServiceCache {
        &self.services
    }

    #[inline]
    pub fn catalog(&self) -> &TypeCatalog {
        self.resolver.catalog()
    }

    #[inline]
    pub fn catalog_mut(&mut self) -> &mut TypeCatalog {
        self.resolver.catalog_mut()
    }

    // ── Registration ──

    /// Registers a definition, replacing any unbuilt one.
    ///
    /// Accepts anything convertible to a [`Definition`], so raw JSON
    /// values work as shorthand (`"@id"` copies another definition).
    ///
    /// # Errors
    /// - [`KhazinaError::Frozen`] if `id` is already built
    /// - [`KhazinaError::NotFound`] for a reference to an unknown id
    pub fn set(&mut self, id: &str, definition: impl Into<Definition>) -> Result<()> {
        if self.is_frozen(id) {
            return Err(KhazinaError::frozen(id));
        }

        self.registry
            .define(&mut self.resolver, id, definition.into())?;
        self.pending.get_mut().shift_remove(id);
        Ok(())
    }

    /// Registers several definitions in order.
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
    ///
    /// The inner definition is tagged [`DECORATED_TAG`], so the decorator
    /// can take it as `"@<id>.inner"`. With `new_id`, the decorator is
    /// registered under that id instead.
    pub fn decorate(&mut self, id: &str, definition: impl Into<Definition>, new_id: Option<&str>) -> Result<()> {
        let inner = match self.registry.get(id) {
            Some(inner) => inner.clone(),
            None => return Err(self.not_found(id)),
        };

        self.remove_definition(id);
        let inner_id = format!("{id}.inner");
        self.set(&inner_id, inner)?;
        self.registry.tag(&inner_id, Tag::from(DECORATED_TAG));

        debug!(id = %id, inner = %inner_id, "Decorated service");
        self.set(new_id.unwrap_or(id), definition)
    }

    /// Mutable access to a definition that has not been built yet.
    ///
    /// # Errors
    /// [`KhazinaError::Frozen`] once built, [`KhazinaError::NotFound`] if
    /// undefined.
    pub fn extend(&mut self, id: &str) -> Result<&mut Definition> {
        let resolved = self.registry.resolve_alias(id).to_string();
        if self.is_frozen(&resolved) {
            return Err(KhazinaError::frozen(resolved));
        }
        if !self.registry.contains(&resolved) {
            return Err(self.not_found(id));
        }
        self.registry
            .get_mut(&resolved)
            .ok_or_else(|| KhazinaError::not_found(id, None))
    }

    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.registry.get(id)
    }

    /// Drops a definition, its cached instance, the aliases pointing at it
    /// and its type-index entries.
    pub fn remove_definition(&mut self, id: &str) {
        self.registry.remove_definition(id);
        self.services.remove(id);
        self.privates.get_mut().shift_remove(id);
        self.pending.get_mut().shift_remove(id);
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

    /// `true` if some alias points at `id`.
    pub fn aliased(&self, id: &str) -> bool {
        self.registry.aliased(id)
    }

    /// Tags every id in `ids` with `tags` (see [`Tag::parse`]).
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

    /// Public ids carrying `tag` with their attributes, in tagging order.
    pub fn tagged_ids(&self, tag: &str) -> Vec<(String, Value)> {
        self.registry
            .tagged(tag)
            .into_iter()
            .filter(|(id, _)| self.registry.get(id).is_none_or(Definition::is_public))
            .map(|(id, attributes)| (id.to_string(), attributes.clone()))
            .collect()
    }

    /// Every service carrying `tag`, built, with its attributes.
    pub fn tagged(&self, tag: &str) -> Result<Vec<(Service, Value)>> {
        self.tagged_ids(tag)
            .into_iter()
            .map(|(id, attributes)| Ok((self.require(&id, false)?, attributes)))
            .collect()
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Argument>) {
        self.registry.set_parameter(name, value.into());
    }

    /// Evaluates a container parameter.
    pub fn parameter(&self, name: &str) -> Result<Resolved> {
        let argument = self.registry.parameter(name).ok_or_else(|| {
            KhazinaError::not_found(name, suggest(name, self.registry.parameters().keys().map(String::as_str)))
        })?;
        self.resolver.resolve_argument(&ValueBuilder::new(self), argument)
    }

    pub fn parameters(&self) -> &IndexMap<String, Argument> {
        self.registry.parameters()
    }

    /// Indexes `id` under `types` for type lookups and autowiring.
    pub fn autowire<I, S>(&mut self, id: &str, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resolver.autowire(id, types);
    }

    /// Stops `type_name` from being bound to parameters automatically.
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

    // ── Retrieval ──

    /// Returns the service for `id`, building it on first use.
    ///
    /// `id` may be a service id, an alias, a type name, `Type[]` or
    /// `Type[name]`. A leading `?` yields the `null` literal instead of
    /// failing when nothing matches.
    pub fn get(&self, id: &str) -> Result<Service> {
        Ok(self
            .get_with(id, InvalidBehavior::Exception)?
            .unwrap_or_else(|| Resolved::null().into_service()))
    }

    pub fn get_with(&self, id: &str, behavior: InvalidBehavior) -> Result<Option<Service>> {
        self.lookup(id, behavior, false)
    }

    /// Returns the service downcast to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        downcast(id, self.get(id)?)
    }

    /// `true` for a known definition, alias or type-index entry.
    pub fn has(&self, id: &str) -> bool {
        let (key, _) = split_nullable(id);
        self.services.contains(key) || self.registry.knows(self.resolver.types(), key)
    }

    /// Every defined id, in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.registry.keys().map(str::to_string).collect()
    }

    /// `true` once the service is built and cached in either tier.
    pub fn initialized(&self, id: &str) -> bool {
        let id = self.registry.resolve_alias(id);
        self.services.contains(id) || self.privates.lock().contains_key(id)
    }

    /// `true` once the service is built and cached in the public tier.
    pub fn shared(&self, id: &str) -> bool {
        self.services.contains(self.registry.resolve_alias(id))
    }

    /// Calls a factory with autowired parameters.
    pub fn call(&self, factory: &Factory, args: &Bindings) -> Result<Resolved> {
        self.resolver
            .resolve(&ValueBuilder::new(self), &Target::Factory(factory.clone()), args)
    }

    /// Builds a catalog class with autowired parameters, uncached.
    pub fn resolve_class(&self, class: &str, args: &Bindings) -> Result<Service> {
        self.resolver
            .resolve_class(&ValueBuilder::new(self), class, args)
            .map(Resolved::into_service)
    }

    // ── Removal ──

    /// Drops the alias and tag entries for `id`.
    pub fn remove(&mut self, id: &str) {
        self.registry.remove(id);
    }

    /// Clears cached services, tags and aliases.
    pub fn reset(&mut self) {
        self.services.clear();
        self.privates.get_mut().clear();
        self.pending.get_mut().clear();
        self.registry.reset();
        debug!("Container reset");
    }

    // ── Internal ──

    fn is_frozen(&self, id: &str) -> bool {
        self.services.contains(id) || self.privates.lock().contains_key(id)
    }

    fn lookup(&self, raw: &str, behavior: InvalidBehavior, internal: bool) -> Result<Option<Service>> {
        let (key, nullable) = split_nullable(raw);
        let behavior = if nullable { InvalidBehavior::NullOnInvalid } else { behavior };

        match self.find(key, behavior, internal)? {
            Some(service) => Ok(Some(service)),
            None if behavior == InvalidBehavior::NullOnInvalid => {
                trace!(id = %key, "Nothing matched, yielding null");
                Ok(None)
            }
            None => Err(self.not_found(key)),
        }
    }

    fn require(&self, id: &str, internal: bool) -> Result<Service> {
        self.find(id, InvalidBehavior::Exception, internal)?
            .ok_or_else(|| self.not_found(id))
    }

    /// Alias, cache, definition, then type index fallback.
    fn find(&self, key: &str, behavior: InvalidBehavior, internal: bool) -> Result<Option<Service>> {
        let id = self.registry.resolve_alias(key);

        if let Some(service) = self.cached(id, internal) {
            return Ok(Some(service));
        }

        if let Some(definition) = self.registry.definitions().get(id) {
            if !definition.is_public() && !internal {
                return match behavior {
                    InvalidBehavior::NullOnInvalid => Ok(None),
                    _ => Err(KhazinaError::NotFound(NotFoundError {
                        requested: id.to_string(),
                        required_by: None,
                        suggestion: None,
                        private: true,
                    })),
                };
            }
            return self.create(id, definition, behavior).map(Some);
        }

        self.fallback(id, behavior, internal)
    }

    fn cached(&self, id: &str, internal: bool) -> Option<Service> {
        if let Some(service) = self.services.get(id) {
            return Some(service);
        }
        if internal {
            return self.privates.lock().get(id).cloned();
        }
        None
    }

    fn fallback(&self, key: &str, behavior: InvalidBehavior, internal: bool) -> Result<Option<Service>> {
        let types = self.resolver.types();
        match LookupKey::parse(key) {
            LookupKey::Id(type_name) => match types.get(type_name) {
                [] => Ok(self.autowire_class(type_name, behavior)),
                [id] => self.find(id, behavior, internal),
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
                let services = ids
                    .iter()
                    .map(|id| self.require(id, internal))
                    .collect::<Result<Vec<Service>>>()?;
                Ok(Some(Arc::new(services)))
            }
            LookupKey::Named { type_name, name } => {
                if types.get(type_name).iter().any(|id| id == name) {
                    self.find(name, behavior, internal)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Builds an undefined catalog class, cached under its type name.
    ///
    /// Failures are reported as "not found" rather than propagated.
    fn autowire_class(&self, type_name: &str, behavior: InvalidBehavior) -> Option<Service> {
        self.resolver.catalog().class(type_name)?;

        match self.create(type_name, &Definition::class(type_name), behavior) {
            Ok(service) => Some(service),
            Err(err) => {
                debug!(class = %type_name, error = %err, "Autowiring fallback failed");
                None
            }
        }
    }

    fn create(&self, id: &str, definition: &Definition, behavior: InvalidBehavior) -> Result<Service> {
        if definition.is_shared()
            && let Some(service) = self.take_pending(id, definition.is_public(), behavior)
        {
            return Ok(service);
        }

        self.enter(id)?;
        let built = self.build(id, definition);
        self.leave(id);
        let service = built?;

        if !definition.is_shared() {
            return Ok(service);
        }

        Ok(match behavior {
            InvalidBehavior::IgnoreFreezing => service,
            InvalidBehavior::IgnoreInitializing => {
                self.pending.lock().insert(id.to_string(), service.clone());
                service
            }
            _ => self.store(id, definition.is_public(), service),
        })
    }

    fn take_pending(&self, id: &str, public: bool, behavior: InvalidBehavior) -> Option<Service> {
        let service = match behavior {
            InvalidBehavior::IgnoreFreezing | InvalidBehavior::IgnoreInitializing => {
                return self.pending.lock().get(id).cloned();
            }
            _ => self.pending.lock().shift_remove(id)?,
        };
        trace!(id = %id, "Promoting pending service");
        Some(self.store(id, public, service))
    }

    fn store(&self, id: &str, public: bool, service: Service) -> Service {
        debug!(id = %id, public, "Service initialized");
        if public {
            self.services.get_or_insert(id, service)
        } else {
            self.privates
                .lock()
                .entry(id.to_string())
                .or_insert(service)
                .clone()
        }
    }

    fn enter(&self, id: &str) -> Result<()> {
        let mut loading = self.loading.lock();
        let path = loading.entry(thread::current().id()).or_default();
        if let Some(position) = path.iter().position(|entry| entry == id) {
            let mut chain = path[position..].to_vec();
            chain.push(id.to_string());
            return Err(KhazinaError::CircularReference(CircularReferenceError { chain }));
        }
        path.push(id.to_string());
        Ok(())
    }

    fn leave(&self, id: &str) {
        let mut loading = self.loading.lock();
        let current = thread::current().id();
        if let Some(path) = loading.get_mut(&current) {
            if let Some(position) = path.iter().rposition(|entry| entry == id) {
                path.remove(position);
            }
            if path.is_empty() {
                loading.remove(&current);
            }
        }
    }

    fn build(&self, id: &str, definition: &Definition) -> Result<Service> {
        trace!(id = %id, "Building service");
        self.resolver
            .resolve(&ValueBuilder::new(self), definition.target(), definition.arguments())
            .map(Resolved::into_service)
            .map_err(|err| err.required_by(id))
    }

    fn not_found(&self, id: &str) -> KhazinaError {
        let known = self
            .registry
            .keys()
            .chain(self.registry.aliases().keys().map(String::as_str));
        KhazinaError::not_found(id, suggest(id, known))
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.registry.len())
            .field("aliases", &self.registry.aliases().len())
            .field("services", &self.services.len())
            .field("privates", &self.privates.lock().len())
            .finish()
    }
}

impl ProviderRegistry for Container {
    fn set(&mut self, id: &str, definition: Definition) -> Result<()> {
        Container::set(self, id, definition)
    }

    fn alias(&mut self, id: &str, target: &str) -> Result<()> {
        Container::alias(self, id, target)
    }

    fn tag(&mut self, id: &str, tags: Value) {
        Container::tag(self, [id], tags);
    }

    fn set_parameter(&mut self, name: &str, value: Argument) {
        Container::set_parameter(self, name, value);
    }

    fn autowire(&mut self, id: &str, types: &[String]) {
        Container::autowire(self, id, types);
    }

    fn exclude(&mut self, type_name: &str) {
        Container::exclude(self, type_name);
    }

    fn providers(&mut self) -> &mut Providers {
        &mut self.providers
    }
}

/// Builds live values: the runtime side of the [`Resolver`].
pub struct ValueBuilder<'a> {
    container: &'a Container,
}

impl<'a> ValueBuilder<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }
}

impl Builder for ValueBuilder<'_> {
    type Output = Resolved;

    fn literal(&self, value: &Value) -> Resolved {
        Resolved::Value(value.clone())
    }

    fn list(&self, items: Vec<Resolved>) -> Resolved {
        Resolved::List(items)
    }

    fn service(&self, id: &str, nullable: bool) -> Result<Option<Resolved>> {
        let behavior = if nullable {
            InvalidBehavior::NullOnInvalid
        } else {
            InvalidBehavior::Exception
        };
        Ok(self
            .container
            .lookup(id, behavior, true)?
            .map(Resolved::Service))
    }

    fn instantiate(&self, class: &Class, args: Vec<(String, Resolved)>) -> Result<Resolved> {
        let mut args = Arguments::new(class.descriptor().name(), args);
        class.construct(&mut args).map(Resolved::Service)
    }

    fn invoke(&self, factory: &Factory, args: Vec<(String, Resolved)>) -> Result<Resolved> {
        let mut args = Arguments::new(factory.name(), args);
        factory.call(&mut args)
    }

    fn instance(&self, instance: &Service) -> Result<Resolved> {
        Ok(Resolved::Service(instance.clone()))
    }
}
