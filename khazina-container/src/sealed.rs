//! The sealed container: the runtime shape of a compiled unit.
//!
//! No definitions, no resolver, no catalog lookups by name: just flat
//! tables and one accessor per service. Generated code fills the tables
//! through [`Tables`] and calls back into [`SealedContainer::cached`] /
//! [`SealedContainer::share`] from its accessors. [`SealedContainer::load`]
//! does the same in-process by interpreting the unit's expressions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use khazina_support::rendering::suggest;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, trace};

use crate::cache::ServiceCache;
use crate::container::InvalidBehavior;
use crate::descriptor::{Injectable, TypeCatalog};
use crate::error::{AmbiguousTypeError, KhazinaError, Result};
use crate::expr::{CompiledUnit, Expr, ServiceMethod, Tier};
use crate::key::{LookupKey, split_nullable};
use crate::value::{Arguments, Resolved, Service, downcast};

/// A compiled service accessor.
pub type Accessor = Arc<dyn Fn(&SealedContainer) -> Result<Service> + Send + Sync>;

/// The flat tables a sealed container looks services up in.
#[derive(Default)]
pub struct Tables {
    /// accessor name => accessor
    accessors: IndexMap<String, Accessor>,
    /// public id => accessor name
    methods_map: IndexMap<String, String>,
    aliases: IndexMap<String, String>,
    types: IndexMap<String, Vec<String>>,
    /// tag => id => attributes
    tags: IndexMap<String, IndexMap<String, Value>>,
    parameters: IndexMap<String, Resolved>,
}

impl Tables {
    pub fn accessor(
        mut self,
        method: &str,
        accessor: impl Fn(&SealedContainer) -> Result<Service> + Send + Sync + 'static,
    ) -> Self {
        self.accessors.insert(method.to_string(), Arc::new(accessor));
        self
    }

    /// Makes `id` publicly resolvable through `method`.
    pub fn expose(mut self, id: &str, method: &str) -> Self {
        self.methods_map.insert(id.to_string(), method.to_string());
        self
    }

    pub fn alias(mut self, alias: &str, id: &str) -> Self {
        self.aliases.insert(alias.to_string(), id.to_string());
        self
    }

    pub fn types(mut self, type_name: &str, ids: &[&str]) -> Self {
        self.types
            .insert(type_name.to_string(), ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn tag(mut self, tag: &str, id: &str, attributes: Value) -> Self {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(id.to_string(), attributes);
        self
    }

    pub fn parameter(mut self, name: &str, value: Value) -> Self {
        self.parameters.insert(name.to_string(), Resolved::Value(value));
        self
    }

    fn merge(&mut self, other: Tables) {
        self.accessors.extend(other.accessors);
        self.methods_map.extend(other.methods_map);
        self.aliases.extend(other.aliases);
        self.types.extend(other.types);
        for (tag, services) in other.tags {
            self.tags.entry(tag).or_default().extend(services);
        }
        self.parameters.extend(other.parameters);
    }
}

impl fmt::Debug for Tables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tables")
            .field("accessors", &self.accessors.len())
            .field("methods_map", &self.methods_map)
            .field("aliases", &self.aliases)
            .field("types", &self.types)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A container whose wiring was decided at compile time.
///
/// Resolution takes `&self` and the container is `Send + Sync`. Locks
/// are released before any accessor runs.
#[derive(Default)]
pub struct SealedContainer {
    services: ServiceCache,
    privates: Mutex<IndexMap<String, Service>>,
    tables: RwLock<Tables>,
}

impl SealedContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `cache` as the public service tier.
    pub fn with_cache(cache: ServiceCache) -> Self {
        Self {
            services: cache,
            ..Self::default()
        }
    }

    /// Adds `tables` to the installed ones; later entries win.
    pub fn install(&self, tables: Tables) {
        debug!(
            accessors = tables.accessors.len(),
            public = tables.methods_map.len(),
            "Installing sealed tables"
        );
        self.tables.write().merge(tables);
    }

    /// Builds a sealed container from a unit in-process, resolving class
    /// and factory names through `catalog`.
    ///
    /// # Errors
    /// [`KhazinaError::NotFound`] when the unit names a class or factory
    /// the catalog does not have, or whatever evaluating a computed
    /// parameter returns.
    pub fn load(unit: &CompiledUnit, catalog: TypeCatalog) -> Result<Self> {
        for method in &unit.methods {
            check(&catalog, &method.body).map_err(|err| err.required_by(&method.id))?;
        }

        let catalog = Arc::new(catalog);
        let mut tables = Tables::default();
        for method in &unit.methods {
            let name = method.name.clone();
            let method = Arc::new(method.clone());
            let catalog = Arc::clone(&catalog);
            tables = tables.accessor(&name, move |container| interpret(container, &catalog, &method));
        }
        for (id, method) in &unit.methods_map {
            tables = tables.expose(id, method);
        }
        for (alias, id) in &unit.aliases {
            tables = tables.alias(alias, id);
        }
        for (type_name, ids) in &unit.types {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            tables = tables.types(type_name, &ids);
        }
        for (tag, services) in &unit.tags {
            for (id, attributes) in services {
                tables = tables.tag(tag, id, attributes.clone());
            }
        }
        for (name, value) in &unit.parameters {
            tables = tables.parameter(name, value.clone());
        }

        let container = Self::new();
        container.install(tables);
        for (name, expr) in &unit.dynamic_parameters {
            check(&catalog, expr)?;
            let value = evaluate(&container, &catalog, expr)?;
            container.set_parameter(name, value);
        }

        debug!(container = %unit.name, methods = unit.methods.len(), "Loaded compiled unit");
        Ok(container)
    }

    // ── Retrieval ──

    /// Returns the service for `id`: an id, an alias, `Type`, `Type[]` or
    /// `Type[name]`. A leading `?` yields the `null` literal instead of
    /// failing when nothing matches.
    pub fn get(&self, id: &str) -> Result<Service> {
        Ok(self
            .get_with(id, InvalidBehavior::Exception)?
            .unwrap_or_else(|| Resolved::null().into_service()))
    }

    pub fn get_with(&self, id: &str, behavior: InvalidBehavior) -> Result<Option<Service>> {
        let (key, nullable) = split_nullable(id);
        match self.find(key)? {
            Some(service) => Ok(Some(service)),
            None if nullable || behavior == InvalidBehavior::NullOnInvalid => Ok(None),
            None => Err(self.not_found(key)),
        }
    }

    pub fn get_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        downcast(id, self.get(id)?)
    }

    pub fn has(&self, id: &str) -> bool {
        let (key, _) = split_nullable(id);
        if self.services.contains(key) {
            return true;
        }
        let tables = self.tables.read();
        if tables.methods_map.contains_key(key) || tables.aliases.contains_key(key) {
            return true;
        }
        match LookupKey::parse(key) {
            LookupKey::Id(type_name) | LookupKey::AllOf(type_name) => tables.types.contains_key(type_name),
            LookupKey::Named { type_name, name } => tables
                .types
                .get(type_name)
                .is_some_and(|ids| ids.iter().any(|id| id == name)),
        }
    }

    /// Every public id.
    pub fn keys(&self) -> Vec<String> {
        self.tables.read().methods_map.keys().cloned().collect()
    }

    pub fn initialized(&self, id: &str) -> bool {
        let id = self.resolve_alias(id);
        self.services.contains(&id) || self.privates.lock().contains_key(&id)
    }

    /// Runs the accessor `method`, public or not.
    pub fn service(&self, method: &str) -> Result<Service> {
        let accessor = self.tables.read().accessors.get(method).cloned();
        match accessor {
            Some(accessor) => accessor(self),
            None => Err(KhazinaError::Misconfiguration(format!(
                "sealed container has no accessor \"{method}\""
            ))),
        }
    }

    /// Ids carrying `tag` with their attributes.
    pub fn tagged(&self, tag: &str) -> Vec<(String, Value)> {
        self.tables
            .read()
            .tags
            .get(tag)
            .map(|services| {
                services
                    .iter()
                    .map(|(id, attributes)| (id.clone(), attributes.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attributes of `tag` on `id`, if it carries it.
    pub fn tagged_service(&self, tag: &str, id: &str) -> Option<Value> {
        self.tables.read().tags.get(tag)?.get(id).cloned()
    }

    pub fn parameter(&self, name: &str) -> Result<Resolved> {
        let tables = self.tables.read();
        tables.parameters.get(name).cloned().ok_or_else(|| {
            KhazinaError::not_found(name, suggest(name, tables.parameters.keys().map(String::as_str)))
        })
    }

    pub fn set_parameter(&self, name: &str, value: Resolved) {
        self.tables.write().parameters.insert(name.to_string(), value);
    }

    /// Drops every built service.
    pub fn reset(&self) {
        self.services.clear();
        self.privates.lock().clear();
        debug!("Sealed container reset");
    }

    // ── Accessor support ──

    pub fn cached(&self, id: &str) -> Option<Service> {
        self.services.get(id)
    }

    pub fn cached_private(&self, id: &str) -> Option<Service> {
        self.privates.lock().get(id).cloned()
    }

    /// Caches a public service; the first one stored wins.
    pub fn share(&self, id: &str, service: Service) -> Service {
        trace!(id = %id, "Service initialized");
        self.services.get_or_insert(id, service)
    }

    pub fn share_private(&self, id: &str, service: Service) -> Service {
        trace!(id = %id, "Private service initialized");
        self.privates
            .lock()
            .entry(id.to_string())
            .or_insert(service)
            .clone()
    }

    // ── Internal ──

    fn resolve_alias(&self, id: &str) -> String {
        self.tables
            .read()
            .aliases
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn find(&self, key: &str) -> Result<Option<Service>> {
        let id = self.resolve_alias(key);
        if let Some(service) = self.services.get(&id) {
            return Ok(Some(service));
        }

        let method = self.tables.read().methods_map.get(&id).cloned();
        if let Some(method) = method {
            return self.service(&method).map(Some);
        }

        self.fallback(&id)
    }

    fn fallback(&self, key: &str) -> Result<Option<Service>> {
        match LookupKey::parse(key) {
            LookupKey::Id(type_name) => {
                let ids = self.ids_of(type_name);
                match ids.as_slice() {
                    [] => Ok(None),
                    [id] => {
                        self.tables.write().aliases.insert(type_name.to_string(), id.clone());
                        self.find(id)
                    }
                    many => Err(KhazinaError::AmbiguousType(AmbiguousTypeError {
                        type_name: type_name.to_string(),
                        candidates: many.to_vec(),
                    })),
                }
            }
            LookupKey::AllOf(type_name) => {
                let ids = self.ids_of(type_name);
                if ids.is_empty() {
                    return Ok(None);
                }
                let services = ids
                    .iter()
                    .map(|id| self.find(id)?.ok_or_else(|| self.not_found(id)))
                    .collect::<Result<Vec<Service>>>()?;
                Ok(Some(self.services.get_or_insert(key, Arc::new(services))))
            }
            LookupKey::Named { type_name, name } => {
                if !self.ids_of(type_name).iter().any(|id| id == name) {
                    return Ok(None);
                }
                self.tables.write().aliases.insert(key.to_string(), name.to_string());
                self.find(name)
            }
        }
    }

    fn ids_of(&self, type_name: &str) -> Vec<String> {
        self.tables.read().types.get(type_name).cloned().unwrap_or_default()
    }

    fn not_found(&self, id: &str) -> KhazinaError {
        let tables = self.tables.read();
        let known = tables
            .methods_map
            .keys()
            .chain(tables.aliases.keys())
            .map(String::as_str);
        KhazinaError::not_found(id, suggest(id, known))
    }
}

impl AsRef<SealedContainer> for SealedContainer {
    fn as_ref(&self) -> &SealedContainer {
        self
    }
}

impl fmt::Debug for SealedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedContainer")
            .field("tables", &*self.tables.read())
            .field("services", &self.services.len())
            .field("privates", &self.privates.lock().len())
            .finish()
    }
}

/// Parses a literal printed into generated code.
pub fn literal(json: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|err| KhazinaError::ConstructionFailed {
        id: "literal".to_string(),
        source: Box::new(err),
    })
}

/// Constructs `T` from bound arguments, for generated accessors.
pub fn construct<T: Injectable>(owner: &str, args: Vec<(String, Resolved)>) -> Result<Resolved> {
    let mut args = Arguments::new(owner, args);
    Ok(Resolved::Service(Arc::new(T::construct(&mut args)?)))
}

/// Every class and factory `expr` names must be in the catalog.
fn check(catalog: &TypeCatalog, expr: &Expr) -> Result<()> {
    match expr {
        Expr::Literal { .. } | Expr::Service { .. } => Ok(()),
        Expr::List { items } => items.iter().try_for_each(|item| check(catalog, item)),
        Expr::New { class, args } => {
            if catalog.class(class).is_none() {
                return Err(KhazinaError::not_found(class, suggest(class, catalog.class_names())));
            }
            args.values().try_for_each(|arg| check(catalog, arg))
        }
        Expr::Call { path, args } => {
            if catalog.function(path).is_none() {
                return Err(KhazinaError::not_found(path, None));
            }
            args.values().try_for_each(|arg| check(catalog, arg))
        }
    }
}

fn interpret(container: &SealedContainer, catalog: &TypeCatalog, method: &ServiceMethod) -> Result<Service> {
    match method.tier {
        Some(Tier::Services) => {
            if let Some(service) = container.cached(&method.id) {
                return Ok(service);
            }
            let service = evaluate(container, catalog, &method.body)?.into_service();
            Ok(container.share(&method.id, service))
        }
        Some(Tier::Privates) => {
            if let Some(service) = container.cached_private(&method.id) {
                return Ok(service);
            }
            let service = evaluate(container, catalog, &method.body)?.into_service();
            Ok(container.share_private(&method.id, service))
        }
        None => Ok(evaluate(container, catalog, &method.body)?.into_service()),
    }
}

fn evaluate(container: &SealedContainer, catalog: &TypeCatalog, expr: &Expr) -> Result<Resolved> {
    match expr {
        Expr::Literal { value } => Ok(Resolved::Value(value.clone())),
        Expr::List { items } => items
            .iter()
            .map(|item| evaluate(container, catalog, item))
            .collect::<Result<Vec<_>>>()
            .map(Resolved::List),
        Expr::New { class, args } => {
            let target = catalog
                .class(class)
                .ok_or_else(|| KhazinaError::not_found(class, None))?;
            let mut args = Arguments::new(class, evaluate_args(container, catalog, args)?);
            target.construct(&mut args).map(Resolved::Service)
        }
        Expr::Call { path, args } => {
            let factory = catalog
                .function(path)
                .ok_or_else(|| KhazinaError::not_found(path, None))?;
            let mut args = Arguments::new(path, evaluate_args(container, catalog, args)?);
            factory.call(&mut args)
        }
        Expr::Service { method, .. } => container.service(method).map(Resolved::Service),
    }
}

fn evaluate_args(
    container: &SealedContainer,
    catalog: &TypeCatalog,
    args: &IndexMap<String, Expr>,
) -> Result<Vec<(String, Resolved)>> {
    args.iter()
        .map(|(name, expr)| Ok((name.clone(), evaluate(container, catalog, expr)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get_logger(container: &SealedContainer) -> Result<Service> {
        if let Some(service) = container.cached("logger") {
            return Ok(service);
        }
        Ok(container.share("logger", Arc::new(json!("logger"))))
    }

    fn get_cache_a(container: &SealedContainer) -> Result<Service> {
        Ok(container.share("cache.a", Arc::new(json!("a"))))
    }

    fn get_cache_b(container: &SealedContainer) -> Result<Service> {
        Ok(container.share("cache.b", Arc::new(json!("b"))))
    }

    fn sealed() -> SealedContainer {
        let container = SealedContainer::new();
        container.install(
            Tables::default()
                .accessor("get_logger", get_logger)
                .accessor("get_cache_a", get_cache_a)
                .accessor("get_cache_b", get_cache_b)
                .expose("logger", "get_logger")
                .expose("cache.a", "get_cache_a")
                .expose("cache.b", "get_cache_b")
                .alias("log", "logger")
                .types("app::Log", &["logger"])
                .types("app::Cache", &["cache.a", "cache.b"])
                .tag("monolog.logger", "logger", json!({"channel": "app"}))
                .parameter("port", json!(8080)),
        );
        container
    }

    #[test]
    fn shared_accessor_builds_once() {
        let container = sealed();
        assert!(!container.initialized("logger"));
        let a = container.get("logger").unwrap();
        let b = container.get("log").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(container.initialized("log"));
    }

    #[test]
    fn single_implementer_by_type() {
        let container = sealed();
        let by_type = container.get("app::Log").unwrap();
        assert!(Arc::ptr_eq(&by_type, &container.get("logger").unwrap()));
    }

    #[test]
    fn ambiguous_type() {
        match sealed().get("app::Cache").unwrap_err() {
            KhazinaError::AmbiguousType(err) => assert_eq!(err.candidates, ["cache.a", "cache.b"]),
            other => panic!("Expected AmbiguousType, got: {other:?}"),
        }
    }

    #[test]
    fn all_implementers_are_cached_under_the_key() {
        let container = sealed();
        let all = container.get("app::Cache[]").unwrap();
        assert_eq!(all.clone().downcast::<Vec<Service>>().unwrap().len(), 2);
        assert!(Arc::ptr_eq(&all, &container.get("app::Cache[]").unwrap()));
    }

    #[test]
    fn named_implementer() {
        let container = sealed();
        let b = container.get_as::<Value>("app::Cache[cache.b]").unwrap();
        assert_eq!(*b, json!("b"));
        assert!(container.has("app::Cache[cache.b]"));
        assert!(!container.has("app::Cache[cache.c]"));
    }

    #[test]
    fn missing_id_suggests() {
        match sealed().get("loger").unwrap_err() {
            KhazinaError::NotFound(err) => assert_eq!(err.suggestion.as_deref(), Some("logger")),
            other => panic!("Expected NotFound, got: {other:?}"),
        }
        assert!(sealed().get("?loger").unwrap().downcast_ref::<Value>().unwrap().is_null());
    }

    #[test]
    fn tags_and_parameters() {
        let container = sealed();
        assert_eq!(container.tagged("monolog.logger"), vec![(
            "logger".to_string(),
            json!({"channel": "app"})
        )]);
        assert_eq!(
            container.tagged_service("monolog.logger", "logger"),
            Some(json!({"channel": "app"}))
        );
        assert_eq!(container.tagged_service("monolog.logger", "cache.a"), None);
        assert_eq!(container.parameter("port").unwrap().as_value(), Some(&json!(8080)));
        assert!(container.parameter("host").is_err());
    }

    #[test]
    fn reset_drops_built_services() {
        let container = sealed();
        container.get("logger").unwrap();
        container.reset();
        assert!(!container.initialized("logger"));
    }

    #[test]
    fn literal_parses_json() {
        assert_eq!(literal(r#"{"a": [1, 2]}"#).unwrap(), json!({"a": [1, 2]}));
        assert!(literal("{").is_err());
    }
}
