//! Definition registry: definitions, aliases, tags and parameters.
//!
//! Shared by the runtime [`Container`](crate::container::Container) and
//! the [`ContainerBuilder`](crate::builder::ContainerBuilder). It holds
//! only declarations; built instances live in the containers' caches.

use indexmap::IndexMap;
use khazina_support::rendering::suggest;
use serde_json::Value;
use tracing::{debug, trace};

use crate::definition::{Argument, Definition, Target};
use crate::error::{KhazinaError, Result};
use crate::key::LookupKey;
use crate::resolver::{Resolver, TypeIndex};

/// A tag with its attributes.
///
/// Bare names default to the attribute `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attributes: Value,
}

impl Tag {
    pub fn new(name: impl Into<String>, attributes: Value) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    /// Reads tags from configuration: an object of `name => attributes`,
    /// an array of bare names, or a single bare name.
    ///
    /// ```
    /// use khazina_container::registry::Tag;
    /// use serde_json::json;
    ///
    /// let tags = Tag::parse(json!({"cli.command": {"name": "build"}}));
    /// assert_eq!(tags, vec![Tag::new("cli.command", json!({"name": "build"}))]);
    ///
    /// let tags = Tag::parse(json!(["listener"]));
    /// assert_eq!(tags, vec![Tag::new("listener", json!(true))]);
    /// ```
    pub fn parse(value: Value) -> Vec<Tag> {
        match value {
            Value::Object(map) => map.into_iter().map(|(name, attrs)| Tag::new(name, attrs)).collect(),
            Value::Array(items) => items.into_iter().flat_map(Tag::parse).collect(),
            Value::String(name) => vec![Tag::from(name)],
            _ => Vec::new(),
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::new(name, Value::Bool(true))
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::new(name, Value::Bool(true))
    }
}

impl<S: Into<String>> From<(S, Value)> for Tag {
    fn from((name, attributes): (S, Value)) -> Self {
        Tag::new(name, attributes)
    }
}

/// Stores all service declarations of a container.
#[derive(Debug, Default, Clone)]
pub(crate) struct Registry {
    definitions: IndexMap<String, Definition>,
    /// alias => service id
    aliases: IndexMap<String, String>,
    /// service id => tag name => attributes
    tags: IndexMap<String, IndexMap<String, Value>>,
    parameters: IndexMap<String, Argument>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a definition, dropping any alias of the same name.
    pub fn insert(&mut self, id: &str, definition: Definition) -> Option<Definition> {
        self.aliases.shift_remove(id);
        debug!(
            id = %id,
            public = definition.is_public(),
            shared = definition.is_shared(),
            "Registered definition"
        );
        self.definitions.insert(id.to_string(), definition)
    }

    /// Normalises and stores a definition.
    ///
    /// A reference target is replaced by a copy of the referenced
    /// definition. The class entry of a typed definition is registered in
    /// the catalog, the id is re-indexed under its types, and the
    /// definition's tags are applied.
    pub fn define(&mut self, resolver: &mut Resolver, id: &str, mut definition: Definition) -> Result<()> {
        if let Target::Reference(target) = definition.target() {
            let target = target.clone();
            definition = match self.get(&target) {
                Some(referenced) => referenced.clone(),
                None => {
                    let suggestion = suggest(&target, self.keys());
                    return Err(KhazinaError::not_found(target, suggestion));
                }
            };
        }

        if let Some(entry) = definition.class_entry() {
            resolver.catalog_mut().register_entry(entry);
        }

        resolver.remove(id);
        if definition.is_typed() {
            let mut types = definition.declared_types().to_vec();
            if types.is_empty() {
                types = resolver.target_types(definition.target());
            }
            resolver.autowire(id, &types);
        }

        for (name, attributes) in definition.tags() {
            self.tag(id, Tag::new(name.clone(), attributes.clone()));
        }

        self.insert(id, definition);
        Ok(())
    }

    /// `true` when `key` names a definition, an alias or a type-index entry.
    pub fn knows(&self, types: &TypeIndex, key: &str) -> bool {
        if self.contains(key) {
            return true;
        }
        match LookupKey::parse(key) {
            LookupKey::Id(type_name) | LookupKey::AllOf(type_name) => types.contains(type_name),
            LookupKey::Named { type_name, name } => types.get(type_name).iter().any(|id| id == name),
        }
    }

    /// Looks up a definition by id, following aliases.
    pub fn get(&self, id: &str) -> Option<&Definition> {
        self.definitions.get(self.resolve_alias(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Definition> {
        let id = self.resolve_alias(id).to_string();
        self.definitions.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(self.resolve_alias(id))
    }

    /// Removes a definition and every alias and tag pointing at it.
    pub fn remove_definition(&mut self, id: &str) -> Option<Definition> {
        let removed = self.definitions.shift_remove(id);
        self.aliases.retain(|_, target| target != id);
        self.tags.shift_remove(id);
        if removed.is_some() {
            debug!(id = %id, "Removed definition");
        }
        removed
    }

    pub fn definitions(&self) -> &IndexMap<String, Definition> {
        &self.definitions
    }

    /// Every defined id, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    // ── Aliases ──

    /// Registers an alias: resolving `from` will resolve `to` instead.
    ///
    /// Chains collapse on insert, so lookups never walk more than one hop:
    /// aliases pointing at `from` are retargeted as well.
    pub fn register_alias(&mut self, from: &str, to: &str) {
        let target = self.aliases.get(to).cloned().unwrap_or_else(|| to.to_string());
        for existing in self.aliases.values_mut() {
            if existing == from {
                existing.clone_from(&target);
            }
        }
        debug!(from = %from, to = %target, "Registered alias");
        self.aliases.insert(from.to_string(), target);
    }

    /// Follows an alias, if any.
    pub fn resolve_alias<'a>(&'a self, id: &'a str) -> &'a str {
        match self.aliases.get(id) {
            Some(target) => {
                trace!(from = %id, to = %target, "Following alias");
                target
            }
            None => id,
        }
    }

    /// `true` if some alias points at `id`.
    pub fn aliased(&self, id: &str) -> bool {
        self.aliases.values().any(|target| target == id)
    }

    pub fn aliases(&self) -> &IndexMap<String, String> {
        &self.aliases
    }

    // ── Tags ──

    pub fn tag(&mut self, id: &str, tag: Tag) {
        trace!(id = %id, tag = %tag.name, "Tagged service");
        self.tags
            .entry(id.to_string())
            .or_default()
            .insert(tag.name, tag.attributes);
    }

    /// Every `(id, attributes)` carrying `tag`, in tagging order.
    pub fn tagged(&self, tag: &str) -> Vec<(&str, &Value)> {
        self.tags
            .iter()
            .filter_map(|(id, tags)| tags.get(tag).map(|attrs| (id.as_str(), attrs)))
            .collect()
    }

    pub fn tags(&self) -> &IndexMap<String, IndexMap<String, Value>> {
        &self.tags
    }

    // ── Parameters ──

    pub fn set_parameter(&mut self, name: &str, value: Argument) {
        self.parameters.insert(name.to_string(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<&Argument> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &IndexMap<String, Argument> {
        &self.parameters
    }

    // ── Removal ──

    /// Drops the alias and tag entries for `id`.
    pub fn remove(&mut self, id: &str) {
        self.aliases.shift_remove(id);
        self.tags.shift_remove(id);
    }

    /// Clears tags and aliases.
    pub fn reset(&mut self) {
        self.tags.clear();
        self.aliases.clear();
    }

    /// Returns the number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_and_get() {
        let mut reg = Registry::new();
        reg.insert("db", Definition::class("app::Database"));
        assert!(reg.get("db").is_some());
        assert!(reg.contains("db"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn alias_resolves() {
        let mut reg = Registry::new();
        reg.insert("db", Definition::class("app::Database"));
        reg.register_alias("database", "db");
        assert!(reg.get("database").is_some());
        assert!(reg.aliased("db"));
    }

    #[test]
    fn alias_chain_collapses() {
        let mut reg = Registry::new();
        reg.insert("db", Definition::class("app::Database"));
        reg.register_alias("database", "db");
        reg.register_alias("storage", "database");
        assert_eq!(reg.aliases()["storage"], "db");
    }

    #[test]
    fn aliasing_an_alias_target_retargets_its_aliases() {
        let mut reg = Registry::new();
        reg.insert("q", Definition::value(json!(1)));
        reg.insert("r", Definition::value(json!(2)));
        reg.register_alias("p", "q");
        reg.register_alias("q", "r");

        assert_eq!(reg.aliases()["p"], "r");
        assert_eq!(reg.resolve_alias("p"), "r");
        assert!(!reg.aliases().values().any(|target| reg.aliases().contains_key(target)));
    }

    #[test]
    fn insert_drops_same_named_alias() {
        let mut reg = Registry::new();
        reg.insert("db", Definition::class("app::Database"));
        reg.register_alias("database", "db");
        reg.insert("database", Definition::value(json!("sqlite")));
        assert!(!reg.aliases().contains_key("database"));
    }

    #[test]
    fn remove_definition_drops_aliases_and_tags() {
        let mut reg = Registry::new();
        reg.insert("db", Definition::class("app::Database"));
        reg.register_alias("database", "db");
        reg.tag("db", Tag::from("storage"));

        assert!(reg.remove_definition("db").is_some());
        assert!(!reg.aliases().contains_key("database"));
        assert!(reg.tagged("storage").is_empty());
    }

    #[test]
    fn tagged_in_order() {
        let mut reg = Registry::new();
        reg.tag("b", Tag::from("listener"));
        reg.tag("a", Tag::new("listener", json!({"priority": 10})));
        reg.tag("a", Tag::from("other"));

        let tagged = reg.tagged("listener");
        assert_eq!(tagged.len(), 2);
        assert_eq!(tagged[0], ("b", &json!(true)));
        assert_eq!(tagged[1], ("a", &json!({"priority": 10})));
    }

    #[test]
    fn reset_clears_aliases_and_tags() {
        let mut reg = Registry::new();
        reg.insert("db", Definition::class("app::Database"));
        reg.register_alias("database", "db");
        reg.tag("db", Tag::from("storage"));
        reg.reset();
        assert!(reg.aliases().is_empty());
        assert!(reg.tags().is_empty());
        assert!(reg.contains("db"));
    }
}
