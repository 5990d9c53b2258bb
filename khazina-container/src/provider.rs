//! Service providers: modules of related registrations.
//!
//! A provider groups the definitions of one feature and registers them
//! into either container through [`ProviderRegistry`], so the same
//! provider works for the runtime [`Container`](crate::container::Container)
//! and the [`ContainerBuilder`](crate::builder::ContainerBuilder).
//!
//! # Examples
//! ```rust
//! use khazina_container::prelude::*;
//! use serde_json::{json, Value};
//!
//! struct MailProvider;
//!
//! impl ServiceProvider for MailProvider {
//!     fn id(&self) -> &str {
//!         "mail"
//!     }
//!
//!     fn register(&self, registry: &mut dyn ProviderRegistry, config: &Value) -> Result<()> {
//!         registry.set("mail.sender", Definition::value(config["sender"].clone()))
//!     }
//! }
//!
//! let mut container = Container::new();
//! container
//!     .register(MailProvider, &json!({"mail": {"sender": "ops@example.com"}}))
//!     .unwrap();
//! assert!(container.has("mail.sender"));
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use khazina_support::rendering::render_chain;
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

use crate::definition::{Argument, Definition};
use crate::error::{KhazinaError, Result};

/// A module that registers related services.
///
/// Split registrations by feature instead of one giant block:
///
/// ```rust,ignore
/// container.register(DatabaseProvider, &config)?;
/// container.register(MailProvider, &config)?;
/// ```
pub trait ServiceProvider: Send + Sync + 'static {
    /// Registers services. `config` is this provider's own section.
    fn register(&self, registry: &mut dyn ProviderRegistry, config: &Value) -> Result<()>;

    /// Key of this provider, also the key of its configuration section.
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Providers registered before this one, each with `config[dep.id()]`.
    fn dependencies(&self) -> Vec<Arc<dyn ServiceProvider>> {
        Vec::new()
    }

    /// Transforms the raw configuration section before `register`.
    fn configure(&self, config: Value) -> Result<Value> {
        Ok(config)
    }
}

/// Registration surface handed to providers.
pub trait ProviderRegistry {
    fn set(&mut self, id: &str, definition: Definition) -> Result<()>;

    fn alias(&mut self, id: &str, target: &str) -> Result<()>;

    /// Tags `id` with a tag set (see [`Tag::parse`](crate::registry::Tag::parse)).
    fn tag(&mut self, id: &str, tags: Value);

    fn set_parameter(&mut self, name: &str, value: Argument);

    fn autowire(&mut self, id: &str, types: &[String]);

    fn exclude(&mut self, type_name: &str);

    fn providers(&mut self) -> &mut Providers;
}

/// Providers registered on a container, plus the in-progress stack.
#[derive(Default)]
pub struct Providers {
    registered: IndexMap<String, Arc<dyn ServiceProvider>>,
    stack: Vec<String>,
}

impl Providers {
    pub fn get(&self, id: &str) -> Option<Arc<dyn ServiceProvider>> {
        self.registered.get(id).cloned()
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.registered.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.registered.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("registered", &self.registered.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registers `provider` and its dependencies, depth first.
///
/// A provider already registered is skipped; one that is still on the
/// registration stack is a dependency cycle.
///
/// # Errors
/// [`KhazinaError::Misconfiguration`] on a provider dependency cycle, or
/// whatever the provider's `configure`/`register` returns.
#[instrument(skip_all, fields(provider = %provider.id()))]
pub fn register(
    registry: &mut dyn ProviderRegistry,
    provider: Arc<dyn ServiceProvider>,
    config: &Value,
) -> Result<()> {
    let id = provider.id().to_string();
    let providers = registry.providers();

    if let Some(position) = providers.stack.iter().position(|entry| *entry == id) {
        let mut chain = providers.stack[position..].to_vec();
        chain.push(id);
        return Err(KhazinaError::Misconfiguration(format!(
            "service providers depend on each other: {}",
            render_chain(&chain)
        )));
    }

    if providers.contains(&id) {
        trace!("Provider already registered");
        return Ok(());
    }

    providers.stack.push(id.clone());
    let result = register_inner(registry, &id, provider, config);
    registry.providers().stack.pop();
    result
}

fn register_inner(
    registry: &mut dyn ProviderRegistry,
    id: &str,
    provider: Arc<dyn ServiceProvider>,
    config: &Value,
) -> Result<()> {
    for dependency in provider.dependencies() {
        let section = config
            .get(dependency.id())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        register(registry, dependency, &section)?;
    }

    registry
        .providers()
        .registered
        .insert(id.to_string(), provider.clone());

    let own = config.get(id).cloned().unwrap_or_else(|| config.clone());
    let own = provider.configure(own)?;
    provider.register(registry, &own)?;

    debug!(provider = %id, "Registered service provider");
    Ok(())
}
