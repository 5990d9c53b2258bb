//! The resolver: one parameter-binding algorithm, two output modes.
//!
//! [`Resolver`] decides *what* each parameter is bound to. A [`Builder`]
//! decides *how* that binding is materialised:
//!
//! ```text
//!                    ┌─ ValueBuilder      → live services   (Container)
//! Resolver::resolve ─┤
//!                    └─ ExpressionBuilder → expression tree (ContainerBuilder)
//! ```
//!
//! Because both modes run the same binding code, a compiled container wires
//! exactly what the runtime container would have wired.

use std::collections::HashSet;

use indexmap::IndexMap;
use khazina_support::rendering::suggest;
use serde_json::Value;
use tracing::trace;

use crate::definition::{Argument, Bindings, Target};
use crate::descriptor::{Class, Factory, Hint, Parameter, TypeCatalog};
use crate::error::{AmbiguousTypeError, KhazinaError, Result, UnresolvableError};
use crate::value::Service;

/// Strategy turning resolver decisions into output.
pub trait Builder {
    type Output;

    /// A literal folded into the output.
    fn literal(&self, value: &Value) -> Self::Output;

    /// An ordered sequence.
    fn list(&self, items: Vec<Self::Output>) -> Self::Output;

    /// A service by id or lookup key.
    ///
    /// Returns `Ok(None)` only when `nullable` is set and nothing matched.
    fn service(&self, id: &str, nullable: bool) -> Result<Option<Self::Output>>;

    /// Constructs a class from bound arguments.
    fn instantiate(&self, class: &Class, args: Vec<(String, Self::Output)>) -> Result<Self::Output>;

    /// Calls a factory with bound arguments.
    fn invoke(&self, factory: &Factory, args: Vec<(String, Self::Output)>) -> Result<Self::Output>;

    /// A prebuilt instance.
    fn instance(&self, instance: &Service) -> Result<Self::Output>;
}

/// Reverse lookup from type name to the ids implementing it.
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    types: IndexMap<String, Vec<String>>,
}

impl TypeIndex {
    pub fn add(&mut self, type_name: &str, id: &str) {
        let ids = self.types.entry(type_name.to_string()).or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }

    /// Ids registered for `type_name`, in registration order.
    pub fn get(&self, type_name: &str) -> &[String] {
        self.types.get(type_name).map(Vec::as_slice).unwrap_or_default()
    }

    #[inline]
    pub fn contains(&self, type_name: &str) -> bool {
        !self.get(type_name).is_empty()
    }

    /// Drops `id` from every type, and types left without ids.
    pub fn remove_id(&mut self, id: &str) {
        for ids in self.types.values_mut() {
            ids.retain(|existing| existing != id);
        }
        self.types.retain(|_, ids| !ids.is_empty());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.types.iter().map(|(ty, ids)| (ty.as_str(), ids.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Binds constructor and factory parameters.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    catalog: TypeCatalog,
    types: TypeIndex,
    excluded: HashSet<String>,
}

impl Resolver {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            types: TypeIndex::default(),
            excluded: HashSet::new(),
        }
    }

    #[inline]
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    #[inline]
    pub fn catalog_mut(&mut self) -> &mut TypeCatalog {
        &mut self.catalog
    }

    #[inline]
    pub fn types(&self) -> &TypeIndex {
        &self.types
    }

    /// Indexes `id` under each of `types`.
    pub fn autowire<I, S>(&mut self, id: &str, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for type_name in types {
            trace!(id = %id, type_name = %type_name.as_ref(), "Autowired type");
            self.types.add(type_name.as_ref(), id);
        }
    }

    /// Stops `type_name` from being bound automatically to parameters.
    ///
    /// The type index is untouched, so `get(type_name)` still works.
    pub fn exclude(&mut self, type_name: impl Into<String>) {
        self.excluded.insert(type_name.into());
    }

    #[inline]
    pub fn is_excluded(&self, type_name: &str) -> bool {
        self.excluded.contains(type_name)
    }

    /// Forgets `id` in the type index.
    pub fn remove(&mut self, id: &str) {
        self.types.remove_id(id);
    }

    /// Types a definition target satisfies, used for typed definitions.
    pub fn target_types(&self, target: &Target) -> Vec<String> {
        match target {
            Target::Class(name) => self
                .catalog
                .class(name)
                .map(|class| class.descriptor().types())
                .unwrap_or_else(|| vec![name.clone()]),
            Target::Factory(factory) => factory.return_types().to_vec(),
            Target::Value(_) | Target::Instance(_) | Target::Reference(_) => Vec::new(),
        }
    }

    /// Resolves any definition target.
    pub fn resolve<B: Builder>(&self, builder: &B, target: &Target, args: &Bindings) -> Result<B::Output> {
        match target {
            Target::Class(name) => self.resolve_class(builder, name, args),
            Target::Factory(factory) => {
                let bound = self.bind(builder, factory.name(), factory.parameters(), args)?;
                builder.invoke(factory, bound)
            }
            Target::Value(value) => Ok(builder.literal(value)),
            Target::Instance(instance) => builder.instance(instance),
            Target::Reference(id) => required(builder, id),
        }
    }

    /// Resolves a class by name through the type catalog.
    ///
    /// # Errors
    /// [`KhazinaError::NotFound`] when the catalog has no such class.
    pub fn resolve_class<B: Builder>(&self, builder: &B, name: &str, args: &Bindings) -> Result<B::Output> {
        let class = self.catalog.class(name).ok_or_else(|| {
            KhazinaError::not_found(name, suggest(name, self.catalog.class_names()))
        })?;

        let bound = self.bind(builder, name, class.descriptor().parameters(), args)?;
        builder.instantiate(class, bound)
    }

    /// Resolves one explicit argument.
    pub fn resolve_argument<B: Builder>(&self, builder: &B, argument: &Argument) -> Result<B::Output> {
        match argument {
            Argument::Value(value) => Ok(builder.literal(value)),
            Argument::Reference { id, nullable } => Ok(builder
                .service(id, *nullable)?
                .unwrap_or_else(|| builder.literal(&Value::Null))),
            Argument::Statement(statement) => self.resolve(builder, &statement.target, &statement.arguments),
            Argument::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.resolve_argument(builder, item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(builder.list(items))
            }
        }
    }

    fn bind<B: Builder>(
        &self,
        builder: &B,
        owner: &str,
        parameters: &[Parameter],
        args: &Bindings,
    ) -> Result<Vec<(String, B::Output)>> {
        parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| {
                let value = self.bind_parameter(builder, owner, index, parameter, args)?;
                Ok((parameter.name.clone(), value))
            })
            .collect()
    }

    /// Resolution order: explicit argument, inject binding, type index,
    /// default, null, empty collection.
    fn bind_parameter<B: Builder>(
        &self,
        builder: &B,
        owner: &str,
        index: usize,
        parameter: &Parameter,
        args: &Bindings,
    ) -> Result<B::Output> {
        if let Some(argument) = args.lookup(index, &parameter.name) {
            return self.resolve_argument(builder, argument);
        }

        let optional = parameter.nullable || parameter.default.is_some();

        if let Some(ref id) = parameter.inject
            && let Some(value) = builder.service(id, optional)?
        {
            return Ok(value);
        }

        if let Some(ref hint) = parameter.hint
            && !self.is_excluded(hint.type_name())
            && let Some(value) = self.autowire_parameter(builder, hint)?
        {
            trace!(owner = %owner, parameter = %parameter.name, "Autowired parameter");
            return Ok(value);
        }

        if let Some(ref default) = parameter.default {
            return Ok(builder.literal(default));
        }

        if parameter.nullable {
            return Ok(builder.literal(&Value::Null));
        }

        if let Some(Hint::Collection(_)) = parameter.hint {
            return Ok(builder.list(Vec::new()));
        }

        Err(KhazinaError::Unresolvable(UnresolvableError {
            owner: owner.to_string(),
            parameter: parameter.name.clone(),
            type_hint: parameter.hint.as_ref().map(|hint| hint.type_name().to_string()),
        }))
    }

    fn autowire_parameter<B: Builder>(&self, builder: &B, hint: &Hint) -> Result<Option<B::Output>> {
        match hint {
            Hint::Service(type_name) => match self.types.get(type_name) {
                [] => builder.service(type_name, true),
                [id] => builder.service(id, false),
                many => Err(KhazinaError::AmbiguousType(AmbiguousTypeError {
                    type_name: type_name.clone(),
                    candidates: many.to_vec(),
                })),
            },
            Hint::Collection(type_name) => {
                let ids = self.types.get(type_name);
                if ids.is_empty() {
                    return Ok(None);
                }
                let items = ids
                    .iter()
                    .map(|id| required(builder, id))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(builder.list(items)))
            }
        }
    }
}

/// A non-nullable service lookup.
fn required<B: Builder>(builder: &B, id: &str) -> Result<B::Output> {
    builder
        .service(id, false)?
        .ok_or_else(|| KhazinaError::not_found(id, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use serde_json::json;

    use crate::descriptor::{Injectable, TypeDescriptor};
    use crate::value::Arguments;

    /// Records bindings as text so tests can assert on the decision only.
    struct Recorder {
        services: HashMap<String, String>,
        requested: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn new(services: &[&str]) -> Self {
            Self {
                services: services.iter().map(|s| (s.to_string(), format!("@{s}"))).collect(),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl Builder for Recorder {
        type Output = String;

        fn literal(&self, value: &Value) -> String {
            value.to_string()
        }

        fn list(&self, items: Vec<String>) -> String {
            format!("[{}]", items.join(","))
        }

        fn service(&self, id: &str, nullable: bool) -> Result<Option<String>> {
            self.requested.borrow_mut().push(id.to_string());
            match self.services.get(id) {
                Some(found) => Ok(Some(found.clone())),
                None if nullable => Ok(None),
                None => Err(KhazinaError::not_found(id, None)),
            }
        }

        fn instantiate(&self, class: &Class, args: Vec<(String, String)>) -> Result<String> {
            let args: Vec<String> = args.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
            Ok(format!("new {}({})", class.descriptor().name(), args.join(", ")))
        }

        fn invoke(&self, factory: &Factory, args: Vec<(String, String)>) -> Result<String> {
            let args: Vec<String> = args.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
            Ok(format!("{}({})", factory.name(), args.join(", ")))
        }

        fn instance(&self, _: &Service) -> Result<String> {
            Ok("<instance>".into())
        }
    }

    struct Mailer;

    impl Injectable for Mailer {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::new("app::Mailer")
                .parameter(Parameter::typed("transport", "app::Transport"))
                .parameter(Parameter::value("sender").with_default("noreply"))
                .parameter(Parameter::typed("logger", "app::Logger").nullable())
        }

        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Mailer)
        }
    }

    fn resolver() -> Resolver {
        let mut catalog = TypeCatalog::new();
        catalog.add_class(Mailer::descriptor(), crate::descriptor::instantiate::<Mailer>);
        Resolver::new(catalog)
    }

    #[test]
    fn autowires_single_implementer() {
        let mut resolver = resolver();
        resolver.autowire("smtp", ["app::Transport"]);

        let out = resolver
            .resolve_class(&Recorder::new(&["smtp"]), "app::Mailer", &Bindings::default())
            .unwrap();
        assert_eq!(out, "new app::Mailer(transport=@smtp, sender=\"noreply\", logger=null)");
    }

    #[test]
    fn explicit_argument_wins() {
        let mut resolver = resolver();
        resolver.autowire("smtp", ["app::Transport"]);

        let mut args = Bindings::default();
        args.insert("transport", Argument::reference("sendmail"));
        args.insert("sender", Argument::value("ops"));

        let out = resolver
            .resolve_class(&Recorder::new(&["smtp", "sendmail"]), "app::Mailer", &args)
            .unwrap();
        assert!(out.contains("transport=@sendmail"));
        assert!(out.contains("sender=\"ops\""));
    }

    #[test]
    fn positional_argument_binds_by_index() {
        let resolver = resolver();
        let mut args = Bindings::default();
        args.push(Argument::value("inline"));

        let out = resolver
            .resolve_class(&Recorder::new(&[]), "app::Mailer", &args)
            .unwrap();
        assert!(out.contains("transport=\"inline\""));
    }

    #[test]
    fn ambiguous_implementers_fail() {
        let mut resolver = resolver();
        resolver.autowire("smtp", ["app::Transport"]);
        resolver.autowire("sendmail", ["app::Transport"]);

        let err = resolver
            .resolve_class(&Recorder::new(&["smtp", "sendmail"]), "app::Mailer", &Bindings::default())
            .unwrap_err();
        match err {
            KhazinaError::AmbiguousType(e) => assert_eq!(e.candidates.len(), 2),
            other => panic!("Expected AmbiguousType, got: {other:?}"),
        }
    }

    #[test]
    fn excluded_type_is_not_autowired() {
        let mut resolver = resolver();
        resolver.autowire("smtp", ["app::Transport"]);
        resolver.exclude("app::Transport");

        let err = resolver
            .resolve_class(&Recorder::new(&["smtp"]), "app::Mailer", &Bindings::default())
            .unwrap_err();
        assert!(matches!(err, KhazinaError::Unresolvable(ref e) if e.parameter == "transport"));
        // The index itself still knows the type.
        assert_eq!(resolver.types().get("app::Transport"), ["smtp".to_string()]);
    }

    #[test]
    fn unknown_type_falls_back_to_id_lookup() {
        let resolver = resolver();
        let recorder = Recorder::new(&["app::Transport"]);
        let out = resolver
            .resolve_class(&recorder, "app::Mailer", &Bindings::default())
            .unwrap();
        assert!(out.contains("transport=@app::Transport"));
    }

    #[test]
    fn unknown_class_suggests() {
        let resolver = resolver();
        let err = resolver
            .resolve_class(&Recorder::new(&[]), "app::Mailr", &Bindings::default())
            .unwrap_err();
        match err {
            KhazinaError::NotFound(e) => assert_eq!(e.suggestion.as_deref(), Some("app::Mailer")),
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn collection_lists_every_implementer() {
        let mut resolver = resolver();
        resolver.autowire("a", ["app::Plugin"]);
        resolver.autowire("b", ["app::Plugin"]);

        let factory = Factory::new("plugins", |_| Ok(crate::value::Resolved::null()))
            .parameter(Parameter {
                hint: Some(Hint::Collection("app::Plugin".into())),
                ..Parameter::value("plugins")
            })
            .parameter(Parameter {
                hint: Some(Hint::Collection("app::Missing".into())),
                ..Parameter::value("none")
            });

        let out = resolver
            .resolve(&Recorder::new(&["a", "b"]), &Target::Factory(factory), &Bindings::default())
            .unwrap();
        assert_eq!(out, "plugins(plugins=[@a,@b], none=[])");
    }

    #[test]
    fn statement_and_list_arguments() {
        let resolver = resolver();
        let list = Argument::parse(json!(["@a", 1]));
        let out = resolver.resolve_argument(&Recorder::new(&["a"]), &list).unwrap();
        assert_eq!(out, "[@a,1]");

        let nullable = Argument::parse(json!("@?missing"));
        let out = resolver.resolve_argument(&Recorder::new(&[]), &nullable).unwrap();
        assert_eq!(out, "null");
    }

    #[test]
    fn type_index_remove() {
        let mut index = TypeIndex::default();
        index.add("T", "a");
        index.add("T", "a");
        index.add("T", "b");
        assert_eq!(index.get("T").len(), 2);
        index.remove_id("a");
        index.remove_id("b");
        assert!(index.is_empty());
    }
}
