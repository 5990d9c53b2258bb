//! Printers: compiled unit in, source text out.
//!
//! [`RustPrinter`] renders a [`CompiledUnit`] as a Rust module defining
//! one container type. The generated type wraps the unit's parent (a
//! [`SealedContainer`](crate::sealed::SealedContainer) by default),
//! installs the lookup tables on construction and holds one accessor
//! function per service:
//!
//! ```rust,ignore
//! pub struct CompiledContainer { inner: ::khazina::SealedContainer }
//!
//! impl CompiledContainer {
//!     pub fn new() -> ::khazina::Result<Self> { /* install tables */ }
//!
//!     fn get_logger(container: &::khazina::SealedContainer) -> ::khazina::Result<::khazina::Service> {
//!         if let Some(service) = container.cached("logger") {
//!             return Ok(service);
//!         }
//!         let service = ::khazina::sealed::construct::<app::Logger>("app::Logger", vec![/* .. */])?.into_service();
//!         Ok(container.share("logger", service))
//!     }
//! }
//! ```

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use tracing::debug;

use crate::error::{KhazinaError, Result};
use crate::expr::{CompiledUnit, Expr, ServiceMethod, Tier};

/// Header line of every printed unit.
pub const GENERATED_HEADER: &str = "// This file was generated by khazina. Do not edit.";

/// Turns a compiled unit into source text.
pub trait Printer: Send + Sync {
    fn print(&self, unit: &CompiledUnit) -> Result<String>;
}

/// Prints Rust source with `quote`.
#[derive(Debug, Clone)]
pub struct RustPrinter {
    /// Path the generated code reaches the runtime through.
    crate_path: String,
    /// Crate the output is included in; its paths are rewritten to `crate`.
    local_crate: Option<String>,
}

impl Default for RustPrinter {
    fn default() -> Self {
        Self {
            crate_path: "::khazina".to_string(),
            local_crate: None,
        }
    }
}

impl RustPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reaches the runtime through `path` instead of `::khazina`.
    pub fn crate_path(mut self, path: impl Into<String>) -> Self {
        self.crate_path = path.into();
        self
    }

    /// Output is `include!`d from `name`: class and factory paths in that
    /// crate are rewritten to start with `crate`.
    pub fn local_crate(mut self, name: impl Into<String>) -> Self {
        self.local_crate = Some(name.into());
        self
    }

    fn localize(&self, path: &str) -> String {
        if let Some(ref local) = self.local_crate
            && let Some(rest) = path.strip_prefix(local.as_str())
            && rest.starts_with("::")
        {
            return format!("crate{rest}");
        }
        path.to_string()
    }

    fn render(&self, unit: &CompiledUnit) -> Result<TokenStream> {
        let krate: syn::Path = parse(&self.crate_path, "crate path")?;
        let name = ident(&unit.name)?;
        let parent: syn::Type = parse(&self.localize(&unit.parent.path), "parent type")?;

        let accessors = unit
            .methods
            .iter()
            .map(|method| self.accessor(&krate, method))
            .collect::<Result<Vec<_>>>()?;

        let registrations = unit.methods.iter().map(|method| {
            let method_name = &method.name;
            let function = format_ident!("{}", method.name);
            quote! { .accessor(#method_name, Self::#function) }
        });
        let exposed = unit.methods_map.iter().map(|(id, method)| quote! { .expose(#id, #method) });
        let aliases = unit.aliases.iter().map(|(alias, id)| quote! { .alias(#alias, #id) });
        let types = unit.types.iter().map(|(type_name, ids)| quote! { .types(#type_name, &[#(#ids),*]) });

        let mut tags = Vec::new();
        for (tag, services) in &unit.tags {
            for (id, attributes) in services {
                let literal = json(attributes)?;
                tags.push(quote! { .tag(#tag, #id, #krate::sealed::literal(#literal)?) });
            }
        }

        let parameters = unit
            .parameters
            .iter()
            .map(|(name, value)| {
                let literal = json(value)?;
                Ok(quote! { .parameter(#name, #krate::sealed::literal(#literal)?) })
            })
            .collect::<Result<Vec<_>>>()?;

        let dynamic = unit
            .dynamic_parameters
            .iter()
            .map(|(name, expr)| {
                let value = self.expr(&krate, expr)?;
                Ok(quote! {
                    let value = #value;
                    container.set_parameter(#name, value);
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let construct = match unit.parent.constructor {
            Some(ref constructor) => {
                let constructor = ident(constructor)?;
                quote! { <#parent>::#constructor() }
            }
            None => quote! { <#parent as ::core::default::Default>::default() },
        };

        let strict = unit.strict.then(|| quote! { #[forbid(unsafe_code)] });
        let mut docs = vec![" Compiled service container.".to_string()];
        if !unit.resources.is_empty() {
            docs.push(String::new());
            docs.push(" Built from:".to_string());
            docs.extend(unit.resources.iter().map(|resource| format!(" - {resource}")));
        }

        Ok(quote! {
            #(#[doc = #docs])*
            pub struct #name {
                inner: #parent,
            }

            #strict
            impl #name {
                pub fn new() -> #krate::Result<Self> {
                    let tables = #krate::sealed::Tables::default()
                        #(#registrations)*
                        #(#exposed)*
                        #(#aliases)*
                        #(#types)*
                        #(#tags)*
                        #(#parameters)*;

                    let inner = #construct;
                    {
                        let container: &#krate::SealedContainer = ::core::convert::AsRef::as_ref(&inner);
                        container.install(tables);
                        #(#dynamic)*
                    }
                    Ok(Self { inner })
                }

                #(#accessors)*
            }

            impl ::core::ops::Deref for #name {
                type Target = #parent;

                fn deref(&self) -> &Self::Target {
                    &self.inner
                }
            }
        })
    }

    fn accessor(&self, krate: &syn::Path, method: &ServiceMethod) -> Result<TokenStream> {
        let function = ident(&method.name)?;
        let id = &method.id;
        let body = self.expr(krate, &method.body)?;

        let store = match method.tier {
            Some(Tier::Services) => quote! {
                if let Some(service) = container.cached(#id) {
                    return Ok(service);
                }
                let service = #body.into_service();
                Ok(container.share(#id, service))
            },
            Some(Tier::Privates) => quote! {
                if let Some(service) = container.cached_private(#id) {
                    return Ok(service);
                }
                let service = #body.into_service();
                Ok(container.share_private(#id, service))
            },
            None => quote! {
                Ok(#body.into_service())
            },
        };

        Ok(quote! {
            fn #function(container: &#krate::SealedContainer) -> #krate::Result<#krate::Service> {
                #store
            }
        })
    }

    /// An expression of type `Resolved`.
    fn expr(&self, krate: &syn::Path, expr: &Expr) -> Result<TokenStream> {
        Ok(match expr {
            Expr::Literal { value } => {
                let literal = json(value)?;
                quote! { #krate::Resolved::Value(#krate::sealed::literal(#literal)?) }
            }
            Expr::List { items } => {
                let items = items
                    .iter()
                    .map(|item| self.expr(krate, item))
                    .collect::<Result<Vec<_>>>()?;
                quote! { #krate::Resolved::List(vec![#(#items),*]) }
            }
            Expr::New { class, args } => {
                let ty: syn::Type = parse(&self.localize(class), "class")?;
                let args = self.args(krate, args)?;
                quote! { #krate::sealed::construct::<#ty>(#class, vec![#(#args),*])? }
            }
            Expr::Call { path, args } => {
                let function: syn::Path = parse(&self.localize(path), "factory path")?;
                let args = self.args(krate, args)?;
                quote! { #function(&mut #krate::Arguments::new(#path, vec![#(#args),*]))? }
            }
            Expr::Service { method, .. } => {
                let function = ident(method)?;
                quote! { #krate::Resolved::Service(Self::#function(container)?) }
            }
        })
    }

    fn args(&self, krate: &syn::Path, args: &indexmap::IndexMap<String, Expr>) -> Result<Vec<TokenStream>> {
        args.iter()
            .map(|(name, expr)| {
                let value = self.expr(krate, expr)?;
                Ok(quote! { (::std::string::String::from(#name), #value) })
            })
            .collect()
    }
}

impl Printer for RustPrinter {
    fn print(&self, unit: &CompiledUnit) -> Result<String> {
        let tokens = self.render(unit)?;
        let file: syn::File = syn::parse2(tokens).map_err(|err| {
            KhazinaError::Misconfiguration(format!("generated container \"{}\" does not parse: {err}", unit.name))
        })?;
        debug!(items = file.items.len(), "Printed unit");
        Ok(format!("{GENERATED_HEADER}\n\n{}\n", quote! { #file }))
    }
}

fn parse<T: syn::parse::Parse>(text: &str, what: &str) -> Result<T> {
    syn::parse_str(text).map_err(|err| KhazinaError::Misconfiguration(format!("invalid {what} \"{text}\": {err}")))
}

fn ident(text: &str) -> Result<syn::Ident> {
    parse(text, "identifier")
}

fn json(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value).map_err(|err| KhazinaError::Misconfiguration(format!("unprintable literal: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    use crate::expr::Parent;

    fn unit() -> CompiledUnit {
        let mut args = IndexMap::new();
        args.insert("level".to_string(), Expr::literal("debug"));
        args.insert("sinks".to_string(), Expr::List {
            items: vec![Expr::Service {
                id: "sink".into(),
                method: "get_sink".into(),
            }],
        });

        CompiledUnit {
            name: "AppContainer".into(),
            strict: true,
            parent: Parent::default(),
            methods: vec![
                ServiceMethod {
                    id: "logger".into(),
                    name: "get_logger".into(),
                    tier: Some(Tier::Services),
                    body: Expr::New {
                        class: "my_app::Logger".into(),
                        args,
                    },
                },
                ServiceMethod {
                    id: "sink".into(),
                    name: "get_sink".into(),
                    tier: Some(Tier::Privates),
                    body: Expr::Call {
                        path: "my_app::sinks::stdout".into(),
                        args: IndexMap::new(),
                    },
                },
                ServiceMethod {
                    id: "request_id".into(),
                    name: "get_request_id".into(),
                    tier: None,
                    body: Expr::literal(7),
                },
            ],
            methods_map: [("logger", "get_logger"), ("request_id", "get_request_id")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            aliases: [("log".to_string(), "logger".to_string())].into_iter().collect(),
            types: [("my_app::Log".to_string(), vec!["logger".to_string()])].into_iter().collect(),
            tags: IndexMap::new(),
            parameters: [("port".to_string(), json!(8080))].into_iter().collect(),
            dynamic_parameters: IndexMap::new(),
            resources: vec!["services.json".into()],
        }
    }

    fn print(printer: &RustPrinter, unit: &CompiledUnit) -> String {
        printer.print(unit).unwrap().replace(' ', "")
    }

    #[test]
    fn prints_parseable_source() {
        let source = RustPrinter::new().print(&unit()).unwrap();
        assert!(source.starts_with(GENERATED_HEADER));

        let body = source.trim_start_matches(GENERATED_HEADER);
        let file: syn::File = syn::parse_str(body).unwrap();
        assert_eq!(file.items.len(), 3);
    }

    #[test]
    fn tiers_pick_the_cache() {
        let source = print(&RustPrinter::new(), &unit());
        assert!(source.contains("container.share(\"logger\",service)"));
        assert!(source.contains("container.share_private(\"sink\",service)"));
        assert!(!source.contains("cached(\"request_id\")"));
        assert!(source.contains("#[forbid(unsafe_code)]"));
        assert!(source.contains("-services.json"));
    }

    #[test]
    fn local_crate_paths_are_rewritten() {
        let source = print(&RustPrinter::new().local_crate("my_app"), &unit());
        assert!(source.contains("construct::<crate::Logger>"));
        assert!(source.contains("crate::sinks::stdout(&mut"));
        assert!(!source.contains("construct::<my_app::Logger>"));
    }

    #[test]
    fn custom_parent_with_constructor() {
        let mut unit = unit();
        unit.parent = Parent::new("my_app::BaseContainer").constructor("boot");
        unit.strict = false;
        let source = print(&RustPrinter::new(), &unit);
        assert!(source.contains("<my_app::BaseContainer>::boot()"));
        assert!(!source.contains("forbid"));
    }

    #[test]
    fn invalid_names_are_misconfiguration() {
        let mut unit = unit();
        unit.name = "not a name".into();
        assert!(matches!(
            RustPrinter::new().print(&unit).unwrap_err(),
            KhazinaError::Misconfiguration(_)
        ));
    }
}
