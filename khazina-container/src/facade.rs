//! Static facades over a compiled container.
//!
//! [`FacadeProxy`] reads a [`ContainerBuilder`] the way any other client
//! would and emits one associated function per public service:
//!
//! ```rust,ignore
//! pub struct Services;
//!
//! impl Services {
//!     pub fn logger(container: &::khazina::SealedContainer) -> ::khazina::Result<::khazina::Service> {
//!         container.get("logger")
//!     }
//! }
//! ```

use std::collections::HashSet;

use quote::{format_ident, quote};
use tracing::debug;

use crate::builder::ContainerBuilder;
use crate::error::{KhazinaError, Result};
use crate::printer::GENERATED_HEADER;

/// Generates a facade type for the public services of a builder.
#[derive(Debug, Clone)]
pub struct FacadeProxy {
    name: String,
    crate_path: String,
}

impl FacadeProxy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            crate_path: "::khazina".to_string(),
        }
    }

    pub fn crate_path(mut self, path: impl Into<String>) -> Self {
        self.crate_path = path.into();
        self
    }

    /// Renders the facade source. Private ids are skipped.
    ///
    /// # Errors
    /// [`KhazinaError::Misconfiguration`] when the facade name or crate
    /// path is not valid Rust.
    pub fn generate(&self, builder: &ContainerBuilder) -> Result<String> {
        let name: syn::Ident = syn::parse_str(&self.name)
            .map_err(|err| KhazinaError::Misconfiguration(format!("invalid facade name \"{}\": {err}", self.name)))?;
        let krate: syn::Path = syn::parse_str(&self.crate_path).map_err(|err| {
            KhazinaError::Misconfiguration(format!("invalid crate path \"{}\": {err}", self.crate_path))
        })?;

        let mut ids: Vec<String> = builder
            .keys()
            .into_iter()
            .filter(|id| builder.definition(id).is_some_and(|definition| definition.is_public()))
            .collect();
        ids.sort_unstable();

        let mut used = HashSet::new();
        let methods = ids.iter().map(|id| {
            let function = format_ident!("{}", unique(&mut used, function_name(id)));
            quote! {
                pub fn #function(container: &#krate::SealedContainer) -> #krate::Result<#krate::Service> {
                    container.get(#id)
                }
            }
        });

        let tokens = quote! {
            pub struct #name;

            impl #name {
                #(#methods)*
            }
        };

        let file: syn::File = syn::parse2(tokens)
            .map_err(|err| KhazinaError::Misconfiguration(format!("generated facade does not parse: {err}")))?;
        debug!(facade = %self.name, services = ids.len(), "Generated facade");
        Ok(format!("{GENERATED_HEADER}\n\n{}\n", quote! { #file }))
    }
}

/// Snake-case name for `id`, never a keyword.
fn function_name(id: &str) -> String {
    let mut name = String::new();
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_end_matches('_').to_string();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) || syn::parse_str::<syn::Ident>(&name).is_err() {
        return format!("service_{name}").trim_end_matches('_').to_string();
    }
    name
}

fn unique(used: &mut HashSet<String>, base: String) -> String {
    let mut name = base.clone();
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{base}_{n}");
        n += 1;
    }
    name
}
