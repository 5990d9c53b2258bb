//! Procedural macros for Khazina.
//!
//! Provides `#[derive(Injectable)]`, re-exported by `khazina-derive`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod injectable;

/// Implements `Injectable` for a struct and registers it in the type
/// catalog through `inventory`.
///
/// Fields are bound by name:
/// - `Arc<T>`: the service of type `T`
/// - `Option<Arc<T>>`: the same, or `None` when nothing matches
/// - `Vec<Arc<T>>`: every service of type `T`
/// - anything else: a literal, deserialized with `serde`
///
/// Attributes:
/// - `#[injectable(implements = "dyn crate::Transport")]` - extra type the
///   class is indexed under (repeatable)
/// - `#[injectable(crate = "::my_khazina")]` - path of the khazina crate
/// - `#[inject(id = "mailer.transport")]` - bind a service id
/// - `#[inject(default = 25)]` - literal used when nothing is bound
/// - `#[inject(skip)]` - not a parameter, built with `Default`
///
/// ```ignore
/// #[derive(Injectable)]
/// #[injectable(implements = "dyn crate::Notifier")]
/// struct Mailer {
///     transport: Arc<SmtpTransport>,
///     #[inject(default = "noreply@example.com")]
///     sender: String,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(injectable, inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    injectable::expand(&input)
        .unwrap_or_else(|err| err.write_errors())
        .into()
}
