//! `#[derive(Injectable)]` implementation.

use darling::ast::Data;
use darling::util::Ignored;
use darling::{FromDeriveInput, FromField};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, GenericArgument, PathArguments, Type};

#[derive(FromDeriveInput)]
#[darling(attributes(injectable), supports(struct_named, struct_unit))]
struct InjectableInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: Data<Ignored, InjectField>,
    #[darling(multiple)]
    implements: Vec<Type>,
    #[darling(rename = "crate", default)]
    krate: Option<syn::Path>,
}

#[derive(FromField)]
#[darling(attributes(inject))]
struct InjectField {
    ident: Option<syn::Ident>,
    ty: Type,
    #[darling(default)]
    id: Option<String>,
    #[darling(default)]
    default: Option<syn::Lit>,
    #[darling(default)]
    skip: bool,
}

/// How a field is read from the bound arguments.
enum Kind<'a> {
    Service(&'a Type),
    Optional(&'a Type),
    Collection(&'a Type),
    Value,
}

pub fn expand(input: &DeriveInput) -> darling::Result<TokenStream> {
    let input = InjectableInput::from_derive_input(input)?;

    if !input.generics.params.is_empty() {
        return Err(darling::Error::custom("Injectable cannot be derived for generic types").with_span(&input.generics));
    }

    let krate = input.krate.clone().unwrap_or_else(|| syn::parse_quote!(::khazina));
    let ident = &input.ident;

    let fields = match input.data {
        Data::Struct(fields) => fields,
        Data::Enum(_) => return Err(darling::Error::unsupported_shape("enum")),
    };

    let mut parameters = Vec::new();
    let mut initializers = Vec::new();

    for field in fields.iter() {
        let Some(ref name) = field.ident else {
            return Err(darling::Error::unsupported_shape("tuple field"));
        };
        let key = name.to_string();

        if field.skip {
            initializers.push(quote! { #name: ::core::default::Default::default() });
            continue;
        }

        let (mut parameter, read) = match classify(&field.ty) {
            Kind::Service(inner) => (
                quote! { #krate::Parameter::service::<#inner>(#key) },
                quote! { args.service::<#inner>(#key)? },
            ),
            Kind::Optional(inner) => (
                quote! { #krate::Parameter::service::<#inner>(#key).nullable() },
                quote! { args.optional_service::<#inner>(#key)? },
            ),
            Kind::Collection(inner) => (
                quote! { #krate::Parameter::collection::<#inner>(#key) },
                quote! { args.services::<#inner>(#key)? },
            ),
            Kind::Value => {
                let ty = &field.ty;
                let parameter = match wrapped(ty, "Option") {
                    Some(_) => quote! { #krate::Parameter::value(#key).nullable() },
                    None => quote! { #krate::Parameter::value(#key) },
                };
                (parameter, quote! { args.value::<#ty>(#key)? })
            }
        };

        if let Some(ref id) = field.id {
            parameter = quote! { #parameter.inject(#id) };
        }
        if let Some(ref default) = field.default {
            parameter = quote! { #parameter.with_default(#krate::__private::serde_json::json!(#default)) };
        }

        parameters.push(quote! { .parameter(#parameter) });
        initializers.push(quote! { #name: #read });
    }

    let implements = input.implements.iter().map(|ty| {
        quote! { .implements(::core::any::type_name::<#ty>()) }
    });

    let construct = if fields.is_empty() && matches!(fields.style, darling::ast::Style::Unit) {
        quote! { Self }
    } else {
        quote! { Self { #(#initializers),* } }
    };

    Ok(quote! {
        impl #krate::Injectable for #ident {
            fn descriptor() -> #krate::TypeDescriptor {
                #krate::TypeDescriptor::of::<Self>()
                    #(#implements)*
                    #(#parameters)*
            }

            #[allow(unused_variables)]
            fn construct(args: &mut #krate::Arguments) -> #krate::Result<Self> {
                ::core::result::Result::Ok(#construct)
            }
        }

        #krate::__private::inventory::submit! {
            #krate::ClassEntry::of::<#ident>()
        }
    })
}

fn classify(ty: &Type) -> Kind<'_> {
    if let Some(inner) = wrapped(ty, "Arc") {
        return Kind::Service(inner);
    }
    if let Some(inner) = wrapped(ty, "Option").and_then(|option| wrapped(option, "Arc")) {
        return Kind::Optional(inner);
    }
    if let Some(inner) = wrapped(ty, "Vec").and_then(|vec| wrapped(vec, "Arc")) {
        return Kind::Collection(inner);
    }
    Kind::Value
}

/// The type argument of `Wrapper<T>`, matched on the last path segment.
fn wrapped<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(ref args) = segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(source: &str) -> String {
        let input: DeriveInput = syn::parse_str(source).unwrap();
        expand(&input).unwrap().to_string().replace(' ', "")
    }

    #[test]
    fn classifies_field_types() {
        let ty: Type = syn::parse_quote!(Arc<Logger>);
        assert!(matches!(classify(&ty), Kind::Service(_)));
        let ty: Type = syn::parse_quote!(Option<std::sync::Arc<Logger>>);
        assert!(matches!(classify(&ty), Kind::Optional(_)));
        let ty: Type = syn::parse_quote!(Vec<Arc<dyn Plugin>>);
        assert!(matches!(classify(&ty), Kind::Collection(_)));
        let ty: Type = syn::parse_quote!(Option<u16>);
        assert!(matches!(classify(&ty), Kind::Value));
    }

    #[test]
    fn expands_parameters_in_field_order() {
        let out = expand_str(
            r#"
            #[injectable(implements = "dyn Notifier")]
            struct Mailer {
                transport: Arc<Transport>,
                #[inject(id = "audit")]
                audit: Option<Arc<Audit>>,
                #[inject(default = "noreply@example.com")]
                sender: String,
                #[inject(skip)]
                sent: AtomicUsize,
            }
            "#,
        );
        assert!(out.contains(".implements(::core::any::type_name::<dynNotifier>())"));
        assert!(out.contains("Parameter::service::<Transport>(\"transport\")"));
        assert!(out.contains(".nullable().inject(\"audit\")"));
        assert!(out.contains(".with_default(::khazina::__private::serde_json::json!(\"noreply@example.com\"))"));
        assert!(out.contains("sent:::core::default::Default::default()"));
        assert!(out.contains("inventory::submit!"));

        let transport = out.find("\"transport\"").unwrap();
        let sender = out.find("\"sender\"").unwrap();
        assert!(transport < sender);
    }

    #[test]
    fn unit_struct_constructs_self() {
        let out = expand_str("struct Clock;");
        assert!(out.contains("::core::result::Result::Ok(Self)"));
    }

    #[test]
    fn custom_crate_path() {
        let out = expand_str(r#"#[injectable(crate = "::di")] struct Clock;"#);
        assert!(out.contains("impl::di::InjectableforClock"));
    }

    #[test]
    fn generics_are_rejected() {
        let input: DeriveInput = syn::parse_str("struct Holder<T> { value: T }").unwrap();
        assert!(expand(&input).is_err());
    }
}
