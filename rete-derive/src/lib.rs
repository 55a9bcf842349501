use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Result, parse_macro_input};

/// Derives `rete_core::Fact` for a struct with an `id` field and a
/// `timestamp: chrono::DateTime<chrono::Utc>` field.
///
/// The id field is the one named `id` unless a field carries
/// `#[fact(id)]`; same for `timestamp` / `#[fact(timestamp)]`. This
/// generalizes the one-off `id()`/`timestamp()` impls every fact struct in
/// the teacher workspace would otherwise hand-write.
#[proc_macro_derive(Fact, attributes(fact))]
pub fn derive_fact(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_fact(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_fact(input: &DeriveInput) -> Result<proc_macro2::TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(Error::new_spanned(
                    &input.ident,
                    "Fact can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new_spanned(
                &input.ident,
                "Fact can only be derived for structs",
            ));
        }
    };

    let id_field = find_tagged_field(fields, "id")?.ok_or_else(|| {
        Error::new(
            Span::call_site(),
            "no field named `id`, and no field tagged `#[fact(id)]`",
        )
    })?;
    let ts_field = find_tagged_field(fields, "timestamp")?.ok_or_else(|| {
        Error::new(
            Span::call_site(),
            "no field named `timestamp`, and no field tagged `#[fact(timestamp)]`",
        )
    })?;

    let id_ty = &id_field.ty;
    let id_ident = id_field.ident.as_ref().expect("named field");
    let ts_ident = ts_field.ident.as_ref().expect("named field");

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics rete_core::Fact for #name #ty_generics #where_clause {
            type Id = #id_ty;

            fn id(&self) -> &Self::Id {
                &self.#id_ident
            }

            fn timestamp(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.#ts_ident
            }
        }
    })
}

fn find_tagged_field<'a>(
    fields: &'a syn::punctuated::Punctuated<syn::Field, syn::token::Comma>,
    fallback_name: &str,
) -> Result<Option<&'a syn::Field>> {
    let mut tagged = None;
    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("fact") {
                continue;
            }
            let mut matched = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(fallback_name) {
                    matched = true;
                }
                Ok(())
            })?;
            if matched {
                if tagged.is_some() {
                    return Err(Error::new_spanned(
                        field,
                        format!("duplicate #[fact({fallback_name})] field"),
                    ));
                }
                tagged = Some(field);
            }
        }
    }

    if tagged.is_some() {
        return Ok(tagged);
    }

    Ok(fields
        .iter()
        .find(|f| f.ident.as_ref().is_some_and(|i| i == fallback_name)))
}
