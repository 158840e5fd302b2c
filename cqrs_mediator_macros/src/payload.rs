use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

pub fn derive_payload(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Extract #[payload(name = "...")] from struct-level attributes
    let type_name = match extract_type_name(&input) {
        Ok(type_name) => type_name,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl #impl_generics ::cqrs_mediator::Payload for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
        }
    };

    TokenStream::from(expanded)
}

fn extract_type_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("payload") {
            continue;
        }

        let mut type_name = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                type_name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"`"))
            }
        })?;

        if let Some(name) = type_name {
            if name.trim().is_empty() {
                return Err(syn::Error::new_spanned(attr, "payload name must not be empty"));
            }
            return Ok(name);
        }
    }

    // Default: the bare type identifier
    Ok(input.ident.to_string())
}
