use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields};

pub fn derive_organisation_scoped(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let field = match extract_organisation_field(&input) {
        Ok(field) => field,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl #impl_generics ::cqrs_mediator::OrganisationScoped for #name #ty_generics #where_clause {
            fn organisation_id(&self) -> ::cqrs_mediator::Uuid {
                self.#field
            }
        }

        impl #impl_generics ::cqrs_mediator::ScopedResult for #name #ty_generics #where_clause {
            fn restrict_to(
                self,
                allowed: &[::cqrs_mediator::Uuid],
            ) -> ::core::result::Result<Self, ::cqrs_mediator::DispatchError> {
                ::cqrs_mediator::restrict_single(self, allowed)
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_organisation_field(input: &DeriveInput) -> syn::Result<syn::Ident> {
    let Data::Struct(data_struct) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "OrganisationScoped can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data_struct.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "OrganisationScoped requires named fields",
        ));
    };

    // A field marked with #[organisation(id)] wins
    for field in &fields.named {
        for attr in &field.attrs {
            if !attr.path().is_ident("organisation") {
                continue;
            }
            let mut is_id = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `id`"))
                }
            })?;
            if is_id {
                if let Some(ident) = &field.ident {
                    return Ok(ident.clone());
                }
            }
        }
    }

    // Default: look for a field named "organisation_id"
    for field in &fields.named {
        if let Some(ident) = &field.ident {
            if ident == "organisation_id" {
                return Ok(ident.clone());
            }
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        "OrganisationScoped derive: no field marked with #[organisation(id)] and no field named `organisation_id`",
    ))
}
