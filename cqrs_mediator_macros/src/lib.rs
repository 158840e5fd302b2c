mod organisation;
mod payload;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Payload)]
// ============================================================================

/// Derive macro for `cqrs_mediator::Payload`.
///
/// The type tag defaults to the bare type name. Use `#[payload(name = "...")]`
/// to pin a tag that stays stable across renames and module moves, which
/// matters once messages are on a queue.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Payload)]
/// #[payload(name = "accounts.CreateAccount")]
/// pub struct CreateAccount {
///     pub id: Uuid,
/// }
/// ```
#[proc_macro_derive(Payload, attributes(payload))]
pub fn derive_payload(input: TokenStream) -> TokenStream {
    payload::derive_payload(input)
}

// ============================================================================
// #[derive(OrganisationScoped)]
// ============================================================================

/// Derive macro for `cqrs_mediator::OrganisationScoped`.
///
/// Reads the organisation from the field marked `#[organisation(id)]`, or from
/// a field named `organisation_id`. The field must be a `Uuid`.
///
/// Also implements `ScopedResult`, so the type can be returned from a query
/// registered with `ResultFilter::organisation()`. `Vec<T>` of such a type is
/// covered by the library.
///
/// ```ignore
/// #[derive(Clone, OrganisationScoped)]
/// pub struct Account {
///     pub id: Uuid,
///     #[organisation(id)]
///     pub owner: Uuid,
/// }
/// ```
#[proc_macro_derive(OrganisationScoped, attributes(organisation))]
pub fn derive_organisation_scoped(input: TokenStream) -> TokenStream {
    organisation::derive_organisation_scoped(input)
}
