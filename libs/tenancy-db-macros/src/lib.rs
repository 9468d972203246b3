// Proc-macro crate for the tenancy-db scoping manifest
//
//! # tenancy-db-macros
//!
//! ## `#[derive(TenantScoped)]`
//!
//! Implements `tenancy_db::ScopedModel` for a model struct and submits its
//! descriptor to the process-wide tenancy manifest.
//!
//! Every model must make an explicit scoping decision. There is no default:
//!
//! ```ignore
//! use tenancy_db::TenantScoped;
//!
//! #[derive(TenantScoped)]
//! #[tenancy(tenant_col = "tenant_id")]
//! pub struct WorkOrder {
//!     pub id: Uuid,
//!     pub tenant_id: Uuid,
//!     pub title: String,
//! }
//!
//! #[derive(TenantScoped)]
//! #[tenancy(unrestricted, name = "Tenant")]
//! pub struct TenantRecord {
//!     pub id: Uuid,
//!     pub display_name: String,
//! }
//! ```
//!
//! ### Attributes
//!
//! - `tenant_col = "field"`: the field that stores the owning tenant
//! - `unrestricted`: the model is global (forbids `tenant_col`)
//! - `primary_key = "field"`: primary key field, defaults to `id`
//! - `name = "Model"`: manifest name, defaults to the struct name
//!
//! The build fails when a struct is declared `unrestricted` but still has a
//! `tenant_id` field, so a tenant-partitioned model cannot ship unscoped.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod scoped;

/// Derive macro for implementing `ScopedModel` and registering the model in
/// the tenancy manifest.
///
/// # Example
///
/// ```ignore
/// #[derive(TenantScoped)]
/// #[tenancy(tenant_col = "tenant_id", primary_key = "work_order_id")]
/// pub struct WorkOrder {
///     pub work_order_id: Uuid,
///     pub tenant_id: Uuid,
/// }
/// ```
#[proc_macro_derive(TenantScoped, attributes(tenancy))]
pub fn derive_tenant_scoped(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    scoped::expand_derive_tenant_scoped(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
