use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, spanned::Spanned};

/// Field name that marks a struct as tenant-partitioned.
const TENANT_FIELD: &str = "tenant_id";

const DEFAULT_PRIMARY_KEY: &str = "id";

/// Configuration parsed from `#[tenancy(...)]` attributes
#[derive(Default)]
struct TenancyConfig {
    tenant_col: Option<(String, Span)>,
    primary_key: Option<(String, Span)>,
    name: Option<(String, Span)>,
    unrestricted: Option<Span>,
}

pub fn expand_derive_tenant_scoped(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(TenantScoped)] can only be applied to structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(TenantScoped)] requires a struct with named fields",
        ));
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "#[derive(TenantScoped)] does not support generic models",
        ));
    }

    let field_names: Vec<String> = fields
        .named
        .iter()
        .filter_map(|f| f.ident.as_ref().map(ToString::to_string))
        .collect();

    let config = parse_tenancy_attrs(input)?;
    validate_config(&config, &field_names, input)?;

    let ident = &input.ident;
    let model_name = config
        .name
        .map_or_else(|| ident.to_string(), |(name, _)| name);
    let primary_key = config
        .primary_key
        .map_or_else(|| DEFAULT_PRIMARY_KEY.to_owned(), |(pk, _)| pk);

    let descriptor = match config.tenant_col {
        Some((tenant_col, _)) => quote! {
            ::tenancy_db::ModelDescriptor::tenant_scoped(#model_name, #tenant_col, #primary_key)
        },
        None => quote! {
            ::tenancy_db::ModelDescriptor::unrestricted(#model_name, #primary_key)
        },
    };

    Ok(quote! {
        impl ::tenancy_db::ScopedModel for #ident {
            const DESCRIPTOR: ::tenancy_db::ModelDescriptor = #descriptor;
        }

        ::tenancy_db::__private::inventory::submit! {
            <#ident as ::tenancy_db::ScopedModel>::DESCRIPTOR
        }
    })
}

/// Validate the configuration against the struct's fields
fn validate_config(
    config: &TenancyConfig,
    field_names: &[String],
    input: &DeriveInput,
) -> syn::Result<()> {
    let has_field = |name: &str| field_names.iter().any(|f| f == name);

    match (&config.tenant_col, config.unrestricted) {
        (None, None) => {
            return Err(syn::Error::new(
                input.ident.span(),
                "tenancy: missing explicit scoping decision:\n  \
                 use `#[tenancy(tenant_col = \"tenant_id\")]` or `#[tenancy(unrestricted)]`",
            ));
        }
        (Some((_, span)), Some(_)) => {
            return Err(syn::Error::new(
                *span,
                "tenancy: specify either `tenant_col` or `unrestricted`, not both",
            ));
        }
        (Some((col, span)), None) => {
            if !has_field(col) {
                return Err(syn::Error::new(
                    *span,
                    format!("tenancy: `tenant_col = \"{col}\"` does not name a field of this struct"),
                ));
            }
        }
        (None, Some(span)) => {
            if has_field(TENANT_FIELD) {
                return Err(syn::Error::new(
                    span,
                    format!(
                        "tenancy: `{}` has a `{TENANT_FIELD}` field but is declared `unrestricted`; \
                         declare `tenant_col = \"{TENANT_FIELD}\"` instead",
                        input.ident
                    ),
                ));
            }
        }
    }

    let (primary_key, pk_span) = config
        .primary_key
        .as_ref()
        .map_or((DEFAULT_PRIMARY_KEY, input.ident.span()), |(pk, span)| {
            (pk.as_str(), *span)
        });
    if !has_field(primary_key) {
        return Err(syn::Error::new(
            pk_span,
            format!("tenancy: primary key `{primary_key}` does not name a field of this struct"),
        ));
    }
    if let Some((col, span)) = &config.tenant_col
        && col == primary_key
    {
        return Err(syn::Error::new(
            *span,
            "tenancy: the tenant column cannot also be the primary key",
        ));
    }

    if let Some((name, span)) = &config.name
        && name.trim().is_empty()
    {
        return Err(syn::Error::new(*span, "tenancy: model name cannot be empty"));
    }

    Ok(())
}

/// Parse all `#[tenancy(...)]` attributes with duplicate detection
fn parse_tenancy_attrs(input: &DeriveInput) -> syn::Result<TenancyConfig> {
    let mut config = TenancyConfig::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("tenancy") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let span = meta.path.span();

            if meta.path.is_ident("unrestricted") {
                if config.unrestricted.is_some() {
                    return Err(meta.error("duplicate attribute 'unrestricted'"));
                }
                config.unrestricted = Some(span);
                return Ok(());
            }

            let key = meta
                .path
                .get_ident()
                .map(ToString::to_string)
                .unwrap_or_default();
            let slot = match key.as_str() {
                "tenant_col" => &mut config.tenant_col,
                "primary_key" => &mut config.primary_key,
                "name" => &mut config.name,
                _ => {
                    return Err(meta.error(format!(
                        "Unknown attribute '{key}'. Valid attributes: tenant_col, primary_key, name, unrestricted"
                    )));
                }
            };
            if slot.is_some() {
                return Err(meta.error(format!("duplicate attribute '{key}'")));
            }

            let value: LitStr = meta.value()?.parse()?;
            *slot = Some((value.value(), span));
            Ok(())
        })?;
    }

    Ok(config)
}
