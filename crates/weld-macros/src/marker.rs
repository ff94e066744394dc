//! `#[derive(Marker)]` and `#[derive(MarkerEnum)]`.
//!
//! # Struct-level attributes `#[weld(...)]`
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `name` | `"Blob"` | Marker name used in diagnostics (default: the type name) |
//!
//! # Field-level attributes `#[weld(...)]`
//!
//! | Key | Description |
//! |-----|-------------|
//! | `auto_resolve` | Substitute `%token%` placeholders before binding |
//! | `skip` | Leave the field out of the accessor table |
//! | `rename = "..."` | Publish the property under another name |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, spanned::Spanned};

// ============================================================================
// Attribute structures
// ============================================================================

#[derive(Default)]
struct FieldAttrs {
    auto_resolve: bool,
    skip: bool,
    rename: Option<String>,
}

fn parse_marker_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in attrs {
        if attr.path().is_ident("weld") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    name = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `name = \"...\"`"))
                }
            })?;
        }
    }
    Ok(name)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("weld") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("auto_resolve") {
                out.auto_resolve = true;
            } else if meta.path.is_ident("skip") {
                out.skip = true;
            } else if meta.path.is_ident("rename") {
                out.rename = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("expected `auto_resolve`, `skip` or `rename = \"...\"`"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

// ============================================================================
// derive(Marker)
// ============================================================================

pub fn derive_marker(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let marker_name = parse_marker_name(&input.attrs)?.unwrap_or_else(|| ident.to_string());
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "Marker can only be derived for structs",
        ));
    };

    let mut accessors = Vec::new();
    let mut resolved_fields = Vec::new();

    if let Fields::Named(fields) = &data.fields {
        for field in &fields.named {
            let attrs = parse_field_attrs(&field.attrs)?;
            let Some(field_ident) = &field.ident else {
                continue;
            };
            let ty = &field.ty;

            if attrs.auto_resolve {
                resolved_fields.push(quote! {
                    resolved.#field_ident =
                        ::weld_core::AutoResolve::auto_resolve(&self.#field_ident, resolver)?;
                });
            }
            if attrs.skip {
                continue;
            }

            let property = attrs.rename.unwrap_or_else(|| field_ident.to_string());
            accessors.push(quote! {
                ::weld_core::PropertyAccessor::new(
                    #property,
                    <#ty as ::weld_core::PropertyField>::shape(),
                    |marker: &Self| ::weld_core::PropertyField::to_property(&marker.#field_ident),
                )
            });
        }
    } else if !matches!(data.fields, Fields::Unit) {
        return Err(syn::Error::new(
            data.fields.span(),
            "Marker requires named fields or a unit struct",
        ));
    }

    let resolve_fn = if resolved_fields.is_empty() {
        quote!()
    } else {
        quote! {
            fn resolve(
                &self,
                resolver: &dyn ::weld_core::NameResolver,
            ) -> ::weld_core::BindResult<Self> {
                let mut resolved = ::std::clone::Clone::clone(self);
                #(#resolved_fields)*
                ::std::result::Result::Ok(resolved)
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::weld_core::Marker for #ident #ty_generics #where_clause {
            const NAME: &'static str = #marker_name;

            fn properties() -> ::std::vec::Vec<::weld_core::PropertyAccessor<Self>> {
                ::std::vec![#(#accessors),*]
            }

            #resolve_fn
        }
    })
}

// ============================================================================
// derive(MarkerEnum)
// ============================================================================

pub fn derive_marker_enum(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "MarkerEnum can only be derived for enums",
        ));
    };

    let mut arms = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.span(),
                "MarkerEnum variants cannot carry data",
            ));
        }
        let variant_ident = &variant.ident;
        let variant_name = variant_ident.to_string();
        arms.push(quote!(Self::#variant_ident => #variant_name));
    }

    Ok(quote! {
        impl ::weld_core::MarkerEnum for #ident {
            fn variant_name(&self) -> &'static str {
                match self {
                    #(#arms,)*
                }
            }
        }

        impl ::weld_core::PropertyField for #ident {
            fn shape() -> ::weld_core::PropertyShape {
                ::weld_core::PropertyShape::required(::weld_core::PropertyKind::Enum(
                    ::weld_core::TypeKey::of::<Self>(),
                ))
            }

            fn to_property(&self) -> ::std::option::Option<::weld_core::PropertyValue> {
                ::std::option::Option::Some(::weld_core::PropertyValue::Enum(
                    ::weld_core::EnumValue::of(*self),
                ))
            }
        }

        impl ::weld_core::IntoPropertyValue for #ident {
            fn into_property_value(self) -> ::weld_core::PropertyValue {
                ::weld_core::PropertyValue::Enum(::weld_core::EnumValue::of(self))
            }
        }
    })
}
