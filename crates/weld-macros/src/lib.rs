//! Procedural macros for Weld.
//!
//! This crate provides:
//!
//! - `#[derive(Marker)]` - Generates the property accessor table of a marker
//! - `#[derive(MarkerEnum)]` - Lets a fieldless enum be a marker property
//! - `#[register_extension]` - Lists an initializer for automatic discovery
//!
//! ```rust,ignore
//! use weld::prelude::*;
//!
//! #[derive(Debug, Clone, Marker)]
//! #[weld(name = "Blob")]
//! pub struct BlobMarker {
//!     #[weld(auto_resolve)]
//!     pub path: String,
//!     pub access: Option<FileAccess>,
//! }
//!
//! #[register_extension]
//! fn blob_extension(host: &mut HostConfiguration) -> ConfigResult<()> {
//!     host.open_rule_builder::<BlobMarker>()
//!         .bind_to_input(ConverterSource::from_fn(|m: &BlobMarker| m.path.clone()))?;
//!     Ok(())
//! }
//! ```

mod extension;
mod marker;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `weld_core::Marker` for a struct.
///
/// Every named field becomes a property readable by filters and
/// validators. The field type must implement `weld_core::PropertyField`.
///
/// # Attributes
///
/// - `#[weld(name = "...")]` on the struct - Marker name (default: the type name)
/// - `#[weld(auto_resolve)]` on a field - Substitute `%token%` placeholders
/// - `#[weld(skip)]` on a field - Do not publish the field as a property
/// - `#[weld(rename = "...")]` on a field - Publish under another name
#[proc_macro_derive(Marker, attributes(weld))]
pub fn derive_marker(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match marker::derive_marker(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `MarkerEnum`, `PropertyField` and `IntoPropertyValue` for a
/// fieldless `Copy` enum.
#[proc_macro_derive(MarkerEnum)]
pub fn derive_marker_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match marker::derive_marker_enum(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Registers an extension initializer for
/// `HostConfiguration::with_registered_extensions`.
///
/// The function must have the signature
/// `fn(&mut HostConfiguration) -> ConfigResult<()>`.
#[proc_macro_attribute]
pub fn register_extension(attr: TokenStream, item: TokenStream) -> TokenStream {
    extension::register_extension(attr, item)
}
