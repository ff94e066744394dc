use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Ident, ItemFn, parse_macro_input};

/// Implementation of the `#[register_extension]` attribute macro.
///
/// Leaves the decorated function unchanged and appends a
/// `#[::weld_runtime::linkme::distributed_slice]` static that lists it in
/// `weld_runtime::EXTENSIONS`.
pub fn register_extension(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            Span::call_site(),
            "`#[register_extension]` takes no arguments",
        )
        .into_compile_error()
        .into();
    }
    let func = parse_macro_input!(item as ItemFn);

    if func.sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            func.sig.fn_token,
            "extension initializers run at configuration time and cannot be async",
        )
        .into_compile_error()
        .into();
    }

    let fn_name = &func.sig.ident;
    let fn_name_str = fn_name.to_string();
    let static_name = Ident::new(
        &format!("_WELD_EXTENSION_{}", fn_name_str.to_uppercase()),
        Span::call_site(),
    );

    quote! {
        #func

        #[::weld_runtime::linkme::distributed_slice(::weld_runtime::EXTENSIONS)]
        #[linkme(crate = ::weld_runtime::linkme)]
        static #static_name: ::weld_runtime::ExtensionDescriptor =
            ::weld_runtime::ExtensionDescriptor {
                name: #fn_name_str,
                init: #fn_name,
            };
    }
    .into()
}
