//! Procedural macros for offload.
//!
//! This crate provides the `#[offload::callable]` attribute macro that turns an
//! ordinary function into an `offload::Callable`. The function itself is
//! left untouched; the macro adds a constant next to it that execution
//! contexts can look up by name.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, LitStr, ReturnType, Type, parse_macro_input};

/// Marks a function as a callable that can run on an execution context.
///
/// # Callable Semantics
///
/// - **Arguments**: Parameters are decoded from the positional argument
///   list, in order, with serde. They must be owned types.
/// - **Output**: The return value is encoded with serde. A `Result` return
///   maps `Err` to the callable's error message.
/// - **Async**: An `async fn` is awaited on the context's own runtime.
/// - **Cancellation**: With `cancellable`, the last parameter receives a
///   `CancellationToken` that fires when the context is killed.
///
/// # Example
///
/// ```rust,ignore
/// use offload::prelude::*;
///
/// /// Sum of 0..n
/// #[offload::callable]
/// pub fn sum_range(n: u64) -> u64 {
///     (0..n).sum()
/// }
///
/// #[offload::callable(name = "fetch", cancellable)]
/// pub fn fetch_all(urls: Vec<String>, token: CancellationToken) -> Result<usize, String> {
///     // ...
/// }
///
/// let table = CallableTable::new([SUM_RANGE, FETCH_ALL])?;
/// ```
///
/// The generated constant is the function name in upper case. The callable
/// is registered under the function name unless `name = "..."` is given.
#[proc_macro_attribute]
pub fn callable(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| options.parse(meta));
    parse_macro_input!(attr with parser);

    match expand(options, input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    name: Option<LitStr>,
    cancellable: bool,
}

impl Options {
    fn parse(&mut self, meta: syn::meta::ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("cancellable") {
            self.cancellable = true;
            Ok(())
        } else {
            Err(meta.error("expected `name = \"...\"` or `cancellable`"))
        }
    }
}

fn expand(options: Options, input: ItemFn) -> syn::Result<TokenStream2> {
    let sig = &input.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "callables cannot be generic",
        ));
    }
    if sig.asyncness.is_some() && options.cancellable {
        return Err(syn::Error::new_spanned(
            sig.asyncness,
            "async callables are cancelled by dropping them; remove `cancellable`",
        ));
    }

    let mut types = Vec::new();
    for arg in &sig.inputs {
        match arg {
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "callables cannot take `self`",
                ));
            }
            FnArg::Typed(typed) => {
                if let Type::Reference(reference) = typed.ty.as_ref() {
                    return Err(syn::Error::new_spanned(
                        reference,
                        "callable parameters must be owned; arguments are decoded by value",
                    ));
                }
                types.push(typed.ty.as_ref().clone());
            }
        }
    }

    // The token is passed through, not decoded.
    if options.cancellable && types.pop().is_none() {
        return Err(syn::Error::new(
            Span::call_site(),
            "a cancellable callable takes the CancellationToken as its last parameter",
        ));
    }

    let fn_name = &sig.ident;
    let vis = &input.vis;
    let const_name = format_ident!("{}", fn_name.to_string().to_uppercase());
    let name = options
        .name
        .unwrap_or_else(|| LitStr::new(&fn_name.to_string(), fn_name.span()));

    let bindings: Vec<_> = (0..types.len())
        .map(|i| format_ident!("__arg{}", i))
        .collect();
    let decode = if types.is_empty() {
        quote! { let _ = args; }
    } else {
        quote! { let (#(#bindings,)*): (#(#types,)*) = args.decode()?; }
    };

    let mut call_args = quote! { #(#bindings),* };
    if options.cancellable {
        call_args = if bindings.is_empty() {
            quote! { token }
        } else {
            quote! { #call_args, token }
        };
    }

    let call = if sig.asyncness.is_some() {
        quote! { #fn_name(#call_args).await }
    } else {
        quote! { #fn_name(#call_args) }
    };
    let finish = if returns_result(&sig.output) {
        quote! {
            let output = #call.map_err(|e| e.to_string())?;
            ::offload::encode_value(&output)
        }
    } else {
        quote! {
            let output = #call;
            ::offload::encode_value(&output)
        }
    };

    let doc = format!("Callable handle for [`{}`].", fn_name);
    let entry = if sig.asyncness.is_some() {
        quote! {
            fn __offload_entry(
                args: ::offload::Args,
            ) -> ::offload::LocalBoxFuture<'static, ::offload::CallOutcome> {
                ::std::boxed::Box::pin(async move {
                    #decode
                    #finish
                })
            }
            ::offload::Callable::future(#name, __offload_entry)
        }
    } else if options.cancellable {
        quote! {
            fn __offload_entry(
                args: ::offload::Args,
                token: ::offload::CancellationToken,
            ) -> ::offload::CallOutcome {
                #decode
                #finish
            }
            ::offload::Callable::cancellable(#name, __offload_entry)
        }
    } else {
        quote! {
            fn __offload_entry(args: ::offload::Args) -> ::offload::CallOutcome {
                #decode
                #finish
            }
            ::offload::Callable::blocking(#name, __offload_entry)
        }
    };

    Ok(quote! {
        #input

        #[doc = #doc]
        #vis const #const_name: ::offload::Callable = {
            #entry
        };
    })
}

/// Whether the return type is spelled `Result<..>` (any path ending in it).
fn returns_result(output: &ReturnType) -> bool {
    let ReturnType::Type(_, ty) = output else {
        return false;
    };
    match ty.as_ref() {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Result"),
        _ => false,
    }
}
