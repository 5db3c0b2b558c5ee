//! `#[tokio_timeout_test(secs)]` runs an async test on a dedicated thread with
//! its own current-thread runtime and fails it once `secs` elapse. Encoder
//! tests use it so a sink that never delivers shows up as a failure instead
//! of a hung test binary.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    match expand(attr, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<proc_macro2::TokenStream> {
    let secs = timeout_secs(attr)?;
    let mut function: ItemFn = syn::parse(item)?;
    if function.sig.asyncness.take().is_none() {
        return Err(syn::Error::new_spanned(
            &function.sig.ident,
            "tokio_timeout_test expects an async fn",
        ));
    }
    function.attrs.retain(|attr| !is_test_marker(attr));
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = function;

    Ok(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = ::std::time::Duration::from_secs(#secs);
            let (done_tx, done_rx) = ::std::sync::mpsc::channel();
            ::std::thread::spawn(move || {
                let outcome = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                    ::tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build test runtime")
                        .block_on(async {
                            if ::tokio::time::timeout(limit, async move #block).await.is_err() {
                                panic!("test timed out after {:?}", limit);
                            }
                        })
                }));
                let _ = done_tx.send(outcome);
            });
            // A blocked runtime never observes its own timer; guard from outside too.
            match done_rx.recv_timeout(limit + ::std::time::Duration::from_secs(1)) {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => ::std::panic::resume_unwind(panic),
                Err(_) => panic!("test did not finish within {:?}", limit),
            }
        }
    })
}

fn timeout_secs(attr: TokenStream) -> syn::Result<u64> {
    if attr.is_empty() {
        return Ok(DEFAULT_TIMEOUT_SECS);
    }
    let lit: LitInt = syn::parse(attr)?;
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new(
            Span::call_site(),
            "timeout must be greater than zero",
        ));
    }
    Ok(secs)
}

fn is_test_marker(attr: &Attribute) -> bool {
    let path = attr.path();
    path.is_ident("test")
        || (path.segments.len() == 2
            && path.segments[0].ident == "tokio"
            && path.segments[1].ident == "test")
}
