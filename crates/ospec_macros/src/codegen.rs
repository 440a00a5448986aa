//! Code generation for `#[ospec::main]`.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::spanned::Spanned;
use syn::{Ident, ItemFn};

pub fn generate_main(attr: TokenStream, mut suite: ItemFn) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new(
            attr.span(),
            "#[ospec::main] does not take arguments",
        ));
    }
    validate_signature(&suite)?;

    // The suite becomes an item local to the generated `main`, so it may
    // itself be called `main`.
    let ident = Ident::new("__ospec_suite", Span::call_site());
    suite.sig.ident = ident.clone();

    Ok(quote! {
        fn main() {
            #suite

            let config = match ::ospec::RunConfig::from_env() {
                ::std::result::Result::Ok(config) => config,
                ::std::result::Result::Err(err) => {
                    ::std::eprintln!("ospec: {err}");
                    ::std::process::exit(2);
                }
            };
            let ospec = ::ospec::Ospec::with_config(config);
            #ident(&ospec);
            let failures = ospec.run();
            ::std::process::exit(failures.min(255) as i32);
        }
    })
}

fn validate_signature(suite: &ItemFn) -> syn::Result<()> {
    let sig = &suite.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "the suite function builds the spec tree and cannot be async",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "the suite function cannot be generic",
        ));
    }
    if sig.inputs.len() != 1 {
        return Err(syn::Error::new(
            sig.inputs.span(),
            "the suite function takes exactly one argument: `o: &ospec::Ospec`",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<String> {
        let suite: ItemFn = syn::parse2(item).unwrap();
        generate_main(attr, suite).map(|tokens| tokens.to_string())
    }

    #[test]
    fn test_renames_suite_and_runs_it() {
        let out = expand(
            TokenStream::new(),
            quote! { fn main(o: &ospec::Ospec) { o.test("t", |_| ()); } },
        )
        .unwrap();
        assert!(out.contains("fn __ospec_suite"));
        assert_eq!(out.matches("__ospec_suite").count(), 2);
        assert!(out.contains("from_env"));
    }

    #[test]
    fn test_rejects_arguments() {
        let err = expand(quote! { fast }, quote! { fn suite(o: &ospec::Ospec) {} }).unwrap_err();
        assert_eq!(err.to_string(), "#[ospec::main] does not take arguments");
    }

    #[test]
    fn test_rejects_async_and_wrong_arity() {
        let err = expand(TokenStream::new(), quote! { async fn suite(o: &ospec::Ospec) {} })
            .unwrap_err();
        assert!(err.to_string().contains("cannot be async"));

        let err = expand(TokenStream::new(), quote! { fn suite() {} }).unwrap_err();
        assert!(err.to_string().contains("exactly one argument"));
    }
}
