//! Proc macros for the `ospec` test runtime.

mod codegen;

/// Turn a suite definition function into the `main` of a test binary.
///
/// The function receives a fresh `ospec::Ospec` configured from the
/// environment (`OSPEC_TIMEOUT_MS`, `OSPEC_FAIL_ON_ONLY`). After it returns,
/// the suite runs with the default reporter and the process exits with the
/// number of failures (capped at 255).
///
/// # Setup
///
/// In `Cargo.toml`:
/// ```toml
/// [[test]]
/// name = "my_suite"
/// harness = false
/// ```
///
/// In `tests/my_suite.rs`:
/// ```text
/// #[ospec::main]
/// fn suite(o: &ospec::Ospec) {
///     o.spec("math", |o| {
///         o.test("add", |cx| {
///             cx.o(1 + 1).equals(2);
///         });
///     });
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let attr = proc_macro2::TokenStream::from(attr);
    let suite = syn::parse_macro_input!(item as syn::ItemFn);
    codegen::generate_main(attr, suite)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
