//! Compile-time dependency injection macros for triplemap.
//!
//! This crate provides derive macros for DI:
//! - `#[derive(Context)]` to make a struct's fields extractable
//! - `#[derive(FromContext)]` to auto-resolve fields from a context
//!
//! Generated code references `crate::FromRef`, which the consuming crate
//! re-exports at its root.

use proc_macro::TokenStream;

mod context;
mod from_context;

/// Derive macro for creating a DI context.
///
/// When applied to a struct, generates `FromRef` implementations for each
/// field type, allowing them to be extracted from the context.
///
/// # Requirements
///
/// - All fields must implement `Clone`
/// - Field types must be distinct
///
/// # Example
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub config: Arc<Config>,
///     pub registry: Arc<Registry>,
///     pub executor: Arc<dyn SparqlExecutor>,
/// }
///
/// // Generated implementations:
/// // impl FromRef<Context> for Arc<Config> { ... }
/// // impl FromRef<Context> for Arc<Registry> { ... }
/// // impl FromRef<Context> for Arc<dyn SparqlExecutor> { ... }
/// ```
#[proc_macro_derive(Context)]
pub fn derive_context(input: TokenStream) -> TokenStream {
    context::derive_context_impl(input)
}

/// Derive macro for types that can be constructed from a context.
///
/// When applied to a struct, generates a `FromRef<Context>` implementation
/// that resolves each field by calling `FromRef::from_ref` on the context.
/// Fields marked `#[from_context(default)]` are set to `Default::default()`
/// instead, which suits markers and per-instance settings.
///
/// # Example
///
/// ```ignore
/// #[derive(FromContext)]
/// pub struct ResourceRepository<T> {
///     executor: Arc<dyn SparqlExecutor>,
///     registry: Arc<Registry>,
///     #[from_context(default)]
///     graph: Option<Iri>,
///     #[from_context(default)]
///     _marker: PhantomData<fn() -> T>,
/// }
/// ```
///
/// # Custom Context Type
///
/// ```ignore
/// #[derive(FromContext)]
/// #[from_context(Context = "TestContext")]
/// pub struct MyRepository {
///     executor: Arc<dyn SparqlExecutor>,
/// }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    from_context::derive_from_context_impl(input)
}
