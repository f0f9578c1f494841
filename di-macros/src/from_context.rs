//! Implementation of #[derive(FromContext)] proc-macro.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields};

pub fn derive_from_context_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    // Parse #[from_context(Context = "MyContext")] attribute
    let context_type = match parse_context_type(&input) {
        Ok(ty) => ty,
        Err(err) => return err.to_compile_error().into(),
    };

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(
                    &input,
                    "FromContext can only be derived for structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(&input, "FromContext can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let mut field_inits = Vec::with_capacity(fields.len());
    for field in fields {
        let field_name = &field.ident;
        let field_type = &field.ty;

        let init = match is_default_field(field) {
            Ok(true) => quote! {
                #field_name: ::core::default::Default::default()
            },
            Ok(false) => quote! {
                #field_name: <#field_type as crate::FromRef<#context_type>>::from_ref(ctx)
            },
            Err(err) => return err.to_compile_error().into(),
        };
        field_inits.push(init);
    }

    let expanded = quote! {
        impl #impl_generics crate::FromRef<#context_type> for #name #ty_generics #where_clause {
            fn from_ref(ctx: &#context_type) -> Self {
                Self {
                    #(#field_inits),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// `#[from_context(default)]` on a field: not resolved from the context.
fn is_default_field(field: &Field) -> syn::Result<bool> {
    let mut default = false;
    for attr in &field.attrs {
        if attr.path().is_ident("from_context") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("default") {
                    default = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `default`"))
                }
            })?;
        }
    }
    Ok(default)
}

fn parse_context_type(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    for attr in &input.attrs {
        if attr.path().is_ident("from_context") {
            let mut context_ty: Option<syn::Type> = None;

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("Context") {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    context_ty = Some(value.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("expected `Context = \"...\"`"))
                }
            })?;

            if let Some(ty) = context_ty {
                return Ok(quote! { #ty });
            }
        }
    }

    // Default to `Context`
    Ok(quote! { Context })
}
