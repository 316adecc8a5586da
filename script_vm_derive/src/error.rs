//! `#[derive(Error)]` for enums and structs.
//!
//! ```ignore
//! use script_vm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum FaultKind {
//!     #[error("unknown opcode 0x{opcode:02x} at {offset}")]
//!     UnknownOpcode { opcode: u8, offset: usize },
//!
//!     #[error("missing script {0}")]
//!     MissingScript(String),
//!
//!     #[error("division by zero")]
//!     DivisionByZero,
//! }
//! ```
//!
//! Only the fields a message actually names are bound, so variants may carry
//! context that the message leaves out.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let ident = &variant.ident;
                    let message = message_of(&variant.attrs, ident)?;
                    let (pattern, write) = display_fields(&variant.fields, &message)?;
                    Ok(quote! { Self::#ident #pattern => #write, })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            if arms.is_empty() {
                quote! { match *self {} }
            } else {
                quote! { match self { #(#arms)* } }
            }
        }
        Data::Struct(data) => {
            let message = message_of(&input.attrs, name)?;
            let (pattern, write) = display_fields(&data.fields, &message)?;
            quote! {
                let Self #pattern = self;
                #write
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "#[derive(Error)] cannot be used on unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Reads the string literal out of `#[error("...")]`.
fn message_of(attrs: &[Attribute], owner: &Ident) -> syn::Result<LitStr> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                owner,
                format!("`{owner}` needs an #[error(\"...\")] message"),
            )
        })?;
    attr.parse_args::<LitStr>().map_err(|_| {
        syn::Error::new_spanned(
            attr,
            "expected a string literal, e.g. #[error(\"stack underflow at depth {depth}\")]",
        )
    })
}

/// Builds the destructuring pattern and the `write!` call for one set of fields.
fn display_fields(fields: &Fields, message: &LitStr) -> syn::Result<(TokenStream2, TokenStream2)> {
    let text = message.value();
    let names = placeholders(&text, message.span())?;

    match fields {
        Fields::Unit => {
            if let Some(name) = names.first() {
                return Err(syn::Error::new(
                    message.span(),
                    format!("`{{{name}}}` refers to a field, but there are none"),
                ));
            }
            Ok((quote! {}, quote! { write!(f, #message) }))
        }
        Fields::Named(named) => {
            let mut bound: Vec<Ident> = Vec::new();
            for name in &names {
                let field = named
                    .named
                    .iter()
                    .filter_map(|field| field.ident.as_ref())
                    .find(|ident| *ident == name.as_str())
                    .ok_or_else(|| {
                        syn::Error::new(message.span(), format!("no field named `{name}`"))
                    })?;
                if !bound.contains(field) {
                    bound.push(field.clone());
                }
            }
            let pattern = quote! { { #(#bound,)* .. } };
            let lit = LitStr::new(&text, message.span());
            let write = quote! { write!(f, #lit, #(#bound = #bound),*) };
            Ok((pattern, write))
        }
        Fields::Unnamed(unnamed) => {
            let count = unnamed.unnamed.len();
            let slots: Vec<Ident> = (0..count).map(|i| format_ident!("_f{}", i)).collect();
            let mut rewritten = text.clone();
            let mut used: Vec<Ident> = Vec::new();
            for name in &names {
                let index: usize = name.parse().map_err(|_| {
                    syn::Error::new(
                        message.span(),
                        format!("tuple fields are referenced by position, found `{name}`"),
                    )
                })?;
                let slot = slots.get(index).ok_or_else(|| {
                    syn::Error::new(message.span(), format!("no field at position {index}"))
                })?;
                if !used.contains(slot) {
                    used.push(slot.clone());
                }
            }
            for (index, slot) in slots.iter().enumerate().rev() {
                rewritten = rewritten
                    .replace(&format!("{{{index}}}"), &format!("{{{slot}}}"))
                    .replace(&format!("{{{index}:"), &format!("{{{slot}:"));
            }
            let lit = LitStr::new(&rewritten, message.span());
            let pattern = quote! { ( #(#slots),* ) };
            let write = quote! { write!(f, #lit, #(#used = #used),*) };
            Ok((pattern, write))
        }
    }
}

/// Collects the argument names used by `{name}` / `{name:spec}` placeholders.
fn placeholders(text: &str, span: Span) -> syn::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(syn::Error::new(span, "unterminated `{` in message"));
                }
                let name = name.split(':').next().unwrap_or_default().trim().to_string();
                if name.is_empty() {
                    return Err(syn::Error::new(
                        span,
                        "implicit `{}` placeholders are not supported; name the field",
                    ));
                }
                names.push(name);
            }
            _ => {}
        }
    }
    Ok(names)
}
