//! Derive macros for the script VM crate.
//!
//! Provides `#[derive(Error)]`, which generates `Display` and `std::error::Error`
//! for fault and diagnostic enums.

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` from per-variant `#[error("...")]` messages.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
