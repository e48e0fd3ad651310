#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros for the Amora infrastructure crates.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! amora-derive.workspace = true
//! thiserror.workspace = true
//! ```
//!
//! The generated code refers to `::thiserror`, so consuming crates must depend on it directly.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Attribute macro for defining the error enum of a crate.
///
/// Turns a plain enum into a `thiserror` error wired for context propagation.
///
/// # Generated Items
///
/// * `#[derive(Debug, thiserror::Error)]` unless already derived.
/// * `<ErrorName>Ext` trait with `.context(...)` for `Result<T, ErrorName>` and for
///   `Result<T, SourceError>` of every variant that carries a source field.
/// * `From<SourceError>` for every such variant, so `?` converts upstream errors.
/// * `From<&'static str>` and `From<String>` when an `Internal` variant is present.
/// * A private `format_context` helper for `#[error(...)]` strings.
/// * `type Result<T, E = ErrorName>` in the same module when invoked as `#[amora_error(result)]`.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum** with **named-field** variants.
/// 2. A variant that wraps an upstream error (a field named `source`, or marked `#[source]` /
///    `#[from]`) must also carry `context: Option<Cow<'static, str>>`.
///
/// # Example
///
/// ```rust,ignore
/// use amora_derive::amora_error;
/// use std::borrow::Cow;
///
/// #[amora_error(result)]
/// pub enum MediaError {
///     #[error("I/O failure{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn load(path: &std::path::Path) -> Result<Vec<u8>> {
///     std::fs::read(path).context("Reading media index")
/// }
/// ```
#[proc_macro_attribute]
pub fn amora_error(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand(args.into(), input).into()
}
