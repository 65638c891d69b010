//! HTML markup handling for stylesheet inlining.
//!
//! The pipeline never builds a DOM. It needs exactly two things from a
//! document's markup: which stylesheets it links to, and a way to remove
//! those links once the stylesheet has been fully inlined.

mod consts;
pub mod error;
mod href;
mod links;

pub use crate::href::asset_name;
pub use crate::links::{Detached, LinkHandle, StylesheetLink, detach_links, stylesheet_links};

/// Whether an emitted asset name is an HTML document.
///
/// ```
/// assert!(fold_markup::is_html("about/index.html"));
/// assert!(!fold_markup::is_html("index.htm"));
/// assert!(!fold_markup::is_html("main.css"));
/// ```
pub fn is_html(name: &str) -> bool {
    name.ends_with(".html")
}
