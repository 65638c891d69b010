//! Scanning and detaching `<link rel="stylesheet">` elements.
//!
//! Both operations stream the document through [`lol_html`], so markup that
//! isn't touched comes out byte-for-byte identical.

use crate::consts::{LINK_SELECTOR, STYLESHEET_REL};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lol_html::html_content::Element;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::instrument;

/// Opaque reference to a stylesheet `<link>` inside one document.
///
/// Only obtainable from [`stylesheet_links`]; pass it back to
/// [`detach_links`] to remove the element it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkHandle {
    href: String,
}
impl LinkHandle {
    /// The `href` attribute value, trimmed, exactly as found in the markup.
    pub fn href(&self) -> &str {
        &self.href
    }
}

/// A stylesheet `<link>` discovered in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetLink {
    pub href: String,
    pub handle: LinkHandle,
}

/// The outcome of [`detach_links`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    pub html: String,
    /// Number of `<link>` elements removed.
    pub removed: usize,
    /// Handles that did not match any stylesheet `<link>`.
    pub unmatched: Vec<LinkHandle>,
}

impl Detached {
    /// `true` if every handle removed at least one element.
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

fn stylesheet_href(el: &Element<'_, '_>) -> Option<String> {
    let rel = el.get_attribute("rel")?;
    if !rel.split_ascii_whitespace().any(|token| token.eq_ignore_ascii_case(STYLESHEET_REL)) {
        return None;
    }
    let href = el.get_attribute("href")?;
    let href = href.trim();
    (!href.is_empty()).then(|| href.to_string())
}

/// Lists every `<link rel="stylesheet" href="...">` in document order.
///
/// ```
/// use fold_markup::stylesheet_links;
///
/// let html = r#"<head><link rel="stylesheet" href="/main.css"><link rel="icon" href="/x.ico"></head>"#;
/// let links = stylesheet_links(html).unwrap();
/// assert_eq!(links.len(), 1);
/// assert_eq!(links[0].href, "/main.css");
/// ```
#[instrument(level = "trace", skip(html), fields(html_size = html.len()))]
pub fn stylesheet_links(html: &str) -> Result<Vec<StylesheetLink>> {
    let mut links = Vec::new();
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(LINK_SELECTOR, |el| {
                if let Some(href) = stylesheet_href(el) {
                    let handle = LinkHandle { href: href.clone() };
                    links.push(StylesheetLink { href, handle });
                }
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .or_raise(|| ErrorKind::Rewrite)?;
    Ok(links)
}

/// Removes the stylesheet `<link>` elements referenced by `handles`.
///
/// Handles that no longer match anything (the element was already removed,
/// or rewritten by someone else) are reported in [`Detached::unmatched`].
#[instrument(level = "trace", skip(html, handles), fields(html_size = html.len(), handles = handles.len()))]
pub fn detach_links(html: &str, handles: &[LinkHandle]) -> Result<Detached> {
    let mut removed = 0;
    let mut matched = vec![false; handles.len()];
    let html = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(LINK_SELECTOR, |el| {
                let Some(href) = stylesheet_href(el) else {
                    return Ok(());
                };
                let mut hit = false;
                for (handle, found) in handles.iter().zip(matched.iter_mut()) {
                    if handle.href == href {
                        *found = true;
                        hit = true;
                    }
                }
                if hit {
                    el.remove();
                    removed += 1;
                }
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .or_raise(|| ErrorKind::Rewrite)?;
    let unmatched = handles
        .iter()
        .zip(matched)
        .filter(|(_, found)| !found)
        .map(|(handle, _)| handle.clone())
        .collect();
    Ok(Detached { html, removed, unmatched })
}
