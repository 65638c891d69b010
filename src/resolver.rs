//! Working out which stylesheets a document should be checked against.

use crate::cache::StylesheetContent;
use crate::context::BuildContext;
use crate::discovery::Document;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fold_markup::{LinkHandle, asset_name, stylesheet_links};
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Where a stylesheet reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylesheetOrigin {
    /// Linked from the document and emitted by this build.
    PipelineAsset,
    /// Matched by one of the configured additional stylesheet patterns.
    PatternMatched,
    /// Linked from the document but only present in the output directory.
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetRef {
    /// Asset name, which is also the identity of the stylesheet in a build.
    pub name: String,
    /// Location relative to the output directory.
    pub path: PathBuf,
    pub origin: StylesheetOrigin,
    /// Every `<link>` the stylesheet was found at, in document order. Empty
    /// for pattern matches.
    pub links: Vec<LinkHandle>,
}

#[derive(Debug, Clone)]
pub struct ResolvedStylesheet {
    pub stylesheet: StylesheetRef,
    /// `None` when the stylesheet could not be read.
    pub content: Option<Arc<StylesheetContent>>,
}

/// Compiled `additional_stylesheets` globs.
///
/// Matching is case-sensitive, `*` never crosses a `/`, and a pattern
/// without any `/` is matched against the base name of an asset, so `*.css`
/// also matches `vendor/reset.css`.
#[derive(Debug, Default)]
pub struct StylesheetPatterns {
    patterns: Vec<Pattern>,
}

impl StylesheetPatterns {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| Pattern::new(&pattern.replace('\\', "/")).or_raise(|| ErrorKind::Config))
            .collect::<Result<_>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.replace('\\', "/");
        let basename = name.rsplit('/').next().unwrap_or(&name);
        self.patterns.iter().any(|pattern| {
            if pattern.as_str().contains('/') {
                pattern.matches_with(&name, MATCH_OPTIONS)
            } else {
                pattern.matches_with(basename, MATCH_OPTIONS)
            }
        })
    }
}

/// Every stylesheet `document` should be checked against, with its content.
///
/// Stylesheets linked from the markup come first, in document order, then
/// pattern-matched assets in name order. A name is only listed once, with
/// every `<link>` that points at it.
#[instrument(skip_all, fields(document = %document.name))]
pub async fn resolve(ctx: &BuildContext, document: &Document) -> Result<Vec<ResolvedStylesheet>> {
    let links = stylesheet_links(&document.html).or_raise(|| ErrorKind::Extraction(document.name.clone()))?;
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut stylesheets: Vec<StylesheetRef> = Vec::new();

    for link in links {
        let Some(name) = asset_name(&link.href, &ctx.config.public_path) else {
            tracing::debug!(href = %link.href, "Skipping stylesheet from another origin");
            continue;
        };
        if let Some(&index) = seen.get(&name) {
            stylesheets[index].links.push(link.handle);
            continue;
        }
        seen.insert(name.clone(), stylesheets.len());
        let origin = if ctx.assets.contains(&name).await {
            StylesheetOrigin::PipelineAsset
        } else {
            StylesheetOrigin::Filesystem
        };
        stylesheets.push(StylesheetRef { path: PathBuf::from(&name), name, origin, links: vec![link.handle] });
    }

    if !ctx.patterns.is_empty() {
        for name in ctx.assets.keys().await {
            if ctx.patterns.matches(&name) && !seen.contains_key(&name) {
                seen.insert(name.clone(), stylesheets.len());
                stylesheets.push(StylesheetRef {
                    path: PathBuf::from(&name),
                    name,
                    origin: StylesheetOrigin::PatternMatched,
                    links: Vec::new(),
                });
            }
        }
    }
    tracing::debug!(stylesheets = stylesheets.len(), "Stylesheets resolved");

    let contents = futures::future::join_all(stylesheets.iter().map(|s| ctx.cache.get(s, &document.name))).await;
    Ok(stylesheets
        .into_iter()
        .zip(contents)
        .map(|(stylesheet, content)| ResolvedStylesheet { stylesheet, content })
        .collect())
}
