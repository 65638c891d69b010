use crate::context::BuildContext;
use crate::discovery::Document;
use crate::engine::{Candidate, StylesheetDelta};
use crate::error::{ErrorKind, Result};
use crate::resolver::{StylesheetRef, resolve};
use exn::ResultExt;
use tracing::instrument;

/// The outcome of running one document through the engine.
#[derive(Debug, Clone)]
pub struct Processed {
    pub html: String,
    /// One entry per stylesheet the engine was offered.
    pub stylesheets: Vec<(StylesheetRef, StylesheetDelta)>,
}

/// Resolve the stylesheets of `document` and extract its critical CSS.
///
/// Stylesheets that could not be read are not offered to the engine and do
/// not appear in the result, so they are never pruned.
#[instrument(skip_all, fields(document = %document.name))]
pub async fn process(ctx: &BuildContext, document: &Document) -> Result<Processed> {
    let mut offered = Vec::new();
    let mut candidates = Vec::new();
    for resolved in resolve(ctx, document).await? {
        if let Some(content) = resolved.content {
            candidates.push(Candidate { name: resolved.stylesheet.name.clone(), content });
            offered.push(resolved.stylesheet);
        }
    }

    let extraction = ctx
        .engine
        .extract(&document.html, &candidates)
        .await
        .or_raise(|| ErrorKind::Extraction(document.name.clone()))?;

    let mut deltas = extraction.stylesheets;
    let stylesheets: Vec<_> = offered
        .into_iter()
        .map(|stylesheet| {
            let delta = deltas.remove(&stylesheet.name).unwrap_or(StylesheetDelta::Unchanged);
            (stylesheet, delta)
        })
        .collect();
    if !deltas.is_empty() {
        tracing::debug!(ignored = ?deltas.keys().collect::<Vec<_>>(), "Engine reported stylesheets it was not offered");
    }
    tracing::debug!(candidates = candidates.len(), "Critical CSS extracted");

    Ok(Processed { html: extraction.html, stylesheets })
}
