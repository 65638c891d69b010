//! Applying extraction results to the build's outputs.
//!
//! Rewritten HTML is committed as soon as a document is processed.
//! Stylesheets are only touched by [`prune`], once every document is done.

use crate::context::BuildContext;
use crate::diagnostics::Warning;
use crate::discovery::{Document, DocumentOrigin};
use crate::engine::StylesheetDelta;
use crate::error::{ErrorKind, Result};
use crate::ledger::PruneEntry;
use crate::resolver::StylesheetRef;
use exn::ResultExt;
use fold_markup::{LinkHandle, asset_name, detach_links, stylesheet_links};
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

/// Give `document` its rewritten HTML.
///
/// Asset documents are replaced in the asset table; template documents only
/// change in memory and are handed back to their producer by the caller.
/// Returns `false` if the asset disappeared before it could be replaced.
#[instrument(skip_all, fields(document = %document.name))]
pub async fn commit_document(ctx: &BuildContext, document: &mut Document, html: String) -> Result<bool> {
    if document.origin == DocumentOrigin::Asset {
        match ctx.assets.update(&document.name, html.as_bytes().to_vec()).await {
            Ok(()) => {},
            Err(e) if matches!(*e, ErrorKind::AssetNotFound(_)) => {
                ctx.diagnostics.warn(Warning::MissingHtmlAsset(document.name.clone()));
                return Ok(false);
            },
            Err(e) => return Err(e.raise(ErrorKind::WriteBack(document.name.clone()))),
        }
    }
    document.html = html;
    ctx.mark_committed();
    tracing::info!(origin = ?document.origin, "Document rewritten");
    Ok(true)
}

/// Remember what `document` left of each stylesheet, for pruning.
pub fn record(ctx: &BuildContext, document: &str, stylesheets: &[(StylesheetRef, StylesheetDelta)]) {
    if !ctx.config.prune_source {
        return;
    }
    for (stylesheet, delta) in stylesheets {
        ctx.ledger.record(document, stylesheet, delta);
    }
}

/// Protect every stylesheet `document` links to from pruning.
///
/// Used for documents that could not be rewritten: they still rely on
/// their stylesheets in full.
pub fn retain(ctx: &BuildContext, document: &Document) {
    if !ctx.config.prune_source {
        return;
    }
    match stylesheet_links(&document.html) {
        Ok(links) => {
            for name in links.iter().filter_map(|link| asset_name(&link.href, &ctx.config.public_path)) {
                tracing::debug!(document = %document.name, stylesheet = %name, "Stylesheet retained");
                ctx.ledger.retain(&name);
            }
        },
        Err(e) => tracing::warn!(document = %document.name, error = ?e, "Unable to list stylesheets to retain"),
    }
}

/// Overwrite a stylesheet with `css`, in the asset table if it is there
/// now, otherwise on the filesystem.
#[instrument(skip_all, fields(stylesheet = %stylesheet.name))]
pub async fn update_stylesheet(ctx: &BuildContext, stylesheet: &StylesheetRef, css: &str) -> Result<()> {
    if ctx.assets.contains(&stylesheet.name).await {
        ctx.assets
            .update(&stylesheet.name, css.as_bytes().to_vec())
            .await
            .or_raise(|| ErrorKind::WriteBack(stylesheet.name.clone()))?;
    } else {
        ctx.fs
            .write(&stylesheet.path, css.as_bytes())
            .await
            .or_raise(|| ErrorKind::WriteBack(stylesheet.name.clone()))?;
    }
    tracing::info!(size = css.len(), "Stylesheet reduced");
    Ok(())
}

/// Detach a fully inlined stylesheet from its documents, then delete it.
///
/// Returns `false` if the stylesheet was kept: it is not eligible, or a
/// document could not be updated, in which case deleting it would leave a
/// dangling `<link>` behind.
pub async fn remove_stylesheet(ctx: &BuildContext, entry: &PruneEntry) -> Result<bool> {
    remove_stylesheets(ctx, &[entry]).await.pop().unwrap_or(Ok(false))
}

/// Write back remainders and remove consumed stylesheets.
///
/// Must only run after every document of the build has been processed.
/// Draining the ledger makes a second call a no-op.
#[instrument(skip_all)]
pub async fn prune(ctx: &BuildContext) {
    let entries = ctx.ledger.drain();
    tracing::debug!(stylesheets = entries.len(), "Pruning stylesheets");

    let updates = entries
        .iter()
        .filter_map(|entry| entry.remainder().map(|css| update_stylesheet(ctx, &entry.stylesheet, css)));
    for result in futures::future::join_all(updates).await {
        if let Err(e) = result {
            ctx.diagnostics.error(e);
        }
    }

    let consumed: Vec<&PruneEntry> = entries.iter().filter(|entry| entry.is_consumed()).collect();
    for result in remove_stylesheets(ctx, &consumed).await {
        if let Err(e) = result {
            ctx.diagnostics.error(e);
        }
    }
}

fn is_removable(entry: &PruneEntry) -> bool {
    entry.is_consumed() && !entry.references.is_empty() && entry.references.iter().all(|r| !r.links.is_empty())
}

/// Links are detached one document at a time, with every handle for that
/// document in a single pass, so stylesheets removed from the same document
/// never overwrite each other's edits.
async fn remove_stylesheets(ctx: &BuildContext, entries: &[&PruneEntry]) -> Vec<Result<bool>> {
    let mut by_document: BTreeMap<&str, Vec<LinkHandle>> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| is_removable(entry)) {
        for (document, link) in entry.links() {
            by_document.entry(document).or_default().push(link.clone());
        }
    }

    let detachments = by_document.into_iter().map(|(document, links)| async move {
        match detach_from_document(ctx, document, &links).await {
            Ok(true) => None,
            Ok(false) => Some(document),
            Err(e) => {
                ctx.diagnostics.error(e);
                Some(document)
            },
        }
    });
    let failed: HashSet<&str> = futures::future::join_all(detachments).await.into_iter().flatten().collect();

    let deletions = entries.iter().map(|entry| {
        let failed = &failed;
        async move {
            if !is_removable(entry) {
                tracing::debug!(stylesheet = %entry.stylesheet.name, "Stylesheet still needed, kept");
                return Ok(false);
            }
            if let Some((document, _)) = entry.links().find(|(document, _)| failed.contains(document)) {
                tracing::debug!(stylesheet = %entry.stylesheet.name, document, "Stylesheet still linked, kept");
                return Ok(false);
            }
            delete_stylesheet(ctx, &entry.stylesheet).await.map(|()| true)
        }
    });
    futures::future::join_all(deletions).await
}

/// Returns `false`, leaving the document untouched, if it is no longer in
/// the asset table or any of `links` is no longer a stylesheet `<link>` in it.
async fn detach_from_document(ctx: &BuildContext, document: &str, links: &[LinkHandle]) -> Result<bool> {
    let Some(asset) = ctx.assets.get(document).await else {
        ctx.diagnostics.warn(Warning::MissingHtmlAsset(document.to_string()));
        return Ok(false);
    };
    let detached = detach_links(&asset.text(), links).or_raise(|| ErrorKind::WriteBack(document.to_string()))?;
    if !detached.is_complete() {
        let unmatched: Vec<&str> = detached.unmatched.iter().map(LinkHandle::href).collect();
        tracing::debug!(document, ?unmatched, "Stylesheet links no longer found, document left as is");
        return Ok(false);
    }
    if detached.removed > 0 {
        ctx.assets
            .update(document, detached.html.into_bytes())
            .await
            .or_raise(|| ErrorKind::WriteBack(document.to_string()))?;
    }
    tracing::debug!(document, removed = detached.removed, "Stylesheet links detached");
    Ok(true)
}

#[instrument(skip_all, fields(stylesheet = %stylesheet.name))]
async fn delete_stylesheet(ctx: &BuildContext, stylesheet: &StylesheetRef) -> Result<()> {
    if ctx.assets.delete(&stylesheet.name).await {
        tracing::info!("Stylesheet asset removed");
        return Ok(());
    }
    match ctx.fs.delete(&stylesheet.path).await {
        Ok(()) => tracing::info!(backend = ctx.fs.name(), "Stylesheet file removed"),
        Err(e) if e.is_not_found() => tracing::debug!("Stylesheet already gone"),
        Err(e) => return Err(e).or_raise(|| ErrorKind::WriteBack(stylesheet.name.clone())),
    }
    Ok(())
}
