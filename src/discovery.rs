//! Finding the HTML documents of a build.
//!
//! Documents arrive two ways: [`DocumentProducer`]s hand over payloads before
//! the outputs are finalised (a templating step, say), and the asset table
//! is scanned for `.html` outputs afterwards. Both become a [`Document`].

use crate::context::BuildContext;
use crate::diagnostics::Warning;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// HTML handed over by a producer, and handed back once processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPayload {
    pub output_name: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// From a producer; the rewritten HTML replaces the payload in place.
    Template,
    /// From the asset table; the rewritten HTML replaces the asset.
    Asset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub html: String,
    pub origin: DocumentOrigin,
}

impl Document {
    pub fn from_payload(payload: HtmlPayload) -> Self {
        Self { name: payload.output_name, html: payload.html, origin: DocumentOrigin::Template }
    }

    pub fn into_payload(self) -> HtmlPayload {
        HtmlPayload { output_name: self.name, html: self.html }
    }

    pub(crate) fn asset(name: impl Into<String>, html: impl Into<String>) -> Self {
        Self { name: name.into(), html: html.into(), origin: DocumentOrigin::Asset }
    }
}

/// A source of HTML documents that exist before the asset table is final.
///
/// Registered with [`Pipeline::register_producer`](crate::Pipeline::register_producer).
/// Every payload returned by [`produce`](Self::produce) is passed back to
/// [`commit`](Self::commit) exactly once: rewritten on success, untouched if
/// processing failed.
#[async_trait]
pub trait DocumentProducer: Send + Sync {
    /// Name of the producer, used for logging only.
    fn name(&self) -> &str;

    async fn produce(&self) -> Result<Vec<HtmlPayload>>;

    async fn commit(&self, payload: HtmlPayload) -> Result<()>;
}
pub type ProducerHandle = Arc<dyn DocumentProducer>;

/// Every non-empty `.html` output in the asset table, in name order.
#[instrument(skip_all)]
pub async fn find_html_assets(ctx: &BuildContext) -> Vec<Document> {
    let mut documents = Vec::new();
    for name in ctx.assets.keys().await.into_iter().filter(|name| fold_markup::is_html(name)) {
        match ctx.assets.get(&name).await {
            None => ctx.diagnostics.warn(Warning::MissingHtmlAsset(name)),
            Some(asset) if asset.is_empty() => ctx.diagnostics.warn(Warning::EmptyHtmlAsset(name)),
            Some(asset) => documents.push(Document::asset(name, asset.text())),
        }
    }
    tracing::debug!(documents = documents.len(), "HTML assets found");
    documents
}
