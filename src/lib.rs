//! Inline the above-the-fold CSS of every emitted HTML document, then
//! optionally prune the inlined rules from the stylesheets they came from.
//!
//! A [`Pipeline`] is configured once and started per build with
//! [`Pipeline::begin`]. The returned [`Build`] exposes the lifecycle hooks a
//! host calls: [`Build::on_html_generated`] for documents handed over by a
//! templating step, [`Build::on_optimize_assets`] once the asset table is
//! final, and [`Build::after_emit`] to collect the [`BuildReport`].

mod assets;
mod cache;
pub mod committer;
mod context;
mod diagnostics;
mod discovery;
mod engine;
pub mod error;
mod invoker;
mod ledger;
mod pipeline;
mod resolver;
#[cfg(test)]
mod testing;

pub use crate::assets::{Asset, AssetHandle, AssetTable};
pub use crate::cache::{StylesheetCache, StylesheetContent};
pub use crate::context::BuildContext;
pub use crate::diagnostics::{BuildReport, Diagnostics, Warning};
pub use crate::discovery::{Document, DocumentOrigin, DocumentProducer, HtmlPayload, ProducerHandle};
pub use crate::engine::{Candidate, EngineHandle, Extraction, ExtractionEngine, StylesheetDelta};
pub use crate::ledger::{PruneEntry, PruneLedger, Reference};
pub use crate::pipeline::{Build, BuildState, Pipeline, Schedule, Stage};
pub use crate::resolver::{ResolvedStylesheet, StylesheetOrigin, StylesheetPatterns, StylesheetRef};
pub use fold_config::Config;
pub use fold_storage::{BackendHandle, FileSystem};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Name every warning and error is reported under.
pub const PLUGIN_NAME: &str = "fold";
/// Upper bound on documents processed at the same time.
pub const MAX_PROCESS_CONCURRENCY: usize = 100;

/// Locks a short-lived, never-awaited-across mutex.
///
/// A panic while holding one of these locks leaves plain data behind (a map
/// or a list), never a half-applied invariant, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
