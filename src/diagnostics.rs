//! Warnings and errors collected over one build.

use crate::error::Error;
use crate::{PLUGIN_NAME, lock};
use derive_more::Display;
use std::path::PathBuf;
use std::sync::Mutex;

/// Non-fatal conditions. Processing continues past every one of them.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Neither the asset table nor a producer yielded a single document.
    #[display("Could not find any HTML asset.")]
    NoHtmlAssets,
    /// An HTML asset with no content; it is skipped.
    #[display("Empty HTML asset \"{_0}\" skipped.")]
    EmptyHtmlAsset(String),
    /// An HTML asset disappeared between being listed and being read.
    #[display("HTML asset \"{_0}\" is no longer in the asset table.")]
    MissingHtmlAsset(String),
    /// A stylesheet could not be read; the document is processed without it.
    #[display("Unable to locate stylesheet: {} (referenced by \"{document}\")", path.display())]
    StylesheetUnavailable { path: PathBuf, document: String },
}

/// Everything a build has to say once it is over.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub errors: Vec<Error>,
    pub warnings: Vec<Warning>,
    /// Documents whose rewritten HTML was committed.
    pub documents: usize,
}
impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Thread-safe sink for the warnings and errors of one build.
///
/// Every entry is also emitted as a `tracing` event under [`PLUGIN_NAME`].
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Mutex<Vec<Error>>,
    warnings: Mutex<Vec<Warning>>,
}

impl Diagnostics {
    pub fn warn(&self, warning: Warning) {
        tracing::warn!(target: PLUGIN_NAME, "{warning}");
        lock(&self.warnings).push(warning);
    }

    pub fn error(&self, error: Error) {
        tracing::error!(target: PLUGIN_NAME, error = ?error, "{}", *error);
        lock(&self.errors).push(error);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        lock(&self.warnings).clone()
    }

    pub fn error_count(&self) -> usize {
        lock(&self.errors).len()
    }

    /// Drain both lists into a report.
    pub(crate) fn report(&self, documents: usize) -> BuildReport {
        BuildReport {
            errors: std::mem::take(&mut *lock(&self.errors)),
            warnings: std::mem::take(&mut *lock(&self.warnings)),
            documents,
        }
    }
}
