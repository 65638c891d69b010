//! Per-build stylesheet cache.
//!
//! The first request for a stylesheet installs its retrieval as a shared
//! future *before* anything is awaited, so every concurrent request for the
//! same name awaits that one retrieval. Failed retrievals are cached too.

use crate::assets::AssetHandle;
use crate::diagnostics::{Diagnostics, Warning};
use crate::lock;
use crate::resolver::StylesheetRef;
use fold_storage::BackendHandle;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetContent {
    pub content: String,
    pub size: u64,
}
impl StylesheetContent {
    fn from_bytes(bytes: Vec<u8>) -> Self {
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        let content = String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
        Self { content, size }
    }
}

type Retrieval = Shared<BoxFuture<'static, Option<Arc<StylesheetContent>>>>;

pub struct StylesheetCache {
    assets: AssetHandle,
    fs: BackendHandle,
    diagnostics: Arc<Diagnostics>,
    entries: Mutex<HashMap<String, Retrieval>>,
}

impl StylesheetCache {
    pub fn new(assets: AssetHandle, fs: BackendHandle, diagnostics: Arc<Diagnostics>) -> Self {
        Self { assets, fs, diagnostics, entries: Mutex::new(HashMap::new()) }
    }

    /// Content of `stylesheet`, or `None` if it could not be read.
    ///
    /// `document` is only used to attribute the warning raised when the
    /// stylesheet is unavailable; the outcome is shared by every document.
    #[instrument(level = "trace", skip_all, fields(stylesheet = %stylesheet.name))]
    pub async fn get(&self, stylesheet: &StylesheetRef, document: &str) -> Option<Arc<StylesheetContent>> {
        let retrieval = {
            let mut entries = lock(&self.entries);
            match entries.get(&stylesheet.name) {
                Some(retrieval) => {
                    tracing::trace!("Cache hit");
                    retrieval.clone()
                },
                None => {
                    let retrieval = retrieve(
                        self.assets.clone(),
                        self.fs.clone(),
                        self.diagnostics.clone(),
                        stylesheet.name.clone(),
                        stylesheet.path.clone(),
                        document.to_string(),
                    )
                    .boxed()
                    .shared();
                    entries.insert(stylesheet.name.clone(), retrieval.clone());
                    retrieval
                },
            }
        };
        retrieval.await
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

async fn retrieve(
    assets: AssetHandle,
    fs: BackendHandle,
    diagnostics: Arc<Diagnostics>,
    name: String,
    path: PathBuf,
    document: String,
) -> Option<Arc<StylesheetContent>> {
    if let Some(asset) = assets.get(&name).await {
        tracing::debug!(stylesheet = %name, size = asset.size(), "Stylesheet read from asset table");
        return Some(Arc::new(StylesheetContent::from_bytes(asset.content().to_vec())));
    }
    match fs.read(&path).await {
        Ok(bytes) => {
            tracing::debug!(stylesheet = %name, backend = fs.name(), size = bytes.len(), "Stylesheet read from filesystem");
            Some(Arc::new(StylesheetContent::from_bytes(bytes)))
        },
        Err(e) => {
            tracing::debug!(stylesheet = %name, error = ?e, "Stylesheet read failed");
            diagnostics.warn(Warning::StylesheetUnavailable { path, document });
            None
        },
    }
}
