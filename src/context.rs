use crate::assets::AssetHandle;
use crate::cache::StylesheetCache;
use crate::diagnostics::Diagnostics;
use crate::engine::EngineHandle;
use crate::ledger::PruneLedger;
use crate::lock;
use crate::resolver::StylesheetPatterns;
use fold_config::Config;
use fold_storage::BackendHandle;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// State owned by exactly one build.
///
/// Created by [`Pipeline::begin`](crate::Pipeline::begin) and handed by
/// reference to every stage. Nothing in here outlives the build.
pub struct BuildContext {
    pub config: Arc<Config>,
    pub patterns: Arc<StylesheetPatterns>,
    pub assets: AssetHandle,
    pub fs: BackendHandle,
    pub engine: EngineHandle,
    pub cache: StylesheetCache,
    pub ledger: PruneLedger,
    pub diagnostics: Arc<Diagnostics>,
    processed: Mutex<HashSet<String>>,
    committed: AtomicUsize,
}

impl BuildContext {
    pub(crate) fn new(
        config: Arc<Config>,
        patterns: Arc<StylesheetPatterns>,
        assets: AssetHandle,
        fs: BackendHandle,
        engine: EngineHandle,
    ) -> Self {
        let diagnostics = Arc::new(Diagnostics::default());
        Self {
            cache: StylesheetCache::new(assets.clone(), fs.clone(), diagnostics.clone()),
            ledger: PruneLedger::default(),
            config,
            patterns,
            assets,
            fs,
            engine,
            diagnostics,
            processed: Mutex::new(HashSet::new()),
            committed: AtomicUsize::new(0),
        }
    }

    /// Claim a document name for this build. Only the first claim succeeds.
    pub(crate) fn claim(&self, name: &str) -> bool {
        lock(&self.processed).insert(name.to_string())
    }

    /// `true` once any document has been claimed in this build.
    pub(crate) fn has_processed(&self) -> bool {
        !lock(&self.processed).is_empty()
    }

    pub(crate) fn mark_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Documents rewritten so far.
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::Relaxed)
    }
}
