//! The host's asset table: every output the build will emit, by name.

use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One emitted output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    content: Arc<[u8]>,
}
impl Asset {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self { content: Arc::from(content.into()) }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> u64 {
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        u64::try_from(self.content.len()).unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Name-keyed asset storage shared by every document task of a build.
///
/// Names iterate in lexicographic order, so discovery is deterministic.
#[derive(Debug, Default)]
pub struct AssetTable {
    assets: RwLock<BTreeMap<String, Asset>>,
}
pub type AssetHandle = Arc<AssetTable>;

impl AssetTable {
    pub fn with_assets(assets: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let assets = assets.into_iter().map(|(name, content)| (name.into(), Asset::new(content))).collect();
        Self { assets: RwLock::new(assets) }
    }

    pub async fn get(&self, name: &str) -> Option<Asset> {
        self.assets.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.assets.read().await.contains_key(name)
    }

    /// Emit a new asset, replacing any asset of the same name.
    pub async fn insert(&self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.assets.write().await.insert(name.into(), Asset::new(content));
    }

    /// Replace the content of an existing asset.
    ///
    /// Fails with [`ErrorKind::AssetNotFound`] when nothing by that name has
    /// been emitted; updating is not a way to create assets.
    pub async fn update(&self, name: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let mut assets = self.assets.write().await;
        let Some(asset) = assets.get_mut(name) else {
            exn::bail!(ErrorKind::AssetNotFound(name.to_string()));
        };
        *asset = Asset::new(content);
        Ok(())
    }

    /// Returns `true` if an asset was removed.
    pub async fn delete(&self, name: &str) -> bool {
        self.assets.write().await.remove(name).is_some()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.assets.read().await.keys().cloned().collect()
    }
}
