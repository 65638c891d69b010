//! In-memory filesystem backend for testing.

use crate::FileSystem;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// A filesystem operation observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Read(PathBuf),
    Write(PathBuf),
    Delete(PathBuf),
}

/// In-memory filesystem backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// operate on `&self`. Every read, write and delete is appended to an
/// operation log, which lets tests assert *how often* and *in which order*
/// the pipeline touched the filesystem.
///
/// # Examples
///
/// ```ignore
/// use fold_storage::backend::{MockBackend, FileSystem};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("css/main.css", "body{margin:0}")]);
/// assert_eq!(backend.read(Path::new("css/main.css")).await?, b"body{margin:0}");
/// assert_eq!(backend.reads(Path::new("css/main.css")).await, 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, Vec<u8>>>,
    log: Mutex<Vec<Operation>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Current contents of a file, bypassing the operation log.
    pub async fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = validate_path(path.as_ref()).ok()?;
        self.storage.read().await.get(&path).cloned()
    }

    /// Every operation performed so far, in order.
    pub async fn operations(&self) -> Vec<Operation> {
        self.log.lock().await.clone()
    }

    /// Number of reads (successful or not) of `path`.
    pub async fn reads(&self, path: impl AsRef<Path>) -> usize {
        let Ok(path) = validate_path(path.as_ref()) else { return 0 };
        self.log.lock().await.iter().filter(|op| matches!(op, Operation::Read(p) if *p == path)).count()
    }

    /// Paths deleted so far, in order.
    pub async fn deleted(&self) -> Vec<PathBuf> {
        self.log
            .lock()
            .await
            .iter()
            .filter_map(|op| match op {
                Operation::Delete(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, operation: Operation) {
        self.log.lock().await.push(operation);
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl FileSystem for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.record(Operation::Read(path.clone())).await;
        self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.record(Operation::Write(path.clone())).await;
        self.storage.write().await.insert(path, data.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.record(Operation::Delete(path.clone())).await;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
