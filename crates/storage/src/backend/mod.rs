//! Filesystem trait and implementations.
//!
//! Stylesheets that the build pipeline did not produce itself (copied static
//! files, stylesheets written by another tool) are read from, rewritten on,
//! and deleted from the output directory through [`FileSystem`].

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// The filesystem collaborator of a build.
///
/// All operations are asynchronous; every call is a suspension point for the
/// pipeline. Paths are relative to the output directory and must be validated
/// with [`validate_path`](crate::validate_path) by implementations.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use fold_storage::{FileSystem, error::Result};
///
/// async fn stylesheet_size(fs: &dyn FileSystem) -> Result<u64> {
///     match fs.read(Path::new("css/main.css")).await {
///         Ok(css) => Ok(css.len() as u64),
///         Err(e) if e.is_not_found() => Ok(0),
///         Err(e) => Err(e),
///     }
/// }
/// ```
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// Read the complete file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or overwrite a file.
    ///
    /// Implementations create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
