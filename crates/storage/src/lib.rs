//! Filesystem access for stylesheets that live outside the build's asset table.
//!
//! Every path handed to a [`FileSystem`] is relative to the build's output
//! directory and is validated with [`validate_path`] before use, so an href
//! such as `../../etc/passwd` can never reach outside of it.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::FileSystem;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn FileSystem + Send + Sync>;
