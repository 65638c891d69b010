//! Build Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Only [`ErrorKind::Config`] and [`ErrorKind::Setup`] stop
//! a build; every other kind is scoped to one document or one stylesheet and
//! ends up in the [`BuildReport`](crate::BuildReport).

use derive_more::{Display, Error};

/// A build error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for build operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration could not be loaded or failed validation.
    #[display("invalid configuration")]
    Config,
    /// The build was started with neither an asset table nor a producer.
    #[display("nothing to process: no asset table and no document producers")]
    Setup,
    /// A document could not be processed; its HTML was left untouched.
    #[display("failed to extract critical CSS for \"{_0}\"")]
    Extraction(#[error(not(source))] String),
    /// Raised by extraction engines; always wrapped in [`Self::Extraction`].
    #[display("extraction engine failure")]
    Engine,
    /// A rewritten document or stylesheet could not be written back.
    #[display("failed to write back \"{_0}\"")]
    WriteBack(#[error(not(source))] String),
    /// An asset that was expected in the asset table is gone.
    #[display("asset \"{_0}\" not found")]
    AssetNotFound(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteBack(_))
    }
}
