//! Markup Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A markup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for markup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The streaming rewriter rejected the document.
    #[display("unable to rewrite HTML")]
    Rewrite,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The HTML either streams through the rewriter or it doesn't.
        false
    }
}
