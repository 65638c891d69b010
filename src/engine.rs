//! The boundary to the critical CSS extraction engine.
//!
//! The engine decides which rules are needed above the fold; this crate
//! never parses CSS itself. Engines report failures with
//! [`ErrorKind::Engine`](crate::error::ErrorKind::Engine).

use crate::cache::StylesheetContent;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A stylesheet offered to the engine for one document.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub content: Arc<StylesheetContent>,
}

/// What extraction left of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetDelta {
    /// Nothing was inlined from it.
    Unchanged,
    /// Some rules were inlined; this is what remains.
    Reduced(String),
    /// Every rule was inlined.
    Consumed,
}
impl StylesheetDelta {
    /// Classify a remainder. Whitespace alone counts as nothing left.
    pub fn from_remainder(remainder: impl Into<String>) -> Self {
        let remainder = remainder.into();
        if remainder.trim().is_empty() { Self::Consumed } else { Self::Reduced(remainder) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// The document with its critical CSS inlined.
    pub html: String,
    /// Keyed by [`Candidate::name`]. Candidates without an entry are
    /// treated as [`StylesheetDelta::Unchanged`].
    pub stylesheets: HashMap<String, StylesheetDelta>,
}

#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    async fn extract(&self, html: &str, candidates: &[Candidate]) -> Result<Extraction>;
}
pub type EngineHandle = Arc<dyn ExtractionEngine>;
