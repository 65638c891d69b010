//! What the inline stage did to each stylesheet, kept until pruning.

use crate::engine::StylesheetDelta;
use crate::lock;
use crate::resolver::StylesheetRef;
use fold_markup::LinkHandle;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// One document's use of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub document: String,
    /// The `<link>` elements to remove from `document` if the stylesheet is
    /// deleted. Empty when the stylesheet was matched by pattern.
    pub links: Vec<LinkHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneEntry {
    /// The stylesheet, without any document's link handles.
    pub stylesheet: StylesheetRef,
    pub references: Vec<Reference>,
    consumed: bool,
    remainder: Option<String>,
}

impl PruneEntry {
    fn new(stylesheet: &StylesheetRef) -> Self {
        Self {
            stylesheet: StylesheetRef { links: Vec::new(), ..stylesheet.clone() },
            references: Vec::new(),
            consumed: true,
            remainder: None,
        }
    }

    /// `true` only if every document that was offered this stylesheet
    /// inlined all of it.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// The remainder recorded last. With several documents reducing the same
    /// stylesheet concurrently, whichever finished last wins.
    pub fn remainder(&self) -> Option<&str> {
        self.remainder.as_deref()
    }

    /// `(document, link)` for every `<link>` that pointed at the stylesheet.
    pub fn links(&self) -> impl Iterator<Item = (&str, &LinkHandle)> {
        self.references.iter().flat_map(|r| r.links.iter().map(|link| (r.document.as_str(), link)))
    }
}

/// Stylesheet deltas recorded during the inline stage, by stylesheet name.
#[derive(Debug, Default)]
pub struct PruneLedger {
    entries: Mutex<BTreeMap<String, PruneEntry>>,
    retained: Mutex<HashSet<String>>,
}

impl PruneLedger {
    pub fn record(&self, document: &str, stylesheet: &StylesheetRef, delta: &StylesheetDelta) {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(stylesheet.name.clone()).or_insert_with(|| PruneEntry::new(stylesheet));
        entry.references.push(Reference { document: document.to_string(), links: stylesheet.links.clone() });
        match delta {
            StylesheetDelta::Consumed => {},
            StylesheetDelta::Unchanged => entry.consumed = false,
            StylesheetDelta::Reduced(remainder) => {
                entry.consumed = false;
                entry.remainder = Some(remainder.clone());
            },
        }
    }

    /// Leave the stylesheet `name` exactly as it is, whatever gets recorded.
    pub fn retain(&self, name: &str) {
        lock(&self.retained).insert(name.to_string());
    }

    /// Take every entry that may be acted on, leaving the ledger empty.
    pub fn drain(&self) -> Vec<PruneEntry> {
        let retained = std::mem::take(&mut *lock(&self.retained));
        std::mem::take(&mut *lock(&self.entries))
            .into_values()
            .filter(|entry| !retained.contains(&entry.stylesheet.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}
