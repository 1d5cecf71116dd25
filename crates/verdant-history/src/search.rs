//! Keyword search over rendered versions
//!
//! A linear scan over every lineage of the requested kind. All keywords must
//! appear in a version's rendered text; hits are grouped by lineage so that
//! repeated matches on one logical cell collapse into a single group.

use crate::store::Snapshot;
use std::sync::Arc;
use tracing::debug;
use verdant_nodey::{render, Nodey};

/// Grouped search results: one group per lineage, versions oldest first
pub type SearchResults = Vec<Vec<Arc<Nodey>>>;

/// Which lineages a search scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    /// Code cells (whole-cell text)
    Code,
    /// Markdown cells
    Markdown,
    /// Outputs (JSON encoding of their payloads)
    Output,
}

impl SearchKind {
    fn accepts(self, nodey: &Nodey) -> bool {
        matches!(
            (self, nodey),
            (Self::Code, Nodey::CodeCell(_))
                | (Self::Markdown, Nodey::Markdown(_))
                | (Self::Output, Nodey::Output(_))
        )
    }
}

/// Parsed keyword query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    keywords: Vec<String>,
    case_sensitive: bool,
}

impl SearchQuery {
    /// Split a query string into whitespace separated keywords
    #[must_use]
    pub fn new(query: &str, case_sensitive: bool) -> Self {
        let keywords = query
            .split_whitespace()
            .map(|word| {
                if case_sensitive {
                    word.to_string()
                } else {
                    word.to_lowercase()
                }
            })
            .collect();
        Self {
            keywords,
            case_sensitive,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Check if every keyword occurs in `text`
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        if self.case_sensitive {
            self.keywords.iter().all(|k| text.contains(k.as_str()))
        } else {
            let text = text.to_lowercase();
            self.keywords.iter().all(|k| text.contains(k.as_str()))
        }
    }
}

impl Snapshot {
    /// Search committed versions of one kind
    ///
    /// An empty query matches nothing.
    #[must_use]
    pub fn search(&self, kind: SearchKind, query: &SearchQuery) -> SearchResults {
        if query.is_empty() {
            return Vec::new();
        }
        self.lineages()
            .filter_map(|(lineage, versions)| {
                let group: Vec<Arc<Nodey>> = versions
                    .iter()
                    .filter(|nodey| kind.accepts(nodey))
                    .filter(|nodey| match render(nodey, self) {
                        Ok(text) => query.matches(&text),
                        Err(err) => {
                            debug!(lineage = %lineage, error = %err, "skipping unrenderable version");
                            false
                        }
                    })
                    .cloned()
                    .collect();
                (!group.is_empty()).then_some(group)
            })
            .collect()
    }
}
