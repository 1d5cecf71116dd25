//! Verdant Stage
//!
//! Reconciliation engine for notebook history: parses cells, decides which
//! nodes continue prior lineages, and commits the minimal set of new
//! versions.
//!
//! # Components
//!
//! - [`CodeParser`]: tree-sitter Python front-end producing [`ParsedNode`]s
//! - [`ChildMatcher`]: in place, shifted, similarity and positional matching
//! - [`Stage`]: edit flags, structural changes and the serialized commit
//! - [`NotebookSession`]: notebook events recorded as checkpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verdant_history::{History, HistoryConfig};
//! use verdant_stage::{CellSnapshot, NotebookSession};
//!
//! let history = Arc::new(History::new(HistoryConfig::default()).unwrap());
//! let session = NotebookSession::new(history).unwrap();
//! session.load(vec![CellSnapshot::code("print(1)")], false).unwrap();
//! session.edit_cell(0, CellSnapshot::code("print(2)")).unwrap();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod events;
mod load;
mod matcher;
mod parse;
mod stage;

pub use error::StageError;
pub use events::{GhostBook, GhostCell, NotebookSession};
pub use matcher::{similarity, Candidate, ChildMatch, ChildMatcher, MatchKind, Prior};
pub use parse::{markdown_digest, CellKind, CellSnapshot, CodeParser, ParsedContent, ParsedNode};
pub use stage::{CellSlot, CommitOutcome, PendingChange, Stage};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
