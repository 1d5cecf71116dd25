//! Verdant History
//!
//! Append-only, content-addressable history of a notebook.
//!
//! # Components
//!
//! - [`HistoryStore`]: every committed node version, notebook snapshots and
//!   output links, published atomically as immutable [`Snapshot`]s
//! - [`CheckpointLedger`]: causally grouped events, each resolved once
//! - [`OutputHistory`] / [`OutputResolver`]: output lineages and offsite
//!   payload retrieval with a degraded placeholder on failure
//! - [`History`]: the context object tying them together with
//!   [`HistoryConfig`]
//!
//! # Example
//!
//! ```rust
//! use verdant_history::{CheckpointType, History, HistoryConfig};
//!
//! let history = History::new(HistoryConfig::default()).unwrap();
//! let checkpoint = history.checkpoints().generate_checkpoint(CheckpointType::Load);
//! history
//!     .checkpoints()
//!     .resolve_checkpoint(checkpoint.id, Vec::new(), None)
//!     .unwrap();
//! assert!(history.find_code("anything").is_empty());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod checkpoint;
mod config;
mod error;
mod history;
mod output;
mod persist;
mod search;
mod store;

pub use checkpoint::{
    CellChange, ChangeType, Checkpoint, CheckpointLedger, CheckpointState, CheckpointType,
};
pub use config::HistoryConfig;
pub use error::{CheckpointError, HistoryError, Result};
pub use history::History;
pub use output::{
    externalize, ArtifactFetcher, FetchError, MemoryArtifacts, OffsitePayload, OutputHistory,
    OutputResolver, ResolvedOutput,
};
pub use persist::{PersistedHistory, FORMAT_VERSION};
pub use search::{SearchKind, SearchQuery, SearchResults};
pub use store::{CommitBatch, HistoryStore, Snapshot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
