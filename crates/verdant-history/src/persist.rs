//! Persisted history format
//!
//! A single JSON document holding every committed version, notebook
//! snapshot, output link and resolved checkpoint. Names are kept in their
//! dotted string form.

use crate::checkpoint::Checkpoint;
use crate::error::{HistoryError, Result};
use crate::store::{CommitBatch, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verdant_nodey::{Lineage, Nodey, NodeyNotebook};

/// Current persisted format version
pub const FORMAT_VERSION: u32 = 1;

/// Serializable form of a whole history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHistory {
    pub format_version: u32,
    pub nodes: Vec<Nodey>,
    pub notebooks: Vec<NodeyNotebook>,
    /// Code cell lineage → output lineage
    pub outputs: Vec<(Lineage, Lineage)>,
    pub checkpoints: Vec<Checkpoint>,
    pub next_cell: u32,
    pub next_sub: BTreeMap<u32, u32>,
}

impl PersistedHistory {
    pub(crate) fn capture(snapshot: &Snapshot, checkpoints: Vec<Checkpoint>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            nodes: snapshot
                .lineages()
                .flat_map(|(_, versions)| versions.iter().map(|nodey| nodey.as_ref().clone()))
                .collect(),
            notebooks: snapshot
                .notebooks()
                .map(|notebook| notebook.as_ref().clone())
                .collect(),
            outputs: snapshot.output_links().collect(),
            checkpoints,
            next_cell: snapshot.next_cell(),
            next_sub: snapshot.sub_counters(),
        }
    }

    /// Split into a batch that rebuilds the store plus the checkpoints
    ///
    /// # Errors
    /// Returns [`HistoryError::Config`] for an unsupported format version
    pub(crate) fn into_parts(self) -> Result<(CommitBatch, Vec<Checkpoint>)> {
        if self.format_version != FORMAT_VERSION {
            return Err(HistoryError::Config(format!(
                "unsupported history format version {}",
                self.format_version
            )));
        }
        let batch = CommitBatch {
            nodes: self.nodes,
            notebooks: self.notebooks,
            output_links: self.outputs,
            next_sub: self.next_sub,
            next_cell: Some(self.next_cell),
        };
        Ok((batch, self.checkpoints))
    }

    /// Encode as pretty-printed JSON
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON
    ///
    /// # Errors
    /// Returns error if the document is malformed
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}
