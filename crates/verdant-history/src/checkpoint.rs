//! Checkpoint ledger
//!
//! Append-only log of causally grouped change events. A checkpoint is
//! generated (OPEN) before its operation runs and resolved exactly once with
//! the per-cell effect of that operation.

use crate::error::CheckpointError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use verdant_nodey::{parse_lineage_or_name, CheckpointId, Lineage, NodeName};

/// Kind of event a checkpoint records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckpointType {
    Run,
    Edit,
    Add,
    Delete,
    Moved,
    Load,
}

/// Effect of a checkpoint on one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Same,
    Changed,
}

/// Resolution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointState {
    Open,
    Resolved,
}

impl CheckpointState {
    fn resolved() -> Self {
        Self::Resolved
    }
}

/// Per-cell change record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    /// Lineage key or version name of the affected cell
    pub node: String,
    /// Cell index in the notebook
    pub index: usize,
    pub change_type: ChangeType,
    /// Output versions created by this checkpoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_output: Vec<NodeName>,
}

impl CellChange {
    /// Create a change record
    #[inline]
    #[must_use]
    pub fn new(node: impl ToString, index: usize, change_type: ChangeType) -> Self {
        Self {
            node: node.to_string(),
            index,
            change_type,
            new_output: Vec::new(),
        }
    }

    /// With output versions created by the checkpoint
    #[inline]
    #[must_use]
    pub fn with_new_output(mut self, outputs: Vec<NodeName>) -> Self {
        self.new_output = outputs;
        self
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub checkpoint_type: CheckpointType,
    pub target_cells: Vec<CellChange>,
    /// Unix time in milliseconds
    pub timestamp: i64,
    /// Notebook version the checkpoint is associated with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook: Option<u32>,
    /// Only resolved checkpoints are ever persisted
    #[serde(skip, default = "CheckpointState::resolved")]
    pub state: CheckpointState,
}

impl Checkpoint {
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state == CheckpointState::Resolved
    }

    /// Check if the checkpoint touches a cell lineage
    #[must_use]
    pub fn touches(&self, cell: Lineage) -> bool {
        self.target_cells.iter().any(|change| {
            parse_lineage_or_name(&change.node).is_ok_and(|lineage| lineage == cell)
        })
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u32,
    entries: BTreeMap<CheckpointId, Checkpoint>,
}

/// Append-only checkpoint log
#[derive(Debug, Default)]
pub struct CheckpointLedger {
    inner: Mutex<LedgerState>,
}

impl CheckpointLedger {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a checkpoint with a fresh id
    pub fn generate_checkpoint(&self, checkpoint_type: CheckpointType) -> Checkpoint {
        let mut guard = self.inner.lock();
        let id = CheckpointId(guard.next_id);
        guard.next_id += 1;
        let checkpoint = Checkpoint {
            id,
            checkpoint_type,
            target_cells: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            notebook: None,
            state: CheckpointState::Open,
        };
        guard.entries.insert(id, checkpoint.clone());
        checkpoint
    }

    /// Resolve an open checkpoint with its final per-cell effect
    ///
    /// # Errors
    /// - [`CheckpointError::UnknownCheckpoint`] if `id` was never generated
    /// - [`CheckpointError::DoubleResolve`] if it is already resolved
    pub fn resolve_checkpoint(
        &self,
        id: CheckpointId,
        target_cells: Vec<CellChange>,
        notebook: Option<u32>,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut guard = self.inner.lock();
        let entry = guard
            .entries
            .get_mut(&id)
            .ok_or(CheckpointError::UnknownCheckpoint(id))?;
        if entry.is_resolved() {
            return Err(CheckpointError::DoubleResolve(id));
        }
        entry.target_cells = target_cells;
        entry.notebook = notebook;
        entry.state = CheckpointState::Resolved;
        info!(
            checkpoint = %id,
            kind = ?entry.checkpoint_type,
            cells = entry.target_cells.len(),
            notebook = ?notebook,
            "checkpoint resolved"
        );
        Ok(entry.clone())
    }

    /// Drop an open checkpoint whose operation failed
    ///
    /// # Errors
    /// - [`CheckpointError::UnknownCheckpoint`] if `id` was never generated
    /// - [`CheckpointError::DoubleResolve`] if it is already resolved
    pub fn abandon(&self, id: CheckpointId) -> Result<(), CheckpointError> {
        let mut guard = self.inner.lock();
        let resolved = guard
            .entries
            .get(&id)
            .map(Checkpoint::is_resolved)
            .ok_or(CheckpointError::UnknownCheckpoint(id))?;
        if resolved {
            return Err(CheckpointError::DoubleResolve(id));
        }
        guard.entries.remove(&id);
        Ok(())
    }

    /// Look up a checkpoint in any state
    #[must_use]
    pub fn get(&self, id: CheckpointId) -> Option<Checkpoint> {
        self.inner.lock().entries.get(&id).cloned()
    }

    /// Check if a checkpoint is open
    #[must_use]
    pub fn is_open(&self, id: CheckpointId) -> bool {
        self.inner
            .lock()
            .entries
            .get(&id)
            .is_some_and(|entry| !entry.is_resolved())
    }

    /// Resolved checkpoints associated with a notebook version, in creation order
    #[must_use]
    pub fn get_by_notebook(&self, version: u32) -> Vec<Checkpoint> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|entry| entry.is_resolved() && entry.notebook == Some(version))
            .cloned()
            .collect()
    }

    /// All resolved checkpoints, in creation order
    #[must_use]
    pub fn all_resolved(&self) -> Vec<Checkpoint> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|entry| entry.is_resolved())
            .cloned()
            .collect()
    }

    /// Replace the ledger contents with persisted checkpoints
    pub(crate) fn restore(&self, checkpoints: Vec<Checkpoint>) {
        let mut guard = self.inner.lock();
        guard.next_id = checkpoints.iter().map(|c| c.id.0 + 1).max().unwrap_or(0);
        guard.entries = checkpoints
            .into_iter()
            .map(|mut checkpoint| {
                checkpoint.state = CheckpointState::Resolved;
                (checkpoint.id, checkpoint)
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_increase_monotonically() {
        let ledger = CheckpointLedger::new();
        let a = ledger.generate_checkpoint(CheckpointType::Load);
        let b = ledger.generate_checkpoint(CheckpointType::Run);
        assert!(b.id > a.id);
        assert_eq!(a.state, CheckpointState::Open);
    }

    #[test]
    fn resolve_twice_fails() {
        let ledger = CheckpointLedger::new();
        let checkpoint = ledger.generate_checkpoint(CheckpointType::Edit);
        ledger
            .resolve_checkpoint(checkpoint.id, Vec::new(), Some(0))
            .unwrap();
        assert_eq!(
            ledger.resolve_checkpoint(checkpoint.id, Vec::new(), Some(0)),
            Err(CheckpointError::DoubleResolve(checkpoint.id))
        );
        assert_eq!(
            ledger.resolve_checkpoint(CheckpointId(99), Vec::new(), None),
            Err(CheckpointError::UnknownCheckpoint(CheckpointId(99)))
        );
    }

    #[test]
    fn open_checkpoints_never_appear_by_notebook() {
        let ledger = CheckpointLedger::new();
        let open = ledger.generate_checkpoint(CheckpointType::Run);
        let done = ledger.generate_checkpoint(CheckpointType::Edit);
        let later = ledger.generate_checkpoint(CheckpointType::Run);
        ledger.resolve_checkpoint(later.id, Vec::new(), Some(1)).unwrap();
        ledger.resolve_checkpoint(done.id, Vec::new(), Some(1)).unwrap();

        let ids: Vec<_> = ledger.get_by_notebook(1).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![done.id, later.id]);
        assert!(ledger.is_open(open.id));
        assert!(ledger.get_by_notebook(0).is_empty());
    }

    #[test]
    fn abandon_removes_only_open_checkpoints() {
        let ledger = CheckpointLedger::new();
        let failed = ledger.generate_checkpoint(CheckpointType::Run);
        ledger.abandon(failed.id).unwrap();
        assert!(ledger.get(failed.id).is_none());

        let done = ledger.generate_checkpoint(CheckpointType::Run);
        ledger.resolve_checkpoint(done.id, Vec::new(), None).unwrap();
        assert_eq!(
            ledger.abandon(done.id),
            Err(CheckpointError::DoubleResolve(done.id))
        );
    }

    #[test]
    fn serialized_form_uses_camel_case_and_upper_enums() {
        let ledger = CheckpointLedger::new();
        let checkpoint = ledger.generate_checkpoint(CheckpointType::Delete);
        let resolved = ledger
            .resolve_checkpoint(
                checkpoint.id,
                vec![CellChange::new("0.0.1", 0, ChangeType::Changed)],
                Some(2),
            )
            .unwrap();

        let value = serde_json::to_value(&resolved).unwrap();
        assert_eq!(value["checkpointType"], "DELETE");
        assert_eq!(value["targetCells"][0]["node"], "0.0.1");
        assert_eq!(value["targetCells"][0]["changeType"], "CHANGED");
        assert!(value["targetCells"][0].get("newOutput").is_none());
        assert!(value.get("state").is_none());

        let back: Checkpoint = serde_json::from_value(value).unwrap();
        assert_eq!(back, resolved);
    }

    #[test]
    fn restore_continues_id_sequence() {
        let ledger = CheckpointLedger::new();
        let first = ledger.generate_checkpoint(CheckpointType::Load);
        let resolved = ledger.resolve_checkpoint(first.id, Vec::new(), Some(0)).unwrap();

        let restored = CheckpointLedger::new();
        restored.restore(vec![resolved]);
        let next = restored.generate_checkpoint(CheckpointType::Run);
        assert_eq!(next.id, CheckpointId(1));
        assert_eq!(restored.all_resolved().len(), 1);
    }

    #[test]
    fn touches_accepts_names_and_lineages() {
        let mut checkpoint = CheckpointLedger::new().generate_checkpoint(CheckpointType::Run);
        checkpoint.target_cells = vec![
            CellChange::new("2.0.3", 0, ChangeType::Same),
            CellChange::new("4.0", 1, ChangeType::Changed),
        ];
        assert!(checkpoint.touches(Lineage::new(2, 0)));
        assert!(checkpoint.touches(Lineage::new(4, 0)));
        assert!(!checkpoint.touches(Lineage::new(3, 0)));
    }
}
