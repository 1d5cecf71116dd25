//! Notebook events
//!
//! [`NotebookSession`] turns user-level events into checkpoints. Every event
//! opens a checkpoint, updates the model through the [`Stage`], and resolves
//! the checkpoint with its per-cell effect. A failed event abandons its
//! checkpoint and drops whatever it staged.
//!
//! Events on one session are serialized: each holds the stage lock from the
//! moment its checkpoint opens until it is resolved, and commits only the
//! changes it staged itself.
//!
//! Oversized outputs committed by any event queue up in the session until
//! [`NotebookSession::take_offsite`] hands them to an artifact store.

use crate::error::StageError;
use crate::parse::CellSnapshot;
use crate::stage::{CommitOutcome, PendingChange, Stage, StageState};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use verdant_history::{
    CellChange, ChangeType, Checkpoint, CheckpointType, History, HistoryConfig, OffsitePayload,
    Snapshot,
};
use verdant_nodey::{parse_lineage_or_name, CheckpointId, Lineage, NodeName};

/// One notebook's history plus its reconciliation engine
#[derive(Debug)]
pub struct NotebookSession {
    history: Arc<History>,
    stage: Stage,
    offsite: Mutex<Vec<OffsitePayload>>,
}

impl NotebookSession {
    /// Create a session over a history
    ///
    /// # Errors
    /// Returns [`StageError::Parser`] if the parser cannot be created
    pub fn new(history: Arc<History>) -> Result<Self, StageError> {
        let stage = Stage::new(Arc::clone(&history))?;
        Ok(Self {
            history,
            stage,
            offsite: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Cell lineages of the current notebook, in order
    #[must_use]
    pub fn cells(&self) -> Vec<Lineage> {
        self.history
            .store()
            .current_notebook()
            .map(|notebook| notebook.cells.iter().map(NodeName::lineage).collect())
            .unwrap_or_default()
    }

    fn cell_at(&self, index: usize) -> Result<Lineage, StageError> {
        let cells = self.cells();
        cells.get(index).copied().ok_or(StageError::IndexOutOfRange {
            index,
            len: cells.len(),
        })
    }

    /// Record a notebook being opened
    ///
    /// With `match_prior` the cells are matched against the current
    /// notebook; otherwise every cell starts a new lineage.
    ///
    /// # Errors
    /// Returns error if the commit fails
    pub fn load(&self, cells: Vec<CellSnapshot>, match_prior: bool) -> Result<Checkpoint, StageError> {
        self.record(CheckpointType::Load, |state, checkpoint| {
            let outcome = if match_prior {
                self.stage.hot_start_locked(state, checkpoint, cells)?
            } else {
                self.stage.cold_start_locked(state, checkpoint, cells)?
            };
            self.keep_offsite(&outcome);
            let snapshot = self.history.store().snapshot();
            Ok(cell_changes(&snapshot, &outcome))
        })
    }

    /// Record a cell execution
    ///
    /// The change is `SAME` only if the cell's root kept its version and the
    /// run produced no new output version.
    ///
    /// # Errors
    /// - [`StageError::IndexOutOfRange`] for an unknown index
    /// - any commit error
    pub fn run_cell(&self, index: usize, snapshot: CellSnapshot) -> Result<Checkpoint, StageError> {
        self.record(CheckpointType::Run, |state, checkpoint| {
            let cell = self.cell_at(index)?;
            state.edited.insert(cell, snapshot);
            let outcome = self.commit_staged(state, checkpoint)?;
            let outputs = outcome.outputs_for(cell);
            let change_type = if outcome.root_changed(cell) || !outputs.is_empty() {
                ChangeType::Changed
            } else {
                ChangeType::Same
            };
            Ok(vec![
                CellChange::new(self.latest_name(cell)?, index, change_type).with_new_output(outputs),
            ])
        })
    }

    /// Record an edit of a cell's source
    ///
    /// # Errors
    /// - [`StageError::IndexOutOfRange`] for an unknown index
    /// - any commit error
    pub fn edit_cell(&self, index: usize, snapshot: CellSnapshot) -> Result<Checkpoint, StageError> {
        self.record(CheckpointType::Edit, |state, checkpoint| {
            let cell = self.cell_at(index)?;
            state.edited.insert(cell, snapshot);
            let outcome = self.commit_staged(state, checkpoint)?;
            let change_type = if outcome.root_changed(cell) {
                ChangeType::Changed
            } else {
                ChangeType::Same
            };
            Ok(vec![CellChange::new(self.latest_name(cell)?, index, change_type)])
        })
    }

    /// Record a new cell inserted at `index`
    ///
    /// # Errors
    /// - [`StageError::IndexOutOfRange`] if `index` is past the end
    /// - any commit error
    pub fn add_cell(&self, index: usize, snapshot: CellSnapshot) -> Result<Checkpoint, StageError> {
        self.record(CheckpointType::Add, |state, checkpoint| {
            state.pending.push(PendingChange::Add { index, snapshot });
            let outcome = self.commit_staged(state, checkpoint)?;
            Ok(outcome
                .added_cells
                .iter()
                .map(|name| CellChange::new(name, index, ChangeType::Changed))
                .collect())
        })
    }

    /// Record removal of the cell at `index`
    ///
    /// The checkpoint references the cell's last live version; no node
    /// version is allocated.
    ///
    /// # Errors
    /// - [`StageError::IndexOutOfRange`] for an unknown index
    /// - any commit error
    pub fn delete_cell(&self, index: usize) -> Result<Checkpoint, StageError> {
        self.record(CheckpointType::Delete, |state, checkpoint| {
            let cell = self.cell_at(index)?;
            state.pending.push(PendingChange::Delete { cell });
            let outcome = self.commit_staged(state, checkpoint)?;
            Ok(outcome
                .deleted_cells
                .iter()
                .map(|name| CellChange::new(name, index, ChangeType::Changed))
                .collect())
        })
    }

    /// Record a cell moved from `from` to `to`
    ///
    /// # Errors
    /// - [`StageError::IndexOutOfRange`] for an unknown index
    /// - any commit error
    pub fn move_cell(&self, from: usize, to: usize) -> Result<Checkpoint, StageError> {
        self.record(CheckpointType::Moved, |state, checkpoint| {
            let cell = self.cell_at(from)?;
            state.pending.push(PendingChange::Move { cell, to });
            self.commit_staged(state, checkpoint)?;
            Ok(vec![CellChange::new(self.latest_name(cell)?, to, ChangeType::Changed)])
        })
    }

    /// Persist the history to a JSON file
    ///
    /// # Errors
    /// Returns error on encoding or IO failure
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), StageError> {
        self.history.save_to_file(path).await?;
        Ok(())
    }

    /// Open a session over a persisted history
    ///
    /// # Errors
    /// Returns error on IO failure or a corrupt document
    pub async fn open(path: impl AsRef<Path>, config: HistoryConfig) -> Result<Self, StageError> {
        let history = History::load_from_file(path, config).await?;
        Self::new(Arc::new(history))
    }

    /// Notebook as it looked at a version, with its event trail
    ///
    /// Cells deleted in that version are reinserted at their recorded index
    /// and flagged.
    ///
    /// # Errors
    /// Returns [`StageError::History`] if the version is not committed
    pub fn ghost_book(&self, version: u32) -> Result<GhostBook, StageError> {
        let snapshot = self.history.store().snapshot();
        let notebook = snapshot.get_notebook(version)?;
        let checkpoints = self.history.checkpoints().get_by_notebook(version);

        let mut cells: Vec<GhostCell> = notebook
            .cells
            .iter()
            .map(|name| ghost_cell(&snapshot, &checkpoints, *name, version, false))
            .collect();

        let mut removed: Vec<(usize, NodeName)> = checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.checkpoint_type == CheckpointType::Delete)
            .flat_map(|checkpoint| &checkpoint.target_cells)
            .filter_map(|change| deleted_name(&snapshot, change).map(|name| (change.index, name)))
            .collect();
        removed.sort();
        for (index, name) in removed {
            let at = index.min(cells.len());
            cells.insert(at, ghost_cell(&snapshot, &checkpoints, name, version, true));
        }
        for (index, cell) in cells.iter_mut().enumerate() {
            cell.index = index;
        }

        Ok(GhostBook {
            notebook: version,
            cells,
        })
    }

    /// Offsite payloads committed since the last call
    #[must_use]
    pub fn take_offsite(&self) -> Vec<OffsitePayload> {
        std::mem::take(&mut *self.offsite.lock())
    }

    fn commit_staged(&self, state: &mut StageState, checkpoint: &Checkpoint) -> Result<CommitOutcome, StageError> {
        let outcome = self.stage.commit_locked(state, checkpoint)?;
        self.keep_offsite(&outcome);
        Ok(outcome)
    }

    fn keep_offsite(&self, outcome: &CommitOutcome) {
        if !outcome.offsite.is_empty() {
            self.offsite.lock().extend(outcome.offsite.iter().cloned());
        }
    }

    fn latest_name(&self, cell: Lineage) -> Result<NodeName, StageError> {
        self.history
            .store()
            .latest(cell)
            .map(|latest| latest.name())
            .ok_or(StageError::UnknownCell(cell))
    }

    /// Open a checkpoint, run the event, resolve or abandon it
    ///
    /// The stage lock is held throughout.
    fn record<F>(&self, checkpoint_type: CheckpointType, event: F) -> Result<Checkpoint, StageError>
    where
        F: FnOnce(&mut StageState, &Checkpoint) -> Result<Vec<CellChange>, StageError>,
    {
        let checkpoints = self.history.checkpoints();
        self.stage.exclusive(|state| {
            let checkpoint = checkpoints.generate_checkpoint(checkpoint_type);
            match event(state, &checkpoint) {
                Ok(changes) => {
                    let notebook = self.history.store().current_notebook().map(|nb| nb.version);
                    Ok(checkpoints.resolve_checkpoint(checkpoint.id, changes, notebook)?)
                }
                Err(err) => {
                    if let Err(abandon) = checkpoints.abandon(checkpoint.id) {
                        warn!(checkpoint = %checkpoint.id, error = %abandon, "could not abandon checkpoint");
                    }
                    Err(err)
                }
            }
        })
    }
}

/// One cell of a [`GhostBook`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostCell {
    /// Cell version shown at this notebook version
    pub name: NodeName,
    pub index: usize,
    /// Checkpoints of this notebook version touching the cell
    pub events: Vec<(CheckpointId, CheckpointType)>,
    /// Latest output at or before this notebook version
    pub output: Option<NodeName>,
    /// Previous version of the cell
    pub prior: Option<NodeName>,
    /// Cell was deleted in this notebook version
    pub deleted: bool,
}

/// Notebook at one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostBook {
    pub notebook: u32,
    pub cells: Vec<GhostCell>,
}

fn ghost_cell(
    snapshot: &Snapshot,
    checkpoints: &[Checkpoint],
    name: NodeName,
    version: u32,
    deleted: bool,
) -> GhostCell {
    let lineage = name.lineage();
    GhostCell {
        name,
        index: 0,
        events: checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.touches(lineage))
            .map(|checkpoint| (checkpoint.id, checkpoint.checkpoint_type))
            .collect(),
        output: snapshot
            .get_output(lineage)
            .and_then(|history| history.latest_at(version).map(|output| output.name())),
        prior: snapshot.get_prior_version(&name).map(|prior| prior.name()),
        deleted,
    }
}

fn deleted_name(snapshot: &Snapshot, change: &CellChange) -> Option<NodeName> {
    change.node.parse::<NodeName>().ok().or_else(|| {
        let lineage = parse_lineage_or_name(&change.node).ok()?;
        snapshot.latest(lineage).map(|latest| latest.name())
    })
}

/// Per-cell changes of a load: every cell of the new notebook
fn cell_changes(snapshot: &Snapshot, outcome: &CommitOutcome) -> Vec<CellChange> {
    snapshot
        .current_notebook()
        .map(|notebook| {
            notebook
                .cells
                .iter()
                .enumerate()
                .map(|(index, name)| {
                    let change_type = if outcome.changed_cells.contains(name) {
                        ChangeType::Changed
                    } else {
                        ChangeType::Same
                    };
                    CellChange::new(name, index, change_type)
                })
                .collect()
        })
        .unwrap_or_default()
}
