//! Notebook load paths
//!
//! A cold start treats every opened cell as new. A hot start matches the
//! opened cells against the current notebook with the child matcher at cell
//! level, then reconciles each matched cell against its committed tree, so
//! re-opening an unchanged notebook allocates nothing.

use crate::error::StageError;
use crate::matcher::{Candidate, Prior};
use crate::parse::{markdown_digest, CellKind, CellSnapshot};
use crate::stage::{CellSlot, CommitOutcome, PendingChange, Stage, StageState};
use tracing::{debug, info};
use verdant_history::Checkpoint;
use verdant_nodey::{render, Nodey};

impl Stage {
    /// Commit every cell as a new lineage
    ///
    /// # Errors
    /// Same as [`Stage::commit`]
    pub fn cold_start(&self, checkpoint: &Checkpoint, cells: Vec<CellSnapshot>) -> Result<CommitOutcome, StageError> {
        self.cold_start_locked(&mut self.lock(), checkpoint, cells)
    }

    pub(crate) fn cold_start_locked(
        &self,
        state: &mut StageState,
        checkpoint: &Checkpoint,
        cells: Vec<CellSnapshot>,
    ) -> Result<CommitOutcome, StageError> {
        let count = cells.len();
        state
            .pending
            .push(PendingChange::Layout(cells.into_iter().map(CellSlot::New).collect()));
        let outcome = self.commit_locked(state, checkpoint)?;
        info!(checkpoint = %checkpoint.id, cells = count, "cold start");
        Ok(outcome)
    }

    /// Commit opened cells, continuing lineages of the current notebook
    ///
    /// Falls back to a cold start when nothing was committed before.
    ///
    /// # Errors
    /// Same as [`Stage::commit`]; also [`StageError::History`] or
    /// [`StageError::Render`] if the current notebook cannot be read
    pub fn hot_start(&self, checkpoint: &Checkpoint, cells: Vec<CellSnapshot>) -> Result<CommitOutcome, StageError> {
        self.hot_start_locked(&mut self.lock(), checkpoint, cells)
    }

    pub(crate) fn hot_start_locked(
        &self,
        state: &mut StageState,
        checkpoint: &Checkpoint,
        cells: Vec<CellSnapshot>,
    ) -> Result<CommitOutcome, StageError> {
        let snapshot = self.history().store().snapshot();
        let Some(notebook) = snapshot.current_notebook() else {
            return self.cold_start_locked(state, checkpoint, cells);
        };

        let mut priors = Vec::with_capacity(notebook.cells.len());
        for name in &notebook.cells {
            let cell = snapshot.get(name)?;
            let (kind, digest) = match &*cell {
                Nodey::Markdown(markdown) => ("markdown", markdown_digest(&markdown.markdown)),
                Nodey::CodeCell(code) | Nodey::Code(code) => ("code", code.digest),
                Nodey::Output(_) => continue,
            };
            priors.push(Prior {
                lineage: name.lineage(),
                candidate: Candidate::new(kind, digest, render(&cell, &*snapshot)?),
            });
        }

        let candidates: Vec<Candidate> = cells
            .iter()
            .map(|cell| match cell.kind {
                CellKind::Code => {
                    let parsed = state.parser.parse(&cell.source);
                    Candidate::new(cell.kind.label(), parsed.digest, cell.source.as_str())
                }
                CellKind::Markdown => {
                    Candidate::new(cell.kind.label(), markdown_digest(&cell.source), cell.source.as_str())
                }
            })
            .collect();
        let matches = self.matcher().match_children(&priors, &candidates);

        let mut slots = Vec::with_capacity(cells.len());
        let mut reused = 0;
        for (cell, matched) in cells.into_iter().zip(matches) {
            match matched.and_then(|m| priors.get(m.old)) {
                Some(prior) => {
                    debug!(lineage = %prior.lineage, "reopened cell continues lineage");
                    reused += 1;
                    state.edited.insert(prior.lineage, cell);
                    slots.push(CellSlot::Existing(prior.lineage));
                }
                None => slots.push(CellSlot::New(cell)),
            }
        }
        state.pending.push(PendingChange::Layout(slots));

        let outcome = self.commit_locked(state, checkpoint)?;
        info!(
            checkpoint = %checkpoint.id,
            reused,
            versions = outcome.new_versions,
            "hot start"
        );
        Ok(outcome)
    }
}
