//! Reconciliation engine
//!
//! The [`Stage`] collects edit flags and structural changes between commits.
//! [`Stage::commit`] reconciles every flagged cell against its latest
//! committed version, reusing every sub-tree whose digest is unchanged and
//! allocating new versions only where content differs, then publishes the
//! result to the store in one batch.
//!
//! # Identity rules
//! - A new version of an existing lineage is always `tail + 1`
//! - New lineages take the next sub index of their cell, in pre-order
//! - Output lineages are allocated from the same per-cell counter
//! - Every new node version implies a new notebook version
//! - Edit checkpoints never record outputs
//!
//! Commits are serialized by the stage's mutex. Nothing becomes visible if a
//! commit fails; its flags are kept for a retry.

use crate::error::StageError;
use crate::matcher::{Candidate, ChildMatcher, Prior};
use crate::parse::{CellKind, CellSnapshot, CodeParser, ParsedContent, ParsedNode};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use verdant_history::{
    externalize, Checkpoint, CheckpointType, CommitBatch, History, OffsitePayload, Snapshot,
};
use verdant_nodey::{
    render, CheckpointId, ContentEntry, Lineage, NodeMeta, NodeName, Nodey, NodeyCode,
    NodeyMarkdown, NodeyNotebook, NodeyOutput, SyntaxToken,
};

/// Structural change staged for the next commit
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    /// Insert a new cell at an index
    Add { index: usize, snapshot: CellSnapshot },
    /// Remove a cell from the notebook
    Delete { cell: Lineage },
    /// Move a cell to a new index
    Move { cell: Lineage, to: usize },
    /// Replace the whole cell list
    Layout(Vec<CellSlot>),
}

/// One entry of a replacement cell list
#[derive(Debug, Clone, PartialEq)]
pub enum CellSlot {
    Existing(Lineage),
    New(CellSnapshot),
}

/// What a commit published
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    /// Cells whose root got a new version, in notebook order
    pub changed_cells: Vec<NodeName>,
    /// Code cell lineage → new output version
    pub new_outputs: Vec<(Lineage, NodeName)>,
    pub added_cells: Vec<NodeName>,
    /// Last live version of each removed cell
    pub deleted_cells: Vec<NodeName>,
    /// New notebook version, if one was published
    pub notebook: Option<u32>,
    /// Oversized payloads for the external artifact store
    pub offsite: Vec<OffsitePayload>,
    /// Number of node versions published
    pub new_versions: usize,
}

impl CommitOutcome {
    /// Check if the commit published nothing
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.new_versions == 0 && self.notebook.is_none()
    }

    /// Check if a cell's root got a new version
    #[must_use]
    pub fn root_changed(&self, cell: Lineage) -> bool {
        self.changed_cells.iter().any(|name| name.lineage() == cell)
    }

    /// Output versions created for a cell
    #[must_use]
    pub fn outputs_for(&self, cell: Lineage) -> Vec<NodeName> {
        self.new_outputs
            .iter()
            .filter(|(code, _)| *code == cell)
            .map(|(_, output)| *output)
            .collect()
    }
}

pub(crate) struct StageState {
    pub(crate) parser: CodeParser,
    pub(crate) edited: BTreeMap<Lineage, CellSnapshot>,
    pub(crate) pending: Vec<PendingChange>,
}

/// Per-notebook reconciliation engine
pub struct Stage {
    history: Arc<History>,
    matcher: ChildMatcher,
    state: Mutex<StageState>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl Stage {
    /// Create a stage over a history
    ///
    /// # Errors
    /// Returns [`StageError::Parser`] if the Python grammar cannot be loaded
    pub fn new(history: Arc<History>) -> Result<Self, StageError> {
        let matcher = ChildMatcher::from_config(history.config());
        Ok(Self {
            history,
            matcher,
            state: Mutex::new(StageState {
                parser: CodeParser::new()?,
                edited: BTreeMap::new(),
                pending: Vec::new(),
            }),
        })
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    #[inline]
    #[must_use]
    pub fn matcher(&self) -> ChildMatcher {
        self.matcher
    }

    /// Flag a cell for the next commit
    ///
    /// Allocates nothing. A later flag for the same cell replaces the
    /// earlier snapshot.
    pub fn mark_as_edited(&self, cell: Lineage, snapshot: CellSnapshot) {
        self.lock().edited.insert(cell, snapshot);
    }

    /// Stage a new cell at `index`
    pub fn mark_cell_added(&self, index: usize, snapshot: CellSnapshot) {
        self.lock().pending.push(PendingChange::Add { index, snapshot });
    }

    /// Stage removal of a cell
    pub fn mark_cell_deleted(&self, cell: Lineage) {
        self.lock().pending.push(PendingChange::Delete { cell });
    }

    /// Stage a move of a cell to `to`
    pub fn mark_cell_moved(&self, cell: Lineage, to: usize) {
        self.lock().pending.push(PendingChange::Move { cell, to });
    }

    /// Drop every flag and staged change
    pub fn discard_pending(&self) {
        let mut state = self.lock();
        state.edited.clear();
        state.pending.clear();
    }

    /// Check if anything is staged
    #[must_use]
    pub fn has_pending(&self) -> bool {
        let state = self.lock();
        !state.edited.is_empty() || !state.pending.is_empty()
    }

    /// Reconcile flagged cells and publish the result
    ///
    /// # Errors
    /// - [`StageError::NotOpen`] if the checkpoint is not open
    /// - [`StageError::UnknownCell`] or [`StageError::IndexOutOfRange`] for
    ///   staged changes that do not fit the current notebook
    /// - [`StageError::History`] if the store rejects the batch
    ///
    /// On error nothing is published and the staged changes are kept.
    #[tracing::instrument(skip(self, checkpoint), fields(checkpoint = %checkpoint.id, kind = ?checkpoint.checkpoint_type))]
    pub fn commit(&self, checkpoint: &Checkpoint) -> Result<CommitOutcome, StageError> {
        let mut state = self.lock();
        self.commit_locked(&mut state, checkpoint)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StageState> {
        self.state.lock()
    }

    /// Run an event that stages and commits under one lock
    ///
    /// Flags left by the `mark_*` methods are set aside while `event` runs,
    /// so its commits publish only what it staged itself. They are put back
    /// afterwards. Whatever a failed event staged is dropped.
    pub(crate) fn exclusive<T, F>(&self, event: F) -> Result<T, StageError>
    where
        F: FnOnce(&mut StageState) -> Result<T, StageError>,
    {
        let mut state = self.lock();
        let edited = std::mem::take(&mut state.edited);
        let pending = std::mem::take(&mut state.pending);
        let result = event(&mut state);
        state.edited = edited;
        state.pending = pending;
        result
    }

    pub(crate) fn commit_locked(
        &self,
        state: &mut StageState,
        checkpoint: &Checkpoint,
    ) -> Result<CommitOutcome, StageError> {
        if !self.history.checkpoints().is_open(checkpoint.id) {
            return Err(StageError::NotOpen(checkpoint.id));
        }

        let edited = std::mem::take(&mut state.edited);
        let pending = std::mem::take(&mut state.pending);
        let reconciler = Reconciler::new(
            self.history.store().snapshot(),
            &mut state.parser,
            self.matcher,
            self.history.config().offsite_threshold_bytes,
            checkpoint,
        );

        let result = reconciler.run(&edited, &pending).and_then(|(batch, outcome)| {
            self.history.store().publish(batch)?;
            Ok(outcome)
        });

        match result {
            Ok(outcome) => {
                info!(
                    checkpoint = %checkpoint.id,
                    versions = outcome.new_versions,
                    changed = outcome.changed_cells.len(),
                    notebook = ?outcome.notebook,
                    "commit published"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(checkpoint = %checkpoint.id, error = %err, "commit aborted");
                state.edited = edited;
                state.pending = pending;
                Err(err)
            }
        }
    }
}

/// State of one commit pass
struct Reconciler<'a> {
    snapshot: Arc<Snapshot>,
    parser: &'a mut CodeParser,
    matcher: ChildMatcher,
    offsite_threshold: usize,
    checkpoint: CheckpointId,
    /// Edit checkpoints leave outputs untouched
    record_outputs: bool,
    /// Notebook version this commit publishes, if it publishes one
    notebook: u32,
    next_cell: u32,
    subs: BTreeMap<u32, u32>,
    nodes: Vec<Nodey>,
    output_links: Vec<(Lineage, Lineage)>,
    new_outputs: Vec<(Lineage, NodeName)>,
    offsite: Vec<OffsitePayload>,
}

impl<'a> Reconciler<'a> {
    fn new(
        snapshot: Arc<Snapshot>,
        parser: &'a mut CodeParser,
        matcher: ChildMatcher,
        offsite_threshold: usize,
        checkpoint: &Checkpoint,
    ) -> Self {
        let notebook = u32::try_from(snapshot.notebook_count()).unwrap_or(u32::MAX);
        let next_cell = snapshot.next_cell();
        Self {
            snapshot,
            parser,
            matcher,
            offsite_threshold,
            checkpoint: checkpoint.id,
            record_outputs: checkpoint.checkpoint_type != CheckpointType::Edit,
            notebook,
            next_cell,
            subs: BTreeMap::new(),
            nodes: Vec::new(),
            output_links: Vec::new(),
            new_outputs: Vec::new(),
            offsite: Vec::new(),
        }
    }

    fn run(
        mut self,
        edited: &BTreeMap<Lineage, CellSnapshot>,
        pending: &[PendingChange],
    ) -> Result<(CommitBatch, CommitOutcome), StageError> {
        let current = self.snapshot.current_notebook();
        let mut cells: Vec<Lineage> = current
            .as_ref()
            .map(|notebook| notebook.cells.iter().map(NodeName::lineage).collect())
            .unwrap_or_default();
        let mut roots: BTreeMap<Lineage, NodeName> = BTreeMap::new();
        let mut added = Vec::new();
        let mut deleted = Vec::new();

        for change in pending {
            match change {
                PendingChange::Add { index, snapshot } => {
                    if *index > cells.len() {
                        return Err(StageError::IndexOutOfRange {
                            index: *index,
                            len: cells.len(),
                        });
                    }
                    let name = self.create_cell(snapshot)?;
                    cells.insert(*index, name.lineage());
                    roots.insert(name.lineage(), name);
                    added.push(name);
                }
                PendingChange::Delete { cell } => {
                    let index = position(&cells, *cell)?;
                    cells.remove(index);
                    let name = self.root_name(&roots, *cell)?;
                    roots.remove(cell);
                    deleted.push(name);
                }
                PendingChange::Move { cell, to } => {
                    let index = position(&cells, *cell)?;
                    if *to >= cells.len() {
                        return Err(StageError::IndexOutOfRange {
                            index: *to,
                            len: cells.len(),
                        });
                    }
                    cells.remove(index);
                    cells.insert(*to, *cell);
                }
                PendingChange::Layout(slots) => {
                    let mut next = Vec::with_capacity(slots.len());
                    for slot in slots {
                        match slot {
                            CellSlot::Existing(cell) => {
                                self.root_name(&roots, *cell)?;
                                next.push(*cell);
                            }
                            CellSlot::New(snapshot) => {
                                let name = self.create_cell(snapshot)?;
                                roots.insert(name.lineage(), name);
                                added.push(name);
                                next.push(name.lineage());
                            }
                        }
                    }
                    for dropped in cells.iter().filter(|cell| !next.contains(cell)) {
                        deleted.push(self.root_name(&roots, *dropped)?);
                    }
                    cells = next;
                }
            }
        }

        for (cell, snapshot) in edited {
            if !cells.contains(cell) {
                if deleted.iter().any(|name| name.lineage() == *cell) {
                    continue;
                }
                return Err(StageError::UnknownCell(*cell));
            }
            let name = self.reconcile_cell(*cell, snapshot)?;
            roots.insert(*cell, name);
        }

        let names = cells
            .iter()
            .map(|cell| self.root_name(&roots, *cell))
            .collect::<Result<Vec<_>, _>>()?;
        let changed_cells: Vec<NodeName> = names
            .iter()
            .filter(|name| !self.snapshot.contains(name))
            .copied()
            .collect();

        let notebook_changed = !self.nodes.is_empty()
            || current.as_ref().map_or(true, |notebook| notebook.cells != names);
        let mut notebooks = Vec::new();
        if notebook_changed {
            notebooks.push(NodeyNotebook {
                version: self.notebook,
                cells: names,
                created: self.checkpoint,
            });
        }

        let outcome = CommitOutcome {
            changed_cells,
            new_outputs: self.new_outputs,
            added_cells: added,
            deleted_cells: deleted,
            notebook: notebook_changed.then_some(self.notebook),
            offsite: self.offsite,
            new_versions: self.nodes.len(),
        };
        let batch = CommitBatch {
            nodes: self.nodes,
            notebooks,
            output_links: self.output_links,
            next_sub: self.subs,
            next_cell: Some(self.next_cell),
        };
        Ok((batch, outcome))
    }

    /// Name of a cell root: staged in this commit or latest committed
    fn root_name(&self, roots: &BTreeMap<Lineage, NodeName>, cell: Lineage) -> Result<NodeName, StageError> {
        roots
            .get(&cell)
            .copied()
            .or_else(|| self.snapshot.latest(cell).map(|root| root.name()))
            .ok_or(StageError::UnknownCell(cell))
    }

    fn alloc_sub(&mut self, cell: u32) -> u32 {
        let snapshot = &self.snapshot;
        let next = self.subs.entry(cell).or_insert_with(|| snapshot.next_sub(cell));
        let sub = *next;
        *next += 1;
        sub
    }

    fn tail(&self, lineage: Lineage) -> u32 {
        self.snapshot
            .latest(lineage)
            .map_or(0, |latest| latest.version() + 1)
    }

    fn meta(&self, name: NodeName, parent: Option<Lineage>) -> NodeMeta {
        NodeMeta {
            name,
            created: self.checkpoint,
            notebook: self.notebook,
            parent,
        }
    }

    fn create_cell(&mut self, snapshot: &CellSnapshot) -> Result<NodeName, StageError> {
        let cell = self.next_cell;
        self.next_cell += 1;
        let root = Lineage::new(cell, self.alloc_sub(cell));
        self.reconcile_cell(root, snapshot)
    }

    fn reconcile_cell(&mut self, root: Lineage, snapshot: &CellSnapshot) -> Result<NodeName, StageError> {
        let latest = self.snapshot.latest(root);
        match snapshot.kind {
            CellKind::Code => {
                let parsed = self.parser.parse(&snapshot.source);
                let prior = latest.as_deref().and_then(Nodey::as_code);
                let name = self.reconcile_code(prior, &parsed, Some(root), None)?;
                if self.record_outputs {
                    self.reconcile_outputs(root, name, &snapshot.outputs)?;
                }
                Ok(name)
            }
            CellKind::Markdown => Ok(self.reconcile_markdown(root, latest.as_deref(), &snapshot.source)),
        }
    }

    /// Reconcile one parsed sub-tree against its prior version
    ///
    /// `lineage` is `None` for nodes without a prior; their lineage is
    /// allocated before their children so sub indices follow pre-order.
    fn reconcile_code(
        &mut self,
        prior: Option<&NodeyCode>,
        parsed: &ParsedNode,
        lineage: Option<Lineage>,
        parent: Option<Lineage>,
    ) -> Result<NodeName, StageError> {
        if let Some(prior) = prior.filter(|p| p.kind == parsed.kind && p.digest == parsed.digest) {
            return Ok(prior.meta.name);
        }

        let lineage = match lineage {
            Some(lineage) => lineage,
            None => {
                let cell = parent.map_or(0, |p| p.cell);
                Lineage::new(cell, self.alloc_sub(cell))
            }
        };

        let mut old_nodes = Vec::new();
        let mut priors = Vec::new();
        for child in prior.into_iter().flat_map(NodeyCode::children) {
            let node = self.snapshot.get(child)?;
            if let Some(code) = node.as_code() {
                priors.push(Prior {
                    lineage: node.lineage(),
                    candidate: Candidate::new(code.kind.as_str(), code.digest, render(&node, &*self.snapshot)?),
                });
                old_nodes.push(node);
            }
        }
        let candidates: Vec<Candidate> = parsed
            .children()
            .map(|child| Candidate::new(child.kind.as_str(), child.digest, child.text()))
            .collect();
        let matches = if priors.is_empty() {
            vec![None; candidates.len()]
        } else {
            self.matcher.match_children(&priors, &candidates)
        };

        let mut content = Vec::with_capacity(parsed.content.len());
        let mut index = 0;
        for entry in &parsed.content {
            match entry {
                ParsedContent::Token(text) => {
                    content.push(ContentEntry::Token(SyntaxToken::new(text.as_str())));
                }
                ParsedContent::Node(child) => {
                    let matched = matches.get(index).copied().flatten();
                    index += 1;
                    let name = match matched.and_then(|m| old_nodes.get(m.old)).map(Arc::clone) {
                        Some(old) => self.reconcile_code(old.as_code(), child, Some(old.lineage()), Some(lineage))?,
                        None => self.reconcile_code(None, child, None, Some(lineage))?,
                    };
                    content.push(ContentEntry::Child(name));
                }
            }
        }

        let name = lineage.at(self.tail(lineage));
        let code = NodeyCode {
            meta: self.meta(name, parent),
            kind: parsed.kind.clone(),
            literal: parsed.literal.clone(),
            content,
            start: parsed.start,
            end: parsed.end,
            digest: parsed.digest,
        };
        self.nodes.push(if parent.is_none() {
            Nodey::CodeCell(code)
        } else {
            Nodey::Code(code)
        });
        Ok(name)
    }

    fn reconcile_markdown(&mut self, lineage: Lineage, latest: Option<&Nodey>, text: &str) -> NodeName {
        if let Some(markdown) = latest
            .and_then(Nodey::as_markdown)
            .filter(|markdown| markdown.markdown == text)
        {
            return markdown.meta.name;
        }
        let name = lineage.at(self.tail(lineage));
        self.nodes.push(Nodey::Markdown(NodeyMarkdown {
            meta: self.meta(name, None),
            markdown: text.to_string(),
        }));
        name
    }

    /// Record a new output version if the captured outputs differ
    fn reconcile_outputs(&mut self, cell: Lineage, parent: NodeName, outputs: &[Value]) -> Result<(), StageError> {
        let existing = self.snapshot.output_lineage(cell);
        let latest = existing.and_then(|lineage| self.snapshot.latest(lineage));
        if latest.is_none() && outputs.is_empty() {
            return Ok(());
        }

        let mut raw = Vec::with_capacity(outputs.len());
        let mut offsite = Vec::new();
        for output in outputs {
            let (payload, external) = externalize(output.clone(), self.offsite_threshold)?;
            raw.push(payload);
            offsite.extend(external);
        }
        if latest
            .as_deref()
            .and_then(Nodey::as_output)
            .is_some_and(|output| output.raw == raw)
        {
            return Ok(());
        }

        let lineage = match existing {
            Some(lineage) => lineage,
            None => {
                let lineage = Lineage::new(cell.cell, self.alloc_sub(cell.cell));
                self.output_links.push((cell, lineage));
                lineage
            }
        };
        let name = lineage.at(latest.map_or(0, |output| output.version() + 1));
        self.nodes.push(Nodey::Output(NodeyOutput {
            meta: self.meta(name, None),
            parent,
            raw,
        }));
        self.new_outputs.push((cell, name));
        self.offsite.extend(offsite);
        Ok(())
    }
}

fn position(cells: &[Lineage], cell: Lineage) -> Result<usize, StageError> {
    cells
        .iter()
        .position(|candidate| *candidate == cell)
        .ok_or(StageError::UnknownCell(cell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_history::HistoryConfig;

    fn stage() -> Stage {
        Stage::new(Arc::new(History::new(HistoryConfig::default()).unwrap())).unwrap()
    }

    fn commit(stage: &Stage, kind: CheckpointType) -> CommitOutcome {
        let checkpoint = stage.history().checkpoints().generate_checkpoint(kind);
        let outcome = stage.commit(&checkpoint).unwrap();
        stage
            .history()
            .checkpoints()
            .resolve_checkpoint(checkpoint.id, Vec::new(), outcome.notebook)
            .unwrap();
        outcome
    }

    fn rendered(stage: &Stage, name: NodeName) -> String {
        let snapshot = stage.history().store().snapshot();
        render(&snapshot.get(&name).unwrap(), &*snapshot).unwrap()
    }

    #[test]
    fn first_commit_allocates_cell_roots_in_order() {
        let stage = stage();
        stage.mark_cell_added(0, CellSnapshot::code("print(1)"));
        stage.mark_cell_added(1, CellSnapshot::markdown("# notes"));
        let outcome = commit(&stage, CheckpointType::Load);

        assert_eq!(
            outcome.added_cells,
            vec![NodeName::new(0, 0, 0), NodeName::new(1, 0, 0)]
        );
        assert_eq!(outcome.notebook, Some(0));
        assert_eq!(rendered(&stage, NodeName::new(0, 0, 0)), "print(1)");
        assert_eq!(rendered(&stage, NodeName::new(1, 0, 0)), "# notes");
    }

    #[test]
    fn unchanged_source_reuses_every_version() {
        let stage = stage();
        stage.mark_cell_added(0, CellSnapshot::code("x = 1\ny = x + 1\n"));
        commit(&stage, CheckpointType::Load);
        let versions = stage.history().store().version_count();

        stage.mark_as_edited(Lineage::cell_root(0), CellSnapshot::code("x = 1\ny = x + 1\n"));
        let outcome = commit(&stage, CheckpointType::Edit);
        assert!(outcome.is_noop());
        assert!(outcome.changed_cells.is_empty());
        assert_eq!(stage.history().store().version_count(), versions);
    }

    #[test]
    fn sibling_edit_keeps_untouched_subtrees() {
        let stage = stage();
        stage.mark_cell_added(0, CellSnapshot::code("a = 1\nb = 2\n"));
        commit(&stage, CheckpointType::Load);
        let before = stage.history().store().latest(Lineage::cell_root(0)).unwrap();
        let first_child = *before.as_code().unwrap().children().next().unwrap();

        stage.mark_as_edited(Lineage::cell_root(0), CellSnapshot::code("a = 1\nb = 3\n"));
        let outcome = commit(&stage, CheckpointType::Edit);

        let after = stage.history().store().latest(Lineage::cell_root(0)).unwrap();
        assert_eq!(after.name(), NodeName::new(0, 0, 1));
        assert_eq!(*after.as_code().unwrap().children().next().unwrap(), first_child);
        assert_eq!(outcome.changed_cells, vec![NodeName::new(0, 0, 1)]);
        assert_eq!(rendered(&stage, after.name()), "a = 1\nb = 3\n");
    }

    #[test]
    fn new_versions_follow_the_tail() {
        let stage = stage();
        stage.mark_cell_added(0, CellSnapshot::code("n = 0"));
        commit(&stage, CheckpointType::Load);
        for i in 1..4 {
            stage.mark_as_edited(Lineage::cell_root(0), CellSnapshot::code(format!("n = {i}")));
            commit(&stage, CheckpointType::Edit);
        }
        let versions = stage.history().store().get_versions_for(Lineage::cell_root(0));
        let numbers: Vec<u32> = versions.iter().map(|v| v.version()).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[test]
    fn outputs_get_a_lineage_in_their_cell() {
        let stage = stage();
        let output = json!({"output_type": "stream", "name": "stdout", "text": "1\n"});
        stage.mark_cell_added(0, CellSnapshot::code("print(1)").with_outputs(vec![output.clone()]));
        let outcome = commit(&stage, CheckpointType::Run);

        let (cell, name) = outcome.new_outputs[0];
        assert_eq!(cell, Lineage::cell_root(0));
        assert_eq!(name.cell, 0);
        assert_eq!(outcome.outputs_for(cell), vec![name]);

        stage.mark_as_edited(cell, CellSnapshot::code("print(1)").with_outputs(vec![output]));
        assert!(commit(&stage, CheckpointType::Run).is_noop());
    }

    #[test]
    fn structural_changes_publish_a_notebook_version() {
        let stage = stage();
        stage.mark_cell_added(0, CellSnapshot::code("a"));
        stage.mark_cell_added(1, CellSnapshot::code("b"));
        commit(&stage, CheckpointType::Load);

        stage.mark_cell_moved(Lineage::cell_root(1), 0);
        let outcome = commit(&stage, CheckpointType::Moved);
        assert_eq!(outcome.new_versions, 0);
        assert_eq!(outcome.notebook, Some(1));
        let notebook = stage.history().store().current_notebook().unwrap();
        assert_eq!(notebook.cells, vec![NodeName::new(1, 0, 0), NodeName::new(0, 0, 0)]);

        stage.mark_cell_deleted(Lineage::cell_root(0));
        let outcome = commit(&stage, CheckpointType::Delete);
        assert_eq!(outcome.deleted_cells, vec![NodeName::new(0, 0, 0)]);
        assert_eq!(outcome.new_versions, 0);
    }

    #[test]
    fn failed_commit_keeps_flags_and_publishes_nothing() {
        let stage = stage();
        stage.mark_as_edited(Lineage::cell_root(5), CellSnapshot::code("x"));
        let checkpoint = stage.history().checkpoints().generate_checkpoint(CheckpointType::Edit);
        let err = stage.commit(&checkpoint).unwrap_err();
        assert!(matches!(err, StageError::UnknownCell(cell) if cell == Lineage::cell_root(5)));
        assert!(stage.has_pending());
        assert_eq!(stage.history().store().version_count(), 0);

        stage.discard_pending();
        assert!(!stage.has_pending());
    }

    #[test]
    fn resolved_checkpoint_cannot_commit() {
        let stage = stage();
        let checkpoint = stage.history().checkpoints().generate_checkpoint(CheckpointType::Run);
        stage
            .history()
            .checkpoints()
            .resolve_checkpoint(checkpoint.id, Vec::new(), None)
            .unwrap();
        assert!(matches!(stage.commit(&checkpoint), Err(StageError::NotOpen(_))));
    }

    #[test]
    fn out_of_range_insert_is_rejected() {
        let stage = stage();
        stage.mark_cell_added(3, CellSnapshot::code("x"));
        let checkpoint = stage.history().checkpoints().generate_checkpoint(CheckpointType::Add);
        assert!(matches!(
            stage.commit(&checkpoint),
            Err(StageError::IndexOutOfRange { index: 3, len: 0 })
        ));
    }
}
