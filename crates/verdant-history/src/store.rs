//! History store
//!
//! Content-addressable registry of every committed node version, the
//! notebook-version index, and the links from code cells to their output
//! lineages.
//!
//! # Concurrency
//!
//! Readers take an [`Arc<Snapshot>`] and never observe a partial commit.
//! [`HistoryStore::publish`] validates a [`CommitBatch`] against the current
//! snapshot, builds the next snapshot from persistent maps (cheap structural
//! sharing) and swaps it in with a single assignment.

use crate::error::{HistoryError, Result};
use crate::output::OutputHistory;
use im::{OrdMap, Vector};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use verdant_nodey::{Lineage, NodeName, NodeResolver, Nodey, NodeyNotebook};

/// Immutable view of the store at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    lineages: OrdMap<Lineage, Vector<Arc<Nodey>>>,
    notebooks: Vector<Arc<NodeyNotebook>>,
    /// Code cell lineage → output lineage
    outputs: OrdMap<Lineage, Lineage>,
    /// Next free sub index per cell
    next_sub: OrdMap<u32, u32>,
    next_cell: u32,
    versions: usize,
}

impl Snapshot {
    /// Resolve a specific version
    ///
    /// # Errors
    /// Returns [`HistoryError::NotFound`] if the version is not committed
    pub fn get(&self, name: &NodeName) -> Result<Arc<Nodey>> {
        self.lineages
            .get(&name.lineage())
            .and_then(|versions| versions.get(name.version as usize))
            .cloned()
            .ok_or_else(|| HistoryError::not_found(name))
    }

    /// Check if a version is committed
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &NodeName) -> bool {
        self.lineages
            .get(&name.lineage())
            .is_some_and(|versions| (name.version as usize) < versions.len())
    }

    /// Latest committed version of a lineage
    #[must_use]
    pub fn latest(&self, lineage: impl Into<Lineage>) -> Option<Arc<Nodey>> {
        self.lineages
            .get(&lineage.into())
            .and_then(|versions| versions.last())
            .cloned()
    }

    /// All versions of a lineage, oldest first
    #[must_use]
    pub fn get_versions_for(&self, lineage: impl Into<Lineage>) -> Vec<Arc<Nodey>> {
        self.lineages
            .get(&lineage.into())
            .map(|versions| versions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest version in the same lineage strictly older than `name`
    ///
    /// `None` for version 0 and for unknown lineages.
    #[must_use]
    pub fn get_prior_version(&self, name: &NodeName) -> Option<Arc<Nodey>> {
        let versions = self.lineages.get(&name.lineage())?;
        let upto = (name.version as usize).min(versions.len());
        upto.checked_sub(1).and_then(|i| versions.get(i)).cloned()
    }

    /// Resolve a notebook version
    ///
    /// # Errors
    /// Returns [`HistoryError::NotFound`] for unknown versions
    pub fn get_notebook(&self, version: u32) -> Result<Arc<NodeyNotebook>> {
        self.notebooks
            .get(version as usize)
            .cloned()
            .ok_or_else(|| HistoryError::not_found(format!("notebook {version}")))
    }

    /// Latest notebook version
    #[must_use]
    pub fn current_notebook(&self) -> Option<Arc<NodeyNotebook>> {
        self.notebooks.last().cloned()
    }

    /// Notebook version in which a node version was first published
    ///
    /// # Errors
    /// Returns [`HistoryError::NotFound`] if that notebook is not committed
    pub fn get_notebook_of(&self, nodey: &Nodey) -> Result<Arc<NodeyNotebook>> {
        self.get_notebook(nodey.meta().notebook)
    }

    /// Output lineage linked to a code cell lineage
    #[must_use]
    pub fn output_lineage(&self, code: impl Into<Lineage>) -> Option<Lineage> {
        self.outputs.get(&code.into()).copied()
    }

    /// Output history of a code cell
    #[must_use]
    pub fn get_output(&self, code: impl Into<Lineage>) -> Option<OutputHistory> {
        let code = code.into();
        let lineage = self.output_lineage(code)?;
        Some(OutputHistory::new(lineage, code, self.get_versions_for(lineage)))
    }

    /// Next free sub index within a cell
    #[inline]
    #[must_use]
    pub fn next_sub(&self, cell: u32) -> u32 {
        self.next_sub.get(&cell).copied().unwrap_or(0)
    }

    /// Next free cell id
    #[inline]
    #[must_use]
    pub fn next_cell(&self) -> u32 {
        self.next_cell
    }

    /// Number of lineages
    #[inline]
    #[must_use]
    pub fn lineage_count(&self) -> usize {
        self.lineages.len()
    }

    /// Number of committed node versions across all lineages
    #[inline]
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.versions
    }

    /// Number of notebook versions
    #[inline]
    #[must_use]
    pub fn notebook_count(&self) -> usize {
        self.notebooks.len()
    }

    pub(crate) fn lineages(&self) -> impl Iterator<Item = (&Lineage, &Vector<Arc<Nodey>>)> {
        self.lineages.iter()
    }

    pub(crate) fn notebooks(&self) -> impl Iterator<Item = &Arc<NodeyNotebook>> {
        self.notebooks.iter()
    }

    pub(crate) fn output_links(&self) -> impl Iterator<Item = (Lineage, Lineage)> + '_ {
        self.outputs.iter().map(|(code, output)| (*code, *output))
    }

    pub(crate) fn sub_counters(&self) -> BTreeMap<u32, u32> {
        self.next_sub.iter().map(|(cell, next)| (*cell, *next)).collect()
    }

    fn tail_len(&self, lineage: Lineage) -> u32 {
        self.lineages
            .get(&lineage)
            .map_or(0, |versions| u32::try_from(versions.len()).unwrap_or(u32::MAX))
    }

    /// Validate a batch and build the snapshot that results from it
    fn apply(&self, batch: CommitBatch) -> Result<Self> {
        let CommitBatch {
            mut nodes,
            mut notebooks,
            output_links,
            next_sub,
            next_cell,
        } = batch;
        nodes.sort_by_key(Nodey::name);
        notebooks.sort_by_key(|notebook| notebook.version);

        let mut tails: BTreeMap<Lineage, u32> = BTreeMap::new();
        for node in &nodes {
            let lineage = node.lineage();
            let expected = tails
                .entry(lineage)
                .or_insert_with(|| self.tail_len(lineage));
            if node.version() != *expected {
                return Err(HistoryError::VersionGap {
                    name: node.name(),
                    expected: *expected,
                });
            }
            *expected += 1;
        }

        let staged: HashSet<NodeName> = nodes.iter().map(Nodey::name).collect();
        let resolves = |name: &NodeName| staged.contains(name) || self.contains(name);

        for node in &nodes {
            if let Some(to) = node.references().into_iter().find(|r| !resolves(r)) {
                return Err(HistoryError::DanglingReference {
                    from: node.name().to_string(),
                    to,
                });
            }
        }

        let mut expected_notebook = u32::try_from(self.notebooks.len()).unwrap_or(u32::MAX);
        for notebook in &notebooks {
            if notebook.version != expected_notebook {
                return Err(HistoryError::NotebookGap {
                    got: notebook.version,
                    expected: expected_notebook,
                });
            }
            expected_notebook += 1;
            if let Some(to) = notebook.cells.iter().find(|cell| !resolves(cell)) {
                return Err(HistoryError::DanglingReference {
                    from: format!("notebook {}", notebook.version),
                    to: *to,
                });
            }
        }

        for (code, output) in &output_links {
            let first = output.at(0);
            if !resolves(&first) {
                return Err(HistoryError::DanglingReference {
                    from: format!("output link of {code}"),
                    to: first,
                });
            }
        }

        let mut next = self.clone();
        next.versions += nodes.len();
        for node in nodes {
            let lineage = node.lineage();
            let mut versions = next.lineages.get(&lineage).cloned().unwrap_or_default();
            versions.push_back(Arc::new(node));
            next.lineages.insert(lineage, versions);
        }
        for notebook in notebooks {
            next.notebooks.push_back(Arc::new(notebook));
        }
        for (code, output) in output_links {
            next.outputs.insert(code, output);
        }
        for (cell, sub) in next_sub {
            let current = next.next_sub(cell);
            next.next_sub.insert(cell, current.max(sub));
        }
        if let Some(cell) = next_cell {
            next.next_cell = next.next_cell.max(cell);
        }
        Ok(next)
    }
}

impl NodeResolver for Snapshot {
    fn resolve(&self, name: &NodeName) -> Option<Arc<Nodey>> {
        self.get(name).ok()
    }
}

/// Set of new versions published atomically
///
/// Built by the reconciliation engine; the store never infers structure.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// New node versions
    pub nodes: Vec<Nodey>,
    /// New notebook versions (at most one per commit)
    pub notebooks: Vec<NodeyNotebook>,
    /// New code cell → output lineage links
    pub output_links: Vec<(Lineage, Lineage)>,
    /// Updated sub index counters
    pub next_sub: BTreeMap<u32, u32>,
    /// Updated cell id counter
    pub next_cell: Option<u32>,
}

impl CommitBatch {
    /// Create empty batch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the batch publishes nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.notebooks.is_empty() && self.output_links.is_empty()
    }
}

/// Registry of all committed versions
#[derive(Debug, Default)]
pub struct HistoryStore {
    state: RwLock<Arc<Snapshot>>,
}

impl HistoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    ///
    /// Hold on to the returned snapshot for a consistent multi-step read.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read())
    }

    /// Validate and atomically publish a batch
    ///
    /// This is the only write path; the reconciliation engine calls it once
    /// per commit. Concurrent readers keep seeing the previous snapshot until
    /// the swap.
    ///
    /// # Errors
    /// - [`HistoryError::VersionGap`] if a staged version is not `tail + 1`
    /// - [`HistoryError::NotebookGap`] if a notebook version is out of sequence
    /// - [`HistoryError::DanglingReference`] if anything staged points at an
    ///   unknown version
    ///
    /// On error nothing becomes visible.
    pub fn publish(&self, batch: CommitBatch) -> Result<Arc<Snapshot>> {
        let guard = self.state.upgradable_read();
        let staged = batch.nodes.len();
        let next = Arc::new(guard.apply(batch)?);
        let mut writer = RwLockUpgradableReadGuard::upgrade(guard);
        *writer = Arc::clone(&next);
        debug!(
            staged,
            versions = next.version_count(),
            notebooks = next.notebook_count(),
            "published snapshot"
        );
        Ok(next)
    }

    /// Resolve a specific version
    ///
    /// # Errors
    /// Returns [`HistoryError::NotFound`] if the version is not committed
    pub fn get(&self, name: &NodeName) -> Result<Arc<Nodey>> {
        self.snapshot().get(name)
    }

    /// Resolve a notebook version
    ///
    /// # Errors
    /// Returns [`HistoryError::NotFound`] for unknown versions
    pub fn get_notebook(&self, version: u32) -> Result<Arc<NodeyNotebook>> {
        self.snapshot().get_notebook(version)
    }

    /// Latest notebook version
    #[must_use]
    pub fn current_notebook(&self) -> Option<Arc<NodeyNotebook>> {
        self.snapshot().current_notebook()
    }

    /// Notebook version in which a node version was first published
    ///
    /// # Errors
    /// Returns [`HistoryError::NotFound`] if that notebook is not committed
    pub fn get_notebook_of(&self, nodey: &Nodey) -> Result<Arc<NodeyNotebook>> {
        self.snapshot().get_notebook_of(nodey)
    }

    /// Latest version strictly older than `name` in its lineage
    #[must_use]
    pub fn get_prior_version(&self, name: &NodeName) -> Option<Arc<Nodey>> {
        self.snapshot().get_prior_version(name)
    }

    /// All versions of a lineage, oldest first
    #[must_use]
    pub fn get_versions_for(&self, lineage: impl Into<Lineage>) -> Vec<Arc<Nodey>> {
        self.snapshot().get_versions_for(lineage)
    }

    /// Latest committed version of a lineage
    #[must_use]
    pub fn latest(&self, lineage: impl Into<Lineage>) -> Option<Arc<Nodey>> {
        self.snapshot().latest(lineage)
    }

    /// Output history of a code cell
    #[must_use]
    pub fn get_output(&self, code: impl Into<Lineage>) -> Option<OutputHistory> {
        self.snapshot().get_output(code)
    }

    /// Number of lineages
    #[must_use]
    pub fn lineage_count(&self) -> usize {
        self.snapshot().lineage_count()
    }

    /// Number of committed node versions
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.snapshot().version_count()
    }
}

impl NodeResolver for HistoryStore {
    fn resolve(&self, name: &NodeName) -> Option<Arc<Nodey>> {
        self.get(name).ok()
    }
}
