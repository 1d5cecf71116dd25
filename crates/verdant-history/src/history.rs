//! The history context
//!
//! One long-lived [`History`] per notebook owns the store, the checkpoint
//! ledger and the configuration. It is passed explicitly (usually as
//! `Arc<History>`) to every collaborator.

use crate::checkpoint::CheckpointLedger;
use crate::config::HistoryConfig;
use crate::error::Result;
use crate::persist::PersistedHistory;
use crate::search::{SearchKind, SearchQuery, SearchResults};
use crate::store::HistoryStore;
use std::path::Path;
use tracing::info;

/// Store, ledger and configuration of one notebook
#[derive(Debug)]
pub struct History {
    store: HistoryStore,
    checkpoints: CheckpointLedger,
    config: HistoryConfig,
}

impl History {
    /// Create an empty history
    ///
    /// # Errors
    /// Returns [`crate::HistoryError::Config`] if the configuration is invalid
    pub fn new(config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: HistoryStore::new(),
            checkpoints: CheckpointLedger::new(),
            config,
        })
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointLedger {
        &self.checkpoints
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Search code cells
    #[must_use]
    pub fn find_code(&self, query: &str) -> SearchResults {
        self.search(SearchKind::Code, query)
    }

    /// Search markdown cells
    #[must_use]
    pub fn find_markdown(&self, query: &str) -> SearchResults {
        self.search(SearchKind::Markdown, query)
    }

    /// Search outputs
    #[must_use]
    pub fn find_output(&self, query: &str) -> SearchResults {
        self.search(SearchKind::Output, query)
    }

    /// Search lineages of one kind with the configured case sensitivity
    #[must_use]
    pub fn search(&self, kind: SearchKind, query: &str) -> SearchResults {
        let query = SearchQuery::new(query, self.config.case_sensitive_search);
        self.store.snapshot().search(kind, &query)
    }

    /// Capture the current snapshot and all resolved checkpoints
    #[must_use]
    pub fn to_persisted(&self) -> PersistedHistory {
        PersistedHistory::capture(&self.store.snapshot(), self.checkpoints.all_resolved())
    }

    /// Rebuild a history from its persisted form
    ///
    /// References are re-validated as if everything were committed at once.
    ///
    /// # Errors
    /// - [`crate::HistoryError::DanglingReference`] or
    ///   [`crate::HistoryError::VersionGap`] for a corrupt document
    /// - [`crate::HistoryError::Config`] for an unsupported format or config
    pub fn from_persisted(persisted: PersistedHistory, config: HistoryConfig) -> Result<Self> {
        let history = Self::new(config)?;
        let (batch, checkpoints) = persisted.into_parts()?;
        history.store.publish(batch)?;
        history.checkpoints.restore(checkpoints);
        Ok(history)
    }

    /// Write the persisted form to a JSON file
    ///
    /// # Errors
    /// Returns error on encoding or IO failure
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_persisted().to_json()?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "history saved");
        Ok(())
    }

    /// Read a history from a JSON file
    ///
    /// # Errors
    /// Returns error on IO failure, malformed JSON or integrity violations
    pub async fn load_from_file(path: impl AsRef<Path>, config: HistoryConfig) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let history = Self::from_persisted(PersistedHistory::from_json(&json)?, config)?;
        info!(
            path = %path.display(),
            versions = history.store.version_count(),
            "history loaded"
        );
        Ok(history)
    }
}

impl Default for History {
    fn default() -> Self {
        Self {
            store: HistoryStore::new(),
            checkpoints: CheckpointLedger::new(),
            config: HistoryConfig::default(),
        }
    }
}
