//! Error types for the history store and checkpoint ledger

use verdant_nodey::{CheckpointId, NameError, NodeName, NodeyError};

/// Result alias for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors from the history store
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Name or notebook version resolves to nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// A staged entry references an uncommitted or unknown version
    #[error("dangling reference from {from} to {to}")]
    DanglingReference { from: String, to: NodeName },

    /// A staged version does not directly follow its lineage tail
    #[error("version gap for {name}: expected version {expected}")]
    VersionGap { name: NodeName, expected: u32 },

    /// A staged notebook version does not directly follow the current one
    #[error("notebook version gap: got {got}, expected {expected}")]
    NotebookGap { got: u32, expected: u32 },

    /// Checkpoint ledger error
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Malformed name in a query or persisted record
    #[error("name error: {0}")]
    Name(#[from] NameError),

    /// Rendering a stored version failed
    #[error("render error: {0}")]
    Render(#[from] NodeyError),

    /// IO error while persisting
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted history could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HistoryError {
    /// Create not found error
    #[inline]
    pub fn not_found(what: impl ToString) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Check if this error only signals an absent result
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors from the checkpoint ledger
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    /// No checkpoint with this id was generated
    #[error("unknown checkpoint {0}")]
    UnknownCheckpoint(CheckpointId),

    /// Checkpoint was already resolved
    #[error("checkpoint {0} is already resolved")]
    DoubleResolve(CheckpointId),
}
