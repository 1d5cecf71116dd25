//! Error types for the reconciliation engine

use verdant_history::{CheckpointError, HistoryError};
use verdant_nodey::{CheckpointId, Lineage, NodeyError};

/// Errors from staging and committing changes
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Store rejected or could not serve the commit
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    /// Checkpoint ledger rejected the event
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A committed version could not be rendered
    #[error("render error: {0}")]
    Render(#[from] NodeyError),

    /// Cell lineage is not part of the current notebook
    #[error("unknown cell {0}")]
    UnknownCell(Lineage),

    /// Cell index outside the notebook
    #[error("cell index {index} out of range for {len} cells")]
    IndexOutOfRange { index: usize, len: usize },

    /// Commit attempted with a checkpoint that is not open
    #[error("checkpoint {0} is not open")]
    NotOpen(CheckpointId),

    /// Parser could not be initialized
    #[error("parser error: {0}")]
    Parser(String),
}
