//! Error types for the node model

use crate::name::NodeName;

/// Errors from rendering and resolving nodes
#[derive(Debug, thiserror::Error)]
pub enum NodeyError {
    /// A referenced version is not committed
    #[error("node not found: {0}")]
    NotFound(NodeName),

    /// A referenced version has the wrong variant
    #[error("node {name} has type '{actual}', expected '{expected}'")]
    UnexpectedKind {
        name: NodeName,
        expected: char,
        actual: char,
    },

    /// Output payload could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
