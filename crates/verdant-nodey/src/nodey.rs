//! Versioned node variants
//!
//! [`Nodey`] is a closed tagged type over everything the history stores per
//! lineage: code cells, code sub-nodes, markdown cells and outputs. Notebook
//! snapshots ([`NodeyNotebook`]) are versioned separately by the store.
//!
//! # Invariants
//! - A committed version is immutable
//! - `content` order is source order
//! - A [`ContentEntry::Child`] always names a committed version

use crate::hash::{ContentHash, DigestBuilder};
use crate::name::{Lineage, NodeName};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Checkpoint identifier (monotonic per notebook)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub u32);

impl Display for CheckpointId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source position (0-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub ch: u32,
}

impl Position {
    /// Create a position
    #[inline]
    #[must_use]
    pub const fn new(line: u32, ch: u32) -> Self {
        Self { line, ch }
    }
}

/// Metadata shared by every node version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Full version name
    pub name: NodeName,
    /// Checkpoint whose commit created this version
    pub created: CheckpointId,
    /// Notebook version in which this version was first published
    pub notebook: u32,
    /// Parent lineage (code sub-nodes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Lineage>,
}

/// Non-versioned literal fragment (punctuation, keywords, whitespace)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxToken {
    pub tokens: String,
}

impl SyntaxToken {
    /// Create a token
    #[inline]
    #[must_use]
    pub fn new(tokens: impl Into<String>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }
}

/// One entry of a code node's ordered content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentEntry {
    /// Reference to a specific version of a child lineage
    Child(NodeName),
    /// Inline token, rendered but not diff-tracked
    Token(SyntaxToken),
}

/// Code node (also the root of a code cell)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeyCode {
    pub meta: NodeMeta,
    /// Grammar kind, e.g. `call` or `identifier`
    pub kind: String,
    /// Terminal text for leaves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentEntry>,
    pub start: Position,
    pub end: Position,
    /// Structural digest over kind, literal and content
    pub digest: ContentHash,
}

impl NodeyCode {
    /// Child names in source order
    pub fn children(&self) -> impl Iterator<Item = &NodeName> {
        self.content.iter().filter_map(|entry| match entry {
            ContentEntry::Child(name) => Some(name),
            ContentEntry::Token(_) => None,
        })
    }

    /// Check if this node is a leaf
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children().next().is_none()
    }
}

/// Markdown cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeyMarkdown {
    pub meta: NodeMeta,
    pub markdown: String,
}

/// Reference to an output payload stored outside the history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsiteRef {
    /// File type of the stored payload, e.g. `png` or `json`
    pub file_type: String,
    /// Locator in the external artifact store (content hash)
    pub offsite: ContentHash,
    /// Serialized payload size in bytes
    pub size: usize,
}

/// One captured execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputPayload {
    /// Large payload kept in an external artifact store
    Offsite(OffsiteRef),
    /// nbformat output object stored inline
    Inline(serde_json::Value),
}

impl OutputPayload {
    /// Check if the payload is stored offsite
    #[inline]
    #[must_use]
    pub fn is_offsite(&self) -> bool {
        matches!(self, Self::Offsite(_))
    }
}

/// Output of a code cell execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeyOutput {
    pub meta: NodeMeta,
    /// Code cell version that produced this output
    pub parent: NodeName,
    pub raw: Vec<OutputPayload>,
}

impl NodeyOutput {
    /// Check if any payload is stored offsite
    #[inline]
    #[must_use]
    pub fn has_offsite(&self) -> bool {
        self.raw.iter().any(OutputPayload::is_offsite)
    }
}

/// A versioned node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Nodey {
    /// Root of a code cell
    CodeCell(NodeyCode),
    /// Code sub-node
    Code(NodeyCode),
    /// Markdown cell
    Markdown(NodeyMarkdown),
    /// Execution output
    Output(NodeyOutput),
}

impl Nodey {
    /// Shared metadata
    #[must_use]
    pub fn meta(&self) -> &NodeMeta {
        match self {
            Self::CodeCell(code) | Self::Code(code) => &code.meta,
            Self::Markdown(md) => &md.meta,
            Self::Output(out) => &out.meta,
        }
    }

    /// Full version name
    #[inline]
    #[must_use]
    pub fn name(&self) -> NodeName {
        self.meta().name
    }

    /// Lineage key
    #[inline]
    #[must_use]
    pub fn lineage(&self) -> Lineage {
        self.meta().name.lineage()
    }

    /// Version number within the lineage
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.meta().name.version
    }

    /// Discriminant character: `c` code, `m` markdown, `o` output
    #[must_use]
    pub fn type_char(&self) -> char {
        match self {
            Self::CodeCell(_) | Self::Code(_) => 'c',
            Self::Markdown(_) => 'm',
            Self::Output(_) => 'o',
        }
    }

    /// Check if this node is the root of a notebook cell
    #[inline]
    #[must_use]
    pub fn is_cell(&self) -> bool {
        matches!(self, Self::CodeCell(_) | Self::Markdown(_))
    }

    /// Code payload for code cells and code sub-nodes
    #[must_use]
    pub fn as_code(&self) -> Option<&NodeyCode> {
        match self {
            Self::CodeCell(code) | Self::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Markdown payload
    #[must_use]
    pub fn as_markdown(&self) -> Option<&NodeyMarkdown> {
        match self {
            Self::Markdown(md) => Some(md),
            _ => None,
        }
    }

    /// Output payload
    #[must_use]
    pub fn as_output(&self) -> Option<&NodeyOutput> {
        match self {
            Self::Output(out) => Some(out),
            _ => None,
        }
    }

    /// Names this version references: children, producing code cell
    #[must_use]
    pub fn references(&self) -> Vec<NodeName> {
        match self {
            Self::CodeCell(code) | Self::Code(code) => code.children().copied().collect(),
            Self::Markdown(_) => Vec::new(),
            Self::Output(out) => vec![out.parent],
        }
    }
}

/// Notebook snapshot: which cells exist, in what order, at a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeyNotebook {
    pub version: u32,
    /// Cell versions in notebook order
    pub cells: Vec<NodeName>,
    pub created: CheckpointId,
}

impl NodeyNotebook {
    /// Discriminant character for notebooks
    pub const TYPE_CHAR: char = 'n';

    /// Position of a cell lineage in this snapshot
    #[must_use]
    pub fn index_of(&self, lineage: Lineage) -> Option<usize> {
        self.cells.iter().position(|cell| cell.lineage() == lineage)
    }

    /// Version of a cell lineage in this snapshot
    #[must_use]
    pub fn cell_version(&self, lineage: Lineage) -> Option<NodeName> {
        self.cells.iter().copied().find(|cell| cell.lineage() == lineage)
    }
}

/// Digest of a code node from its parts
///
/// `child_digest` resolves each child name to its digest; returns `None`
/// if a child cannot be resolved.
pub fn code_digest<F>(
    kind: &str,
    literal: Option<&str>,
    content: &[ContentEntry],
    mut child_digest: F,
) -> Option<ContentHash>
where
    F: FnMut(&NodeName) -> Option<ContentHash>,
{
    let mut builder = DigestBuilder::new(kind);
    if let Some(text) = literal {
        builder.literal(text);
    }
    for entry in content {
        match entry {
            ContentEntry::Child(name) => {
                builder.child(&child_digest(name)?);
            }
            ContentEntry::Token(token) => {
                builder.token(&token.tokens);
            }
        }
    }
    Some(builder.finish())
}
