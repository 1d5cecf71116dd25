//! Cell parsing
//!
//! Turns cell source into a [`ParsedNode`] tree with the tree-sitter Python
//! grammar. Named grammar nodes become nodes; anonymous nodes and the gaps
//! between children (whitespace, newlines) become tokens. Rendering a parsed
//! tree is byte-identical to its source.

use crate::error::StageError;
use serde_json::Value;
use tracing::warn;
use verdant_nodey::{ContentHash, DigestBuilder, Position};

/// Kind of notebook cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Code,
    Markdown,
}

impl CellKind {
    /// Kind label used when matching cells
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
        }
    }
}

/// Current on-screen state of one cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellSnapshot {
    pub kind: CellKind,
    pub source: String,
    /// nbformat output objects, in display order
    pub outputs: Vec<Value>,
}

impl CellSnapshot {
    /// Code cell without outputs
    #[must_use]
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            source: source.into(),
            outputs: Vec::new(),
        }
    }

    /// Markdown cell
    #[must_use]
    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markdown,
            source: source.into(),
            outputs: Vec::new(),
        }
    }

    /// With captured outputs
    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.outputs = outputs;
        self
    }
}

/// One entry of a parsed node's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedContent {
    Node(ParsedNode),
    Token(String),
}

/// Freshly parsed syntax node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNode {
    pub kind: String,
    /// Text of leaves
    pub literal: Option<String>,
    pub content: Vec<ParsedContent>,
    pub start: Position,
    pub end: Position,
    /// Structural digest, comparable with committed digests
    pub digest: ContentHash,
}

impl ParsedNode {
    fn leaf(kind: &str, text: &str, start: Position, end: Position) -> Self {
        Self {
            kind: kind.to_string(),
            literal: Some(text.to_string()),
            content: Vec::new(),
            start,
            end,
            digest: DigestBuilder::new(kind).literal(text).finish(),
        }
    }

    fn interior(kind: &str, content: Vec<ParsedContent>, start: Position, end: Position) -> Self {
        let mut builder = DigestBuilder::new(kind);
        for entry in &content {
            match entry {
                ParsedContent::Node(child) => builder.child(&child.digest),
                ParsedContent::Token(text) => builder.token(text),
            };
        }
        Self {
            kind: kind.to_string(),
            literal: None,
            digest: builder.finish(),
            content,
            start,
            end,
        }
    }

    /// Direct child nodes in source order
    pub fn children(&self) -> impl Iterator<Item = &ParsedNode> {
        self.content.iter().filter_map(|entry| match entry {
            ParsedContent::Node(node) => Some(node),
            ParsedContent::Token(_) => None,
        })
    }

    /// Source text of this node
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        if let Some(literal) = &self.literal {
            out.push_str(literal);
        }
        for entry in &self.content {
            match entry {
                ParsedContent::Node(node) => node.write_text(out),
                ParsedContent::Token(text) => out.push_str(text),
            }
        }
    }

    /// Number of nodes in this subtree
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children().map(ParsedNode::node_count).sum::<usize>()
    }
}

/// Digest of a markdown cell, comparable across versions
#[must_use]
pub fn markdown_digest(text: &str) -> ContentHash {
    DigestBuilder::new("markdown").literal(text).finish()
}

/// Python cell parser
pub struct CodeParser {
    parser: tree_sitter::Parser,
}

impl CodeParser {
    /// Create parser for the Python grammar
    ///
    /// # Errors
    /// Returns [`StageError::Parser`] if the grammar cannot be loaded
    pub fn new() -> Result<Self, StageError> {
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| StageError::Parser(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse cell source
    ///
    /// The root always spans the whole source. If the grammar produces no
    /// tree the cell becomes a single leaf.
    pub fn parse(&mut self, source: &str) -> ParsedNode {
        let lines = LineIndex::new(source);
        match self.parser.parse(source, None) {
            Some(tree) => build(tree.root_node(), source, 0, source.len(), &lines),
            None => {
                warn!(bytes = source.len(), "parser produced no tree, storing cell as a leaf");
                ParsedNode::leaf("module", source, lines.position(0), lines.position(source.len()))
            }
        }
    }
}

fn build(node: tree_sitter::Node<'_>, source: &str, start: usize, end: usize, lines: &LineIndex) -> ParsedNode {
    let mut cursor = node.walk();
    let children: Vec<tree_sitter::Node<'_>> = node.children(&mut cursor).collect();
    let kind = node.kind();

    if !children.iter().any(tree_sitter::Node::is_named) {
        return ParsedNode::leaf(kind, slice(source, start, end), lines.position(start), lines.position(end));
    }

    let mut content = Vec::with_capacity(children.len());
    let mut pos = start;
    for child in children {
        let child_start = child.start_byte().clamp(pos, end);
        let child_end = child.end_byte().clamp(child_start, end);
        push_token(&mut content, slice(source, pos, child_start));
        if child.is_named() {
            content.push(ParsedContent::Node(build(child, source, child_start, child_end, lines)));
        } else {
            push_token(&mut content, slice(source, child_start, child_end));
        }
        pos = child_end;
    }
    push_token(&mut content, slice(source, pos, end));

    ParsedNode::interior(kind, content, lines.position(start), lines.position(end))
}

fn slice(source: &str, start: usize, end: usize) -> &str {
    source.get(start..end).unwrap_or_default()
}

/// Append token text, merging with a preceding token
fn push_token(content: &mut Vec<ParsedContent>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(ParsedContent::Token(last)) = content.last_mut() {
        last.push_str(text);
    } else {
        content.push(ParsedContent::Token(text.to_string()));
    }
}

/// Byte offset → line/column lookup
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn position(&self, byte: usize) -> Position {
        let line = self.starts.partition_point(|&start| start <= byte).saturating_sub(1);
        let ch = byte - self.starts.get(line).copied().unwrap_or(0);
        Position::new(
            u32::try_from(line).unwrap_or(u32::MAX),
            u32::try_from(ch).unwrap_or(u32::MAX),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedNode {
        CodeParser::new().unwrap().parse(source)
    }

    #[test]
    fn rendering_reproduces_source() {
        for source in [
            "print(1)",
            "x = 1\n\n\ny = x + 2  # comment\n",
            "def f(a, b):\n    return a * b\n",
            "  leading_space()",
            "",
            "for i in range(3):\n\tprint(i)\n",
        ] {
            assert_eq!(parse(source).text(), source);
        }
    }

    #[test]
    fn syntax_errors_still_round_trip() {
        let source = "def broken(:\n    pass\n";
        assert_eq!(parse(source).text(), source);
    }

    #[test]
    fn identical_sources_share_digests() {
        assert_eq!(parse("a + b").digest, parse("a + b").digest);
        assert_ne!(parse("a + b").digest, parse("a - b").digest);
        assert_ne!(parse("a + b").digest, parse("a +  b").digest);
    }

    #[test]
    fn named_nodes_become_children() {
        let root = parse("print(1)");
        assert_eq!(root.kind, "module");
        assert!(root.literal.is_none());
        assert!(root.node_count() > 3);

        let mut leaves = Vec::new();
        collect_leaves(&root, &mut leaves);
        assert!(leaves.contains(&"print".to_string()));
        assert!(leaves.contains(&"1".to_string()));
    }

    fn collect_leaves(node: &ParsedNode, out: &mut Vec<String>) {
        if let Some(literal) = &node.literal {
            out.push(literal.clone());
        }
        for child in node.children() {
            collect_leaves(child, out);
        }
    }

    #[test]
    fn positions_are_line_and_column() {
        let root = parse("a = 1\nbb = 2\n");
        assert_eq!(root.start, Position::new(0, 0));
        assert_eq!(root.end, Position::new(2, 0));
        let second = root.children().nth(1).unwrap();
        assert_eq!(second.start, Position::new(1, 0));
        assert_eq!(second.end, Position::new(1, 6));
    }

    #[test]
    fn markdown_digest_tracks_text() {
        assert_eq!(markdown_digest("# a"), markdown_digest("# a"));
        assert_ne!(markdown_digest("# a"), markdown_digest("# b"));
    }
}
