//! Text rendering of committed versions
//!
//! [`render`] linearizes a node back into the text it was committed from.
//! Rendering the same committed version always yields byte-identical text.

use crate::error::NodeyError;
use crate::name::NodeName;
use crate::nodey::{ContentEntry, Nodey, NodeyCode};
use std::sync::Arc;

/// Lookup of committed versions by name
///
/// Implemented by the history store; tests implement it over a plain map.
pub trait NodeResolver {
    /// Resolve a version, `None` if it is not committed
    fn resolve(&self, name: &NodeName) -> Option<Arc<Nodey>>;
}

impl<R: NodeResolver + ?Sized> NodeResolver for &R {
    fn resolve(&self, name: &NodeName) -> Option<Arc<Nodey>> {
        (**self).resolve(name)
    }
}

/// Render a node to text
///
/// Code nodes concatenate their literal, then every content entry in
/// order. Markdown renders its text. Outputs render the JSON encoding of
/// their payloads (offsite payloads as their reference).
///
/// # Errors
/// - [`NodeyError::NotFound`] if a child version cannot be resolved
/// - [`NodeyError::UnexpectedKind`] if a child is not a code node
pub fn render<R: NodeResolver + ?Sized>(nodey: &Nodey, resolver: &R) -> Result<String, NodeyError> {
    match nodey {
        Nodey::CodeCell(code) | Nodey::Code(code) => {
            let mut out = String::new();
            render_code(code, resolver, &mut out)?;
            Ok(out)
        }
        Nodey::Markdown(md) => Ok(md.markdown.clone()),
        Nodey::Output(output) => Ok(serde_json::to_string(&output.raw)?),
    }
}

fn render_code<R: NodeResolver + ?Sized>(
    code: &NodeyCode,
    resolver: &R,
    out: &mut String,
) -> Result<(), NodeyError> {
    if let Some(literal) = &code.literal {
        out.push_str(literal);
    }
    for entry in &code.content {
        match entry {
            ContentEntry::Token(token) => out.push_str(&token.tokens),
            ContentEntry::Child(name) => {
                let child = resolver.resolve(name).ok_or(NodeyError::NotFound(*name))?;
                let child_code = match child.as_ref() {
                    Nodey::Code(child_code) => child_code,
                    other => {
                        return Err(NodeyError::UnexpectedKind {
                            name: *name,
                            expected: 'c',
                            actual: other.type_char(),
                        })
                    }
                };
                render_code(child_code, resolver, out)?;
            }
        }
    }
    Ok(())
}

/// A single line sampled from a node's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub line: String,
    /// Byte column of the focus keyword within the line (0 without focus)
    pub column: usize,
}

/// Sample one line of a node for previews
///
/// Without `focus`, returns the first line. With `focus`, returns the first
/// line containing the focus's first keyword (case-insensitive), or `None`
/// if no line does.
///
/// # Errors
/// Propagates [`render`] errors
pub fn sample_line<R: NodeResolver + ?Sized>(
    nodey: &Nodey,
    resolver: &R,
    focus: Option<&str>,
) -> Result<Option<Sample>, NodeyError> {
    let text = render(nodey, resolver)?;
    let Some(keyword) = focus.and_then(|f| f.split_whitespace().next()) else {
        return Ok(Some(Sample {
            line: text.lines().next().unwrap_or_default().to_string(),
            column: 0,
        }));
    };
    Ok(text.lines().find_map(|line| {
        find_ignore_case(line, keyword).map(|column| Sample {
            line: line.to_string(),
            column,
        })
    }))
}

/// Byte offset into `haystack` where `needle` starts, ignoring case
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    haystack.char_indices().map(|(at, _)| at).find(|&at| {
        let mut rest = haystack[at..].chars().flat_map(char::to_lowercase);
        needle.iter().all(|c| rest.next() == Some(*c))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::nodey::{CheckpointId, NodeMeta, NodeyMarkdown, Position, SyntaxToken};
    use std::collections::HashMap;

    struct MapResolver(HashMap<NodeName, Arc<Nodey>>);

    impl NodeResolver for MapResolver {
        fn resolve(&self, name: &NodeName) -> Option<Arc<Nodey>> {
            self.0.get(name).cloned()
        }
    }

    fn code(name: NodeName, kind: &str, literal: Option<&str>, content: Vec<ContentEntry>) -> NodeyCode {
        NodeyCode {
            meta: NodeMeta {
                name,
                created: CheckpointId(0),
                notebook: 0,
                parent: None,
            },
            kind: kind.to_string(),
            literal: literal.map(str::to_string),
            content,
            start: Position::default(),
            end: Position::default(),
            digest: ContentHash::default(),
        }
    }

    fn print_call() -> (Nodey, MapResolver) {
        let ident = NodeName::new(0, 1, 0);
        let arg = NodeName::new(0, 2, 0);
        let mut map = HashMap::new();
        map.insert(ident, Arc::new(Nodey::Code(code(ident, "identifier", Some("print"), vec![]))));
        map.insert(arg, Arc::new(Nodey::Code(code(arg, "integer", Some("1"), vec![]))));
        let root = Nodey::CodeCell(code(
            NodeName::new(0, 0, 0),
            "module",
            None,
            vec![
                ContentEntry::Child(ident),
                ContentEntry::Token(SyntaxToken::new("(")),
                ContentEntry::Child(arg),
                ContentEntry::Token(SyntaxToken::new(")\n")),
            ],
        ));
        (root, MapResolver(map))
    }

    #[test]
    fn render_walks_content_in_order() {
        let (root, resolver) = print_call();
        assert_eq!(render(&root, &resolver).unwrap(), "print(1)\n");
    }

    #[test]
    fn render_reports_missing_child() {
        let (root, _) = print_call();
        let empty = MapResolver(HashMap::new());
        assert!(matches!(
            render(&root, &empty),
            Err(NodeyError::NotFound(name)) if name == NodeName::new(0, 1, 0)
        ));
    }

    #[test]
    fn render_markdown_is_verbatim() {
        let md = Nodey::Markdown(NodeyMarkdown {
            meta: NodeMeta {
                name: NodeName::new(1, 0, 0),
                created: CheckpointId(0),
                notebook: 0,
                parent: None,
            },
            markdown: "# Title\nbody".to_string(),
        });
        let resolver = MapResolver(HashMap::new());
        assert_eq!(render(&md, &resolver).unwrap(), "# Title\nbody");
    }

    #[test]
    fn sample_line_with_focus() {
        let (root, resolver) = print_call();
        let sample = sample_line(&root, &resolver, Some("PRINT stuff")).unwrap().unwrap();
        assert_eq!(sample.line, "print(1)");
        assert_eq!(sample.column, 0);
        assert!(sample_line(&root, &resolver, Some("missing")).unwrap().is_none());
    }

    #[test]
    fn sample_column_indexes_the_original_line() {
        let md = Nodey::Markdown(NodeyMarkdown {
            meta: NodeMeta {
                name: NodeName::new(2, 0, 0),
                created: CheckpointId(0),
                notebook: 0,
                parent: None,
            },
            markdown: "intro\n# İstanbul PRINT run".to_string(),
        });
        let resolver = MapResolver(HashMap::new());
        let sample = sample_line(&md, &resolver, Some("print")).unwrap().unwrap();
        assert_eq!(sample.line, "# İstanbul PRINT run");
        assert_eq!(sample.column, 12);
        assert!(sample.line[sample.column..].starts_with("PRINT"));
    }
}
