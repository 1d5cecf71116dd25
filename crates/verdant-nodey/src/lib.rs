//! Verdant Nodey Model
//!
//! Versioned, content-addressed nodes for notebook history.
//!
//! # Core Concepts
//!
//! - [`NodeName`]: `"{cell}.{sub}.{version}"` address of one node version
//! - [`Lineage`]: `"{cell}.{sub}"`, one logical AST position over time
//! - [`Nodey`]: closed variant type (code cell, code, markdown, output)
//! - [`NodeyNotebook`]: ordered cell list at a notebook version
//! - [`ContentHash`]: Blake3 structural digest used to detect unchanged sub-trees
//! - [`render`]: linearize a committed version back into text
//!
//! # Example
//!
//! ```rust
//! use verdant_nodey::{lineage_of, Lineage, NodeName};
//!
//! let name: NodeName = "0.3.2".parse().unwrap();
//! assert_eq!(name.lineage(), Lineage::new(0, 3));
//! assert_eq!(name.next_version().to_string(), "0.3.3");
//! assert_eq!(lineage_of("0.3.2").unwrap().to_string(), "0.3");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod hash;
mod name;
mod nodey;
mod render;

pub use error::NodeyError;
pub use hash::{ContentHash, DigestBuilder, HashError};
pub use name::{lineage_of, make_name, parse_lineage_or_name, Lineage, NameError, NodeName};
pub use nodey::{
    code_digest, CheckpointId, ContentEntry, NodeMeta, Nodey, NodeyCode, NodeyMarkdown,
    NodeyNotebook, NodeyOutput, OffsiteRef, OutputPayload, Position, SyntaxToken,
};
pub use render::{render, sample_line, NodeResolver, Sample};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
