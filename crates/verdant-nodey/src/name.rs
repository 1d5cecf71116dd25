//! Node names and lineages
//!
//! Every node version is addressed by a [`NodeName`] of the form
//! `"{cell}.{sub}.{version}"`. Stripping the version yields the node's
//! [`Lineage`], the same logical AST position across edits.
//!
//! # Examples
//! - `0.0.0` → first version of the root of cell 0
//! - `3.7.2` → third version of node 7 inside cell 3

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One logical node position over time: `"{cell}.{sub}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lineage {
    /// Cell the lineage belongs to
    pub cell: u32,
    /// Index of the node within the cell (0 is the cell root)
    pub sub: u32,
}

impl Lineage {
    /// Create a lineage
    #[inline]
    #[must_use]
    pub const fn new(cell: u32, sub: u32) -> Self {
        Self { cell, sub }
    }

    /// Root lineage of a cell
    #[inline]
    #[must_use]
    pub const fn cell_root(cell: u32) -> Self {
        Self { cell, sub: 0 }
    }

    /// Check if this lineage is the root of its cell
    #[inline]
    #[must_use]
    pub const fn is_cell_root(&self) -> bool {
        self.sub == 0
    }

    /// Name of a specific version in this lineage
    #[inline]
    #[must_use]
    pub const fn at(self, version: u32) -> NodeName {
        NodeName {
            cell: self.cell,
            sub: self.sub,
            version,
        }
    }
}

impl Display for Lineage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.cell, self.sub)
    }
}

impl FromStr for Lineage {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_components(s, 2)?;
        Ok(Self::new(parts[0], parts[1]))
    }
}

/// Full name of a node version: `"{cell}.{sub}.{version}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeName {
    /// Cell the node belongs to
    pub cell: u32,
    /// Index of the node within the cell
    pub sub: u32,
    /// Version within the lineage, starting at 0
    pub version: u32,
}

impl NodeName {
    /// Create a name from its three components
    #[inline]
    #[must_use]
    pub const fn new(cell: u32, sub: u32, version: u32) -> Self {
        Self { cell, sub, version }
    }

    /// Lineage key (the name without its version)
    #[inline]
    #[must_use]
    pub const fn lineage(&self) -> Lineage {
        Lineage::new(self.cell, self.sub)
    }

    /// Name of the next version in the same lineage
    #[inline]
    #[must_use]
    pub const fn next_version(&self) -> Self {
        Self::new(self.cell, self.sub, self.version + 1)
    }

    /// Check if both names belong to the same lineage
    #[inline]
    #[must_use]
    pub fn same_lineage(&self, other: &Self) -> bool {
        self.lineage() == other.lineage()
    }
}

impl From<NodeName> for Lineage {
    fn from(name: NodeName) -> Self {
        name.lineage()
    }
}

impl From<&NodeName> for Lineage {
    fn from(name: &NodeName) -> Self {
        name.lineage()
    }
}

impl Display for NodeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.cell, self.sub, self.version)
    }
}

impl FromStr for NodeName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_components(s, 3)?;
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Build a name from a lineage and version
#[inline]
#[must_use]
pub const fn make_name(lineage: Lineage, version: u32) -> NodeName {
    lineage.at(version)
}

/// Strip the version from a name string, e.g. `"4.2.9"` → `"4.2"`
///
/// # Errors
/// Returns error if `name` is not a well-formed node name
pub fn lineage_of(name: &str) -> Result<Lineage, NameError> {
    name.parse::<NodeName>().map(|n| n.lineage())
}

/// Parse either a full name or a bare lineage key into a lineage
///
/// # Errors
/// Returns error if `s` is neither form
pub fn parse_lineage_or_name(s: &str) -> Result<Lineage, NameError> {
    match s.split('.').count() {
        2 => s.parse(),
        _ => lineage_of(s),
    }
}

fn split_components(s: &str, expected: usize) -> Result<Vec<u32>, NameError> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != expected {
        return Err(NameError::WrongComponentCount {
            input: s.to_string(),
            expected,
            actual: parts.len(),
        });
    }
    parts
        .iter()
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(NameError::InvalidComponent {
                    input: s.to_string(),
                    component: (*part).to_string(),
                });
            }
            part.parse::<u32>().map_err(|_| NameError::InvalidComponent {
                input: s.to_string(),
                component: (*part).to_string(),
            })
        })
        .collect()
}

macro_rules! string_serde {
    ($ty:ty, $expecting:literal) => {
        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct NameVisitor;

                impl serde::de::Visitor<'_> for NameVisitor {
                    type Value = $ty;

                    fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                        formatter.write_str($expecting)
                    }

                    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        value.parse().map_err(serde::de::Error::custom)
                    }
                }

                deserializer.deserialize_str(NameVisitor)
            }
        }
    };
}

string_serde!(NodeName, "a node name of the form \"cell.sub.version\"");
string_serde!(Lineage, "a lineage key of the form \"cell.sub\"");

/// Errors from parsing names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Wrong number of dot-separated components
    #[error("malformed name '{input}': expected {expected} components, got {actual}")]
    WrongComponentCount {
        input: String,
        expected: usize,
        actual: usize,
    },

    /// A component is empty or not an unsigned integer
    #[error("malformed name '{input}': invalid component '{component}'")]
    InvalidComponent { input: String, component: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn name_display_and_parse() {
        let name = NodeName::new(3, 7, 2);
        assert_eq!(name.to_string(), "3.7.2");
        assert_eq!("3.7.2".parse::<NodeName>().unwrap(), name);
    }

    #[test]
    fn lineage_strips_version() {
        assert_eq!(lineage_of("4.2.9").unwrap(), Lineage::new(4, 2));
        assert_eq!(NodeName::new(4, 2, 9).lineage().to_string(), "4.2");
    }

    #[test]
    fn next_version_stays_in_lineage() {
        let name = NodeName::new(0, 0, 0);
        let next = name.next_version();
        assert_eq!(next.to_string(), "0.0.1");
        assert!(name.same_lineage(&next));
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(matches!(
            "1.2".parse::<NodeName>(),
            Err(NameError::WrongComponentCount { actual: 2, .. })
        ));
        assert!(matches!(
            "1..2".parse::<NodeName>(),
            Err(NameError::InvalidComponent { .. })
        ));
        assert!(matches!(
            "1.-2.3".parse::<NodeName>(),
            Err(NameError::InvalidComponent { .. })
        ));
        assert!("c.1.0".parse::<NodeName>().is_err());
        assert!("1.2.3".parse::<Lineage>().is_err());
    }

    #[test]
    fn lineage_or_name_accepts_both_forms() {
        assert_eq!(parse_lineage_or_name("5.1").unwrap(), Lineage::new(5, 1));
        assert_eq!(parse_lineage_or_name("5.1.8").unwrap(), Lineage::new(5, 1));
        assert!(parse_lineage_or_name("5").is_err());
    }

    #[test]
    fn names_serialize_as_strings() {
        let name = NodeName::new(1, 4, 0);
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"1.4.0\"");
        let back: NodeName = serde_json::from_str("\"1.4.0\"").unwrap();
        assert_eq!(back, name);
        let lineage: Lineage = serde_json::from_str("\"1.4\"").unwrap();
        assert_eq!(lineage, Lineage::new(1, 4));
    }

    #[test]
    fn names_order_by_lineage_then_version() {
        let mut names = vec![
            NodeName::new(1, 0, 0),
            NodeName::new(0, 2, 1),
            NodeName::new(0, 2, 0),
        ];
        names.sort();
        assert_eq!(
            names,
            vec![
                NodeName::new(0, 2, 0),
                NodeName::new(0, 2, 1),
                NodeName::new(1, 0, 0)
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_name_string_round_trip(cell in any::<u32>(), sub in any::<u32>(), version in any::<u32>()) {
            let name = NodeName::new(cell, sub, version);
            let parsed: NodeName = name.to_string().parse().unwrap();
            prop_assert_eq!(parsed, name);
            prop_assert_eq!(lineage_of(&name.to_string()).unwrap(), Lineage::new(cell, sub));
        }
    }
}
