//! PropertyPath parsing and formatting.
//!
//! Grammar:
//!   node/.../node:property:subproperty
//! - '/' separates node names walked from the mixer's root node
//! - ':' separates sub-names addressed on the resolved node
//!   Examples:
//!   "Body/Arm:position" -> nodes=["Body","Arm"], subnames=["position"]
//!   "Body/Arm:position:x" -> nodes=["Body","Arm"], subnames=["position","x"]
//!   "Speaker" -> nodes=["Speaker"], subnames=[]
//!   ".:modulate" -> nodes=[], subnames=["modulate"] (the root node itself)
//!
//! Paths are compared and hashed structurally, so "./Arm:x" and "Arm:x" are
//! the same key.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty property path")]
    Empty,
    #[error("invalid property path '{path}': {reason}")]
    Invalid { path: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PropertyPath {
    /// Node names walked from the root (may be empty for the root itself)
    pub nodes: Vec<String>,
    /// Ordered sub-names on the resolved node (may be empty)
    pub subnames: Vec<String>,
}

impl PropertyPath {
    pub fn new(nodes: Vec<String>, subnames: Vec<String>) -> Self {
        Self { nodes, subnames }
    }

    /// Parse a path string according to the grammar described above.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let invalid = |reason| PathError::Invalid {
            path: s.to_string(),
            reason,
        };
        if s.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let mut parts = s.split(':');
        let node_part = parts.next().unwrap_or_default();
        let subnames: Vec<String> = parts.map(str::to_string).collect();
        if subnames.iter().any(|seg| seg.is_empty()) {
            return Err(invalid("empty sub-name"));
        }

        let mut nodes = Vec::new();
        if !node_part.is_empty() {
            for seg in node_part.split('/') {
                match seg {
                    "" => return Err(invalid("empty node segment")),
                    "." => {}
                    other => nodes.push(other.to_string()),
                }
            }
        } else if subnames.is_empty() {
            return Err(invalid("no node and no sub-name"));
        }

        Ok(PropertyPath { nodes, subnames })
    }

    /// The node-only part of this path (sub-names dropped).
    pub fn node_path(&self) -> PropertyPath {
        PropertyPath {
            nodes: self.nodes.clone(),
            subnames: Vec::new(),
        }
    }

    /// Sub-names joined with ':' (empty when the path addresses a node).
    pub fn concatenated_subnames(&self) -> String {
        self.subnames.join(":")
    }

    pub fn has_subnames(&self) -> bool {
        !self.subnames.is_empty()
    }

    /// Append another path's nodes after this one's (sub-names come from `other`).
    pub fn join(&self, other: &PropertyPath) -> PropertyPath {
        let mut nodes = self.nodes.clone();
        nodes.extend(other.nodes.iter().cloned());
        PropertyPath {
            nodes,
            subnames: other.subnames.clone(),
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            f.write_str(".")?;
        } else {
            f.write_str(&self.nodes.join("/"))?;
        }
        for sub in &self.subnames {
            write!(f, ":{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for PropertyPath {
    type Err = PathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyPath::parse(s)
    }
}

// Serialize as the path string.
impl Serialize for PropertyPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D>(deserializer: D) -> Result<PropertyPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PropertyPath::parse(&s).map_err(de::Error::custom)
    }
}
