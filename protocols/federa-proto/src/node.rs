use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of a node; stays the same across restarts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u128);

/// A node identity paired with the epoch of the process currently holding it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeInstance {
    pub id:       NodeId,
    pub instance: u64,
}

/// Name of a ring, i.e. a partition of the overall topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RingName(Arc<str>);

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ParseNodeError {
    #[display("invalid node id: {_0}")]
    NodeId(String),
    #[display("invalid instance: {_0}")]
    Instance(String),
    #[display("expected <node-id>:<instance>")]
    Format,
}

impl std::error::Error for ParseNodeError {}

impl NodeInstance {
    pub const fn new(id: NodeId, instance: u64) -> Self {
        Self { id, instance }
    }

    /// Same identity and same epoch.
    pub fn matches(&self, other: &Self) -> bool {
        self == other
    }

    /// Same identity, possibly another epoch.
    pub fn same_node(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl RingName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ParseNodeError::NodeId(s.to_owned()))
    }
}

impl fmt::Display for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.instance)
    }
}

impl FromStr for NodeInstance {
    type Err = ParseNodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, instance) = s.split_once(':').ok_or(ParseNodeError::Format)?;
        let id = id.parse()?;
        let instance = instance
            .parse()
            .map_err(|_| ParseNodeError::Instance(instance.to_owned()))?;
        Ok(Self { id, instance })
    }
}

impl fmt::Display for RingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for RingName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RingName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
