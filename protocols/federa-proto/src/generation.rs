use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// The configuration round a message was produced in.
///
/// Ordered by `number` first; `owner` breaks ties between two rounds started
/// concurrently by different nodes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation {
    pub number: u64,
    pub owner:  NodeId,
}

impl Generation {
    pub const fn new(number: u64, owner: NodeId) -> Self {
        Self { number, owner }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.number, self.owner)
    }
}
