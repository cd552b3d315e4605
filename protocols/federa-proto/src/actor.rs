use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse-grained message category, used to pick a registered handler set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(pub u16);

impl Actor {
    pub const FEDERATION: Self = Self(1);
    pub const ROUTING: Self = Self(2);
    pub const TRANSPORT: Self = Self(3);
    pub const FM: Self = Self(10);
    pub const RA: Self = Self(11);
    pub const RAP: Self = Self(12);
}

/// Top-level transport actor a point-to-point message travels under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PToPActor {
    Direct,
    Routing,
    Broadcast,
    /// Reserved.
    Federation,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FEDERATION => f.write_str("Federation"),
            Self::ROUTING => f.write_str("Routing"),
            Self::TRANSPORT => f.write_str("Transport"),
            Self::FM => f.write_str("FM"),
            Self::RA => f.write_str("RA"),
            Self::RAP => f.write_str("RAP"),
            Self(code) => write!(f, "Actor({})", code),
        }
    }
}
