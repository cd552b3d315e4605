use std::sync::atomic::{AtomicU8, Ordering};

use crate::metadata::MessageMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[repr(u8)]
pub enum NodeLifecycle {
    Opening = 0,
    Open    = 1,
    Closing = 2,
    Closed  = 3,
}

impl NodeLifecycle {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Opening,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(NodeLifecycle::Opening as u8))
    }

    pub(crate) fn get(&self) -> NodeLifecycle {
        NodeLifecycle::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves forward only; returns the state that was replaced.
    pub(crate) fn advance(&self, to: NodeLifecycle) -> NodeLifecycle {
        NodeLifecycle::from_raw(self.0.fetch_max(to as u8, Ordering::AcqRel))
    }

    pub(crate) fn admits(&self, metadata: &MessageMetadata) -> bool {
        match self.get() {
            NodeLifecycle::Open => true,
            NodeLifecycle::Closing => metadata.process_during_close,
            NodeLifecycle::Opening | NodeLifecycle::Closed => false,
        }
    }
}
