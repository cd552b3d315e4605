use federa_common::impl_error_kind;
use serde::{Deserialize, Serialize};

use crate::node::{NodeInstance, RingName};

/// Error codes carried back to a sender inside a `FaultHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FaultCode {
    /// The receiver is not the node (instance or ring) the sender aimed at.
    NodeDoesNotMatch,
    /// No handler is registered for the message's actor, or none matched.
    MessageHandlerDoesNotExist,
    /// The receiver is not in a lifecycle state to process the message.
    NotReady,
    /// The receiver's message queue is full; retry later.
    QueueFull,
    /// The action is no longer supported.
    Deprecated,
    /// The message could not be understood.
    InvalidMessage,
    /// The message carried an out-of-date generation.
    StaleGeneration,
    /// The addressed entity is unknown to the receiver.
    EntityNotFound,
    /// The receiver is shutting down.
    ObjectClosed,
}

impl_error_kind!(FaultCode);

impl FaultCode {
    /// Whether the sender may reasonably retry the same message later.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NotReady | Self::QueueFull | Self::ObjectClosed)
    }
}

/// Body of a `NodeDoesNotMatch` fault: the target the sender believed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDoesNotMatchFaultBody {
    pub instance: NodeInstance,
    pub ring:     RingName,
}
