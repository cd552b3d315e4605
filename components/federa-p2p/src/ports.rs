//! Collaborators the routing core consults but does not own.

use std::time::Duration;

use federa_proto::{Message, NodeInstance};

/// Reports whether the local node still holds a valid lease. While it does
/// not, only lease-exempt actions are sent or accepted.
pub trait LeaseAgent: Send + Sync + 'static {
    fn is_lease_expired(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysValidLease;

impl LeaseAgent for AlwaysValidLease {
    fn is_lease_expired(&self) -> bool {
        false
    }
}

impl<F> LeaseAgent for F
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    fn is_lease_expired(&self) -> bool {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackDelay {
    Immediate,
    After(Duration),
    /// Simulated partition: the message is never delivered.
    Drop,
}

/// Decides how a self-addressed message is delivered.
pub trait DeliveryScheduler: Send + Sync + 'static {
    fn loopback_delay(&self, message: &Message, local: NodeInstance) -> LoopbackDelay;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateDelivery;

impl DeliveryScheduler for ImmediateDelivery {
    fn loopback_delay(&self, _message: &Message, _local: NodeInstance) -> LoopbackDelay {
        LoopbackDelay::Immediate
    }
}
