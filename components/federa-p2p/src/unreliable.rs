//! Delay injection for self-addressed messages, used by simulation and test
//! deployments. Compiled only with the `unreliable-transport` feature.

use std::time::Duration;

use federa_proto::{Message, NodeInstance};
use serde::{Deserialize, Serialize};

use crate::ports::{DeliveryScheduler, LoopbackDelay};

/// Matches messages by action; `"*"` matches every action. Without
/// `delay_ms` the delay is infinite and matching messages are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreliableTransportRule {
    pub action:   String,
    #[serde(default, with = "federa_common::serde::opt_duration_ms")]
    pub delay_ms: Option<Duration>,
}

/// The first matching rule decides; unmatched messages go immediately.
#[derive(Debug, Clone, Default)]
pub struct UnreliableTransport {
    rules: Vec<UnreliableTransportRule>,
}

impl UnreliableTransport {
    pub fn new(rules: Vec<UnreliableTransportRule>) -> Self {
        Self { rules }
    }
}

impl DeliveryScheduler for UnreliableTransport {
    fn loopback_delay(&self, message: &Message, _local: NodeInstance) -> LoopbackDelay {
        let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.action == "*" || r.action == message.action())
        else {
            return LoopbackDelay::Immediate
        };
        match rule.delay_ms {
            None => LoopbackDelay::Drop,
            Some(d) if d.is_zero() => LoopbackDelay::Immediate,
            Some(d) => LoopbackDelay::After(d),
        }
    }
}
