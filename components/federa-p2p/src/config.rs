use std::time::Duration;

use federa_common::validation::Validate;
use federa_jobs::JobQueueLimits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    /// Actions that are still sent and accepted after the local lease has
    /// expired, so that arbitration can complete.
    pub lease_exempt_actions: Vec<String>,

    /// Bounds the queue of self-addressed messages.
    pub loopback: JobQueueLimits,

    #[serde(with = "federa_common::serde::duration_ms")]
    pub default_request_timeout: Duration,

    #[cfg(feature = "unreliable-transport")]
    pub unreliable_transport: Vec<crate::unreliable::UnreliableTransportRule>,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            lease_exempt_actions: [
                "ArbitrateRequest",
                "ArbitrateReply",
                "VoteTicketRequest",
                "VoteTicketReply",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            loopback: JobQueueLimits {
                max_pending:     10_000,
                max_concurrency: 1,
            },
            default_request_timeout: Duration::from_secs(30),
            #[cfg(feature = "unreliable-transport")]
            unreliable_transport: Vec::new(),
        }
    }
}

impl P2pConfig {
    pub fn is_lease_exempt(&self, action: &str) -> bool {
        self.lease_exempt_actions.iter().any(|a| a == action)
    }
}

impl Validate for P2pConfig {
    fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.default_request_timeout.is_zero() {
            errors.push("default_request_timeout must be positive".to_owned());
        }
        if self.loopback.max_pending == 0 {
            errors.push("loopback.max_pending must be positive".to_owned());
        }
        if self.loopback.max_concurrency == 0 {
            errors.push("loopback.max_concurrency must be positive".to_owned());
        }
        if self.lease_exempt_actions.iter().any(String::is_empty) {
            errors.push("lease_exempt_actions must not contain empty names".to_owned());
        }
        #[cfg(feature = "unreliable-transport")]
        for (idx, rule) in self.unreliable_transport.iter().enumerate() {
            if rule.action.is_empty() {
                errors.push(format!("unreliable_transport[{}]: action must not be empty", idx));
            }
        }
        errors
    }
}
