//! Observability port. Components report what happened to a message through
//! an [`EventSink`] instead of writing to process-wide state.

use std::fmt;
use std::sync::Arc;

use federa_common::log::{debug, info, trace, warn};
use federa_proto::{FaultCode, MessageId, NodeInstance, RingName};

/// Why a message was dropped; each reason is traced distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    Invalid,
    LeaseExpired,
    HeaderMissing,
    StaleInstance,
    NoSendTarget,
    TransportFailure,
    SimulatedPartition,
    NodeMismatch,
    StrayReply,
    UnknownAction,
    Deprecated,
    NotReady,
    QueueFull,
    InvalidBody,
    StaleGeneration,
    EntityNotFound,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Dropped {
        reason:     DropReason,
        action:     Arc<str>,
        message_id: Option<MessageId>,
    },
    Rejected {
        code:       FaultCode,
        action:     Arc<str>,
        message_id: Option<MessageId>,
    },
    Sent {
        action:   Arc<str>,
        to:       NodeInstance,
        loopback: bool,
    },
    Received {
        action: Arc<str>,
        from:   NodeInstance,
    },
    ReplyCorrelated {
        id: MessageId,
    },
    PartnerShutdown {
        instance: NodeInstance,
        ring:     RingName,
    },
    EntityCreated {
        entity: Arc<str>,
    },
    JobScheduled {
        action: Arc<str>,
        entity: Arc<str>,
    },
}

pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: Event);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::Dropped {
                reason,
                action,
                message_id,
            } => {
                match reason {
                    DropReason::HeaderMissing
                    | DropReason::StaleInstance
                    | DropReason::NoSendTarget
                    | DropReason::TransportFailure
                    | DropReason::QueueFull => {
                        warn!(%reason, %action, message_id = ?message_id, "dropping message")
                    },
                    _ => debug!(%reason, %action, message_id = ?message_id, "dropping message"),
                }
            },
            Event::Rejected {
                code,
                action,
                message_id,
            } => info!(%code, %action, message_id = ?message_id, "rejecting message"),
            Event::PartnerShutdown { instance, ring } => {
                info!(%instance, %ring, "partner marked as shut down")
            },
            other => trace!(event = ?other),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub trait EventSinkExt {
    fn dropped(&self, reason: DropReason, action: &str, message_id: Option<MessageId>);
}

impl EventSinkExt for Arc<dyn EventSink> {
    fn dropped(&self, reason: DropReason, action: &str, message_id: Option<MessageId>) {
        self.emit(Event::Dropped {
            reason,
            action: action.into(),
            message_id,
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use recording::RecordingEventSink;

#[cfg(any(test, feature = "test-util"))]
mod recording {
    use parking_lot::Mutex;

    use super::*;

    /// Keeps every event in memory; also forwards to `tracing`.
    #[derive(Debug, Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingEventSink {
        pub fn new() -> Arc<Self> {
            Default::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        pub fn drops(&self) -> Vec<DropReason> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| {
                    match e {
                        Event::Dropped { reason, .. } => Some(*reason),
                        _ => None,
                    }
                })
                .collect()
        }

        pub fn rejections(&self) -> Vec<FaultCode> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| {
                    match e {
                        Event::Rejected { code, .. } => Some(*code),
                        _ => None,
                    }
                })
                .collect()
        }

        pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.lock().iter().filter(|e| pred(e)).count()
        }

        pub fn clear(&self) {
            self.events.lock().clear();
        }
    }

    impl EventSink for RecordingEventSink {
        fn emit(&self, event: Event) {
            TracingEventSink.emit(event.clone());
            self.events.lock().push(event);
        }
    }
}
