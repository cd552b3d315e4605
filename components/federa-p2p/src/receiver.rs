//! What a handler gets alongside an inbound message: a way to acknowledge
//! it and, for requests, a way to answer.

use std::sync::{Arc, Weak};

use federa_common::log::{debug, trace, warn};
use federa_proto::{Actor, FaultCode, Message, MessageId, NodeInstance, PToPActor, RingName};
use serde::Serialize;

use crate::events::{Event, EventSink};
use crate::manager::PointToPointManager;

#[derive(derive_more::Debug)]
pub struct OneWayReceiverContext {
    #[debug(skip)]
    events:     Arc<dyn EventSink>,
    from:       Option<(NodeInstance, RingName)>,
    action:     Arc<str>,
    message_id: Option<MessageId>,
}

/// Routes a reply back to the exact instance that sent the request.
#[derive(derive_more::Debug)]
pub struct RequestReceiverContext {
    #[debug(skip)]
    manager:    Weak<PointToPointManager>,
    #[debug(skip)]
    events:     Arc<dyn EventSink>,
    from:       NodeInstance,
    from_ring:  RingName,
    actor:      Actor,
    action:     Arc<str>,
    message_id: MessageId,
}

#[derive(Debug)]
pub enum ReceiverContext {
    OneWay(OneWayReceiverContext),
    Request(RequestReceiverContext),
}

impl OneWayReceiverContext {
    pub(crate) fn new(
        events: Arc<dyn EventSink>,
        message: &Message,
        from: Option<(NodeInstance, RingName)>,
    ) -> Self {
        Self {
            events,
            from,
            action: message.action().into(),
            message_id: message.message_id(),
        }
    }

    pub fn from_instance(&self) -> Option<NodeInstance> {
        self.from.as_ref().map(|(instance, _)| *instance)
    }

    pub fn from_ring(&self) -> Option<&RingName> {
        self.from.as_ref().map(|(_, ring)| ring)
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    pub fn accept(self) {
        trace!(action = %self.action, message_id = ?self.message_id, "one-way message accepted");
    }

    /// A one-way sender expects no answer; the rejection is only reported.
    pub fn reject(self, code: FaultCode) {
        self.events.emit(Event::Rejected {
            code,
            action: self.action,
            message_id: self.message_id,
        });
    }
}

impl RequestReceiverContext {
    pub(crate) fn new(
        manager: Weak<PointToPointManager>,
        events: Arc<dyn EventSink>,
        message: &Message,
        message_id: MessageId,
        from: NodeInstance,
        from_ring: RingName,
    ) -> Self {
        Self {
            manager,
            events,
            from,
            from_ring,
            actor: message.actor(),
            action: message.action().into(),
            message_id,
        }
    }

    pub fn from_instance(&self) -> NodeInstance {
        self.from
    }

    pub fn from_ring(&self) -> &RingName {
        &self.from_ring
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Sends `reply` to the requester. `false` if it could not be sent.
    pub fn reply(self, mut reply: Message) -> bool {
        if let Err(reason) = reply.set_relates_to(self.message_id) {
            warn!(%reason, action = %self.action, "cannot correlate reply");
            return false
        }
        let Some(manager) = self.manager.upgrade() else {
            debug!(action = %self.action, "manager is gone, reply discarded");
            return false
        };
        manager.ptop_send(reply, self.from, &self.from_ring, true, PToPActor::Direct)
    }

    pub fn reject(self, code: FaultCode) {
        self.reject_with(code, &())
    }

    /// Answers with a fault reply carrying `body`.
    pub fn reject_with<B: Serialize>(self, code: FaultCode, body: &B) {
        self.events.emit(Event::Rejected {
            code,
            action: self.action.clone(),
            message_id: Some(self.message_id),
        });
        match Message::fault(self.actor, code, body) {
            Ok(fault) => {
                let _ = self.reply(fault);
            },
            Err(reason) => warn!(%reason, %code, "cannot encode fault reply"),
        }
    }
}

impl ReceiverContext {
    pub fn reject(self, code: FaultCode) {
        match self {
            Self::OneWay(ctx) => ctx.reject(code),
            Self::Request(ctx) => ctx.reject(code),
        }
    }

    pub fn from_instance(&self) -> Option<NodeInstance> {
        match self {
            Self::OneWay(ctx) => ctx.from_instance(),
            Self::Request(ctx) => Some(ctx.from_instance()),
        }
    }

    pub fn from_ring(&self) -> Option<&RingName> {
        match self {
            Self::OneWay(ctx) => ctx.from_ring(),
            Self::Request(ctx) => Some(ctx.from_ring()),
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::OneWay(ctx) => ctx.message_id(),
            Self::Request(ctx) => Some(ctx.message_id()),
        }
    }

    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}
