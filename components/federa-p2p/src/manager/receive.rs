use federa_common::log::{debug, trace, warn};
use federa_proto::headers::PToPHeader;
use federa_proto::{Actor, FaultCode, Message, NodeDoesNotMatchFaultBody, PToPActor};
use tokio::time::Instant;

use super::PointToPointManager;
use crate::events::{DropReason, Event, EventSinkExt};
use crate::receiver::{OneWayReceiverContext, ReceiverContext, RequestReceiverContext};
use crate::transport::SendTarget;

impl PointToPointManager {
    /// Entry point for every message the transport (or the loopback queue)
    /// delivers. `reply_target` is the transport's handle back to the sender,
    /// if it has one.
    pub fn process_incoming_transport_message(
        &self,
        message: Message,
        reply_target: Option<SendTarget>,
    ) {
        let message_id = message.message_id();

        if !message.is_valid() {
            trace!(action = message.action(), ?message_id, "invalid message");
            self.events.dropped(DropReason::Invalid, message.action(), message_id);
            return
        }
        if self.lease.is_lease_expired() && !self.config.is_lease_exempt(message.action()) {
            trace!(action = message.action(), ?message_id, "lease expired, not accepting");
            self.events.dropped(DropReason::LeaseExpired, message.action(), message_id);
            return
        }

        let header = match message.headers().try_read_first::<PToPHeader>() {
            Ok(Some(header)) => header,
            Ok(None) => {
                warn!(action = message.action(), ?message_id, "no point-to-point header");
                self.events.dropped(DropReason::HeaderMissing, message.action(), message_id);
                return
            },
            Err(reason) => {
                let action = message.action();
                warn!(%reason, action, ?message_id, "unreadable point-to-point header");
                self.events.dropped(DropReason::HeaderMissing, message.action(), message_id);
                return
            },
        };

        let exact = header.to == self.instance || message.idempotent();
        let consolidated =
            self.partners
                .consolidate(header.from, &header.from_ring, reply_target, exact);
        let partner = match consolidated {
            Ok(partner) => partner,
            Err(reason) => {
                warn!(%reason, action = message.action(), from = %header.from, "stale sender");
                self.events.dropped(DropReason::StaleInstance, message.action(), message_id);
                return
            },
        };
        partner.record_receive(Instant::now());
        self.events.emit(Event::Received {
            action: message.action().into(),
            from:   header.from,
        });

        if !message.is_valid() || (message.expects_reply() && message_id.is_none()) {
            debug!(action = message.action(), from = %header.from, "malformed message");
            self.events.dropped(DropReason::Invalid, message.action(), message_id);
            return
        }

        let instance_mismatch =
            !message.idempotent() && header.exact_instance && header.to != self.instance;
        if instance_mismatch || header.to.id != self.instance.id || header.to_ring != self.ring {
            return self.on_node_mismatch(message, &header)
        }

        if message.is_reply() {
            self.requests.on_reply_message(message);
            return
        }

        let context = match message_id {
            Some(id) if message.expects_reply() => {
                ReceiverContext::Request(RequestReceiverContext::new(
                    self.weak_self.clone(),
                    self.events.clone(),
                    &message,
                    id,
                    header.from,
                    header.from_ring.clone(),
                ))
            },
            _ => {
                ReceiverContext::OneWay(OneWayReceiverContext::new(
                    self.events.clone(),
                    &message,
                    Some((header.from, header.from_ring.clone())),
                ))
            },
        };
        self.actors.dispatch(&message, context);
    }

    fn on_node_mismatch(&self, message: Message, header: &PToPHeader) {
        debug!(
            action = message.action(),
            to = %header.to,
            to_ring = %header.to_ring,
            local = %self.instance,
            ring = %self.ring,
            "message is not for this node"
        );
        let body = NodeDoesNotMatchFaultBody {
            instance: header.to,
            ring:     header.to_ring.clone(),
        };
        let message_id = message.message_id();

        if message.expects_reply() {
            if let Some(id) = message_id {
                let ctx = RequestReceiverContext::new(
                    self.weak_self.clone(),
                    self.events.clone(),
                    &message,
                    id,
                    header.from,
                    header.from_ring.clone(),
                );
                return ctx.reject_with(FaultCode::NodeDoesNotMatch, &body)
            }
        }

        if message.is_reply() {
            self.events.dropped(DropReason::StrayReply, message.action(), message_id);
            return
        }

        // Faults are never answered with faults.
        if message.actor() == Actor::FEDERATION && message.fault_code().is_none() {
            match Message::fault(Actor::FEDERATION, FaultCode::NodeDoesNotMatch, &body) {
                Ok(fault) => {
                    self.events.emit(Event::Rejected {
                        code:       FaultCode::NodeDoesNotMatch,
                        action:     message.action().into(),
                        message_id,
                    });
                    self.ptop_send(
                        fault,
                        header.from,
                        &header.from_ring,
                        true,
                        PToPActor::Federation,
                    );
                },
                Err(reason) => warn!(%reason, "cannot encode node-does-not-match fault"),
            }
            return
        }

        self.events.dropped(DropReason::NodeMismatch, message.action(), message_id);
    }
}
