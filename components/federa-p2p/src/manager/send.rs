use std::sync::Arc;
use std::time::Duration;

use federa_common::errors::error_of::ErrorOf;
use federa_common::log::{trace, warn};
use federa_proto::headers::{NeighborhoodHeader, PToPHeader};
use federa_proto::{
    CodecErrorKind, FaultCode, Message, MessageId, NodeInstance, PToPActor, RingName,
};

use super::PointToPointManager;
use crate::events::{DropReason, Event, EventSinkExt};
use crate::partner::Resolved;
use crate::request_table::{InsertErrorKind, PendingRequest, RequestErrorKind, RequestOperation};

impl PointToPointManager {
    /// Sends `message` one-way to `target` on `target_ring`.
    ///
    /// Returns whether the message was handed to the transport or to the
    /// loopback queue; every other outcome is reported to the event sink.
    pub fn ptop_send(
        &self,
        mut message: Message,
        target: NodeInstance,
        target_ring: &RingName,
        exact_instance: bool,
        actor: PToPActor,
    ) -> bool {
        if self.lease.is_lease_expired() && !self.config.is_lease_exempt(message.action()) {
            trace!(action = message.action(), %target, "lease expired, not sending");
            self.events.dropped(
                DropReason::LeaseExpired,
                message.action(),
                message.message_id(),
            );
            return false
        }

        let id = match message.ensure_message_id() {
            Ok(id) => id,
            Err(reason) => {
                warn!(%reason, action = message.action(), "cannot assign a message id");
                self.events.dropped(DropReason::Invalid, message.action(), None);
                return false
            },
        };
        if let Err(reason) =
            self.add_routing_headers(&mut message, target, target_ring, exact_instance, actor)
        {
            warn!(%reason, action = message.action(), %id, "cannot attach routing headers");
            self.events.dropped(DropReason::Invalid, message.action(), Some(id));
            return false
        }

        let partner = if target.id == self.instance.id && *target_ring == self.ring {
            Some(self.partners.local().clone())
        } else {
            self.partners.resolve(target.id, target_ring)
        };
        // An exact send to an instance that has since been replaced fails fast.
        let exact = exact_instance && !message.idempotent();
        let partner = partner.filter(|p| !exact || p.instance() <= target);
        let Some(resolved) = partner
            .as_ref()
            .and_then(|p| self.partners.send_target(p))
        else {
            warn!(action = message.action(), %id, %target, ring = %target_ring, "no send target");
            self.events.dropped(DropReason::NoSendTarget, message.action(), Some(id));
            return false
        };

        let action: Arc<str> = message.action().into();
        match resolved {
            Resolved::Loopback => {
                let delay = self.scheduler.loopback_delay(&message, self.instance);
                trace!(%action, %id, ?delay, "loopback");
                self.loopback.deliver(self.weak_self.clone(), message, delay);
                self.events.emit(Event::Sent {
                    action,
                    to: target,
                    loopback: true,
                });
                true
            },
            Resolved::Remote(send_target) => {
                if let Some(partner) = &partner {
                    partner.record_send();
                }
                match self.transport.send_one_way(&send_target, message) {
                    Ok(()) => {
                        self.events.emit(Event::Sent {
                            action,
                            to: target,
                            loopback: false,
                        });
                        true
                    },
                    Err(reason) => {
                        warn!(%reason, %action, %id, ?send_target, "transport refused message");
                        self.events.dropped(DropReason::TransportFailure, &action, Some(id));
                        false
                    },
                }
            },
        }
    }

    /// Sends `request` and registers it as pending. The reply, a timeout,
    /// a cancellation or closing the manager completes the returned handle.
    pub fn begin_ptop_send_request(
        &self,
        mut request: Message,
        target: NodeInstance,
        target_ring: &RingName,
        exact_instance: bool,
        actor: PToPActor,
        timeout: Option<Duration>,
    ) -> PendingRequest {
        let timeout = timeout.unwrap_or(self.config.default_request_timeout);
        let id = match prepare_request(&mut request) {
            Ok(id) => id,
            Err(reason) => {
                warn!(%reason, action = request.action(), "cannot prepare request");
                return PendingRequest::failed(
                    MessageId::next(),
                    target,
                    target_ring.clone(),
                    reason.map_kind(|_| RequestErrorKind::InvalidMessage),
                )
            },
        };

        let (operation, pending) = RequestOperation::new(id, target, target_ring.clone(), timeout);
        operation.start(self.requests.clone(), &self.handle);

        match self.requests.register(id, &operation) {
            Ok(true) => (),
            // The timer fired between `start` and the insert.
            Ok(false) => return pending,
            Err(reason) => {
                debug_assert!(!reason.is(InsertErrorKind::Conflict), "{}", reason);
                let kind = match reason.kind {
                    InsertErrorKind::Conflict => RequestErrorKind::Duplicate,
                    InsertErrorKind::Closed => RequestErrorKind::ObjectClosed,
                };
                operation.complete(Err(ErrorOf::new(kind, reason.message)));
                return pending
            },
        }

        self.ptop_send(request, target, target_ring, exact_instance, actor);
        pending
    }

    /// Waits for a request started with
    /// [`begin_ptop_send_request`](Self::begin_ptop_send_request). A
    /// `NodeDoesNotMatch` fault marks the target as shut down.
    pub async fn end_ptop_send_request(
        &self,
        pending: PendingRequest,
    ) -> Result<Message, ErrorOf<RequestErrorKind>> {
        let PendingRequest {
            id,
            target,
            ring,
            rx,
        } = pending;
        let result = rx.await.unwrap_or_else(|_| {
            Err(ErrorOf::new(
                RequestErrorKind::Cancelled,
                format!("request {} was abandoned", id),
            ))
        });
        if let Err(e) = &result {
            if e.is(RequestErrorKind::Fault(FaultCode::NodeDoesNotMatch)) {
                self.partners.mark_shutdown(target, &ring);
            }
        }
        result
    }

    pub async fn send_request(
        &self,
        request: Message,
        target: NodeInstance,
        target_ring: &RingName,
        exact_instance: bool,
        actor: PToPActor,
        timeout: Option<Duration>,
    ) -> Result<Message, ErrorOf<RequestErrorKind>> {
        let pending = self.begin_ptop_send_request(
            request,
            target,
            target_ring,
            exact_instance,
            actor,
            timeout,
        );
        self.end_ptop_send_request(pending).await
    }

    fn add_routing_headers(
        &self,
        message: &mut Message,
        target: NodeInstance,
        target_ring: &RingName,
        exact_instance: bool,
        actor: PToPActor,
    ) -> Result<(), ErrorOf<CodecErrorKind>> {
        let headers = message.headers_mut();
        headers.replace(&PToPHeader {
            from: self.instance,
            to: target,
            actor,
            from_ring: self.ring.clone(),
            to_ring: target_ring.clone(),
            exact_instance,
        })?;
        if *target_ring != self.ring {
            headers.replace(&NeighborhoodHeader {
                instance: self.instance,
                ring:     self.ring.clone(),
            })?;
        }
        Ok(())
    }
}

fn prepare_request(request: &mut Message) -> Result<MessageId, ErrorOf<CodecErrorKind>> {
    request.set_expects_reply(true)?;
    request.ensure_message_id()
}
