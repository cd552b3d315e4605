//! Pending requests keyed by message id.
//!
//! Each entry is completed exactly once: by the reply, by a cancellation, by
//! its timeout, or by closing the table, whichever comes first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use federa_common::errors::error_of::ErrorOf;
use federa_common::futures::timeout::FutureTimeoutExt;
use federa_common::impl_error_kind;
use federa_common::log::{debug, trace};
use federa_proto::{FaultCode, Message, MessageId, NodeInstance, RingName};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};

use crate::events::{DropReason, Event, EventSink, EventSinkExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestErrorKind {
    Timeout,
    Cancelled,
    ObjectClosed,
    Duplicate,
    InvalidMessage,
    Fault(FaultCode),
}

impl_error_kind!(RequestErrorKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InsertErrorKind {
    Conflict,
    Closed,
}

impl_error_kind!(InsertErrorKind);

pub type RequestResult = Result<Message, ErrorOf<RequestErrorKind>>;

/// One in-flight request awaiting its reply. Clones share the completion.
#[derive(Clone, derive_more::Debug)]
pub struct RequestOperation {
    id:      MessageId,
    target:  NodeInstance,
    ring:    RingName,
    timeout: Duration,
    #[debug(skip)]
    core:    Arc<Completion>,
}

struct Completion {
    tx:   Mutex<Option<oneshot::Sender<RequestResult>>>,
    done: Notify,
}

/// The caller's side of a request started with
/// [`begin_ptop_send_request`](crate::PointToPointManager::begin_ptop_send_request).
#[derive(Debug)]
pub struct PendingRequest {
    pub(crate) id:     MessageId,
    pub(crate) target: NodeInstance,
    pub(crate) ring:   RingName,
    pub(crate) rx:     oneshot::Receiver<RequestResult>,
}

#[derive(derive_more::Debug)]
pub struct RequestTable {
    #[debug(skip)]
    entries: scc::HashMap<MessageId, RequestOperation>,
    closed:  AtomicBool,
    #[debug(skip)]
    events:  Arc<dyn EventSink>,
}

impl RequestOperation {
    pub fn new(
        id: MessageId,
        target: NodeInstance,
        ring: RingName,
        timeout: Duration,
    ) -> (Self, PendingRequest) {
        let (tx, rx) = oneshot::channel();
        let core = Arc::new(Completion {
            tx:   Mutex::new(Some(tx)),
            done: Notify::new(),
        });
        let op = Self {
            id,
            target,
            ring: ring.clone(),
            timeout,
            core,
        };
        let pending = PendingRequest {
            id,
            target,
            ring,
            rx,
        };
        (op, pending)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn target(&self) -> NodeInstance {
        self.target
    }

    pub fn ring(&self) -> &RingName {
        &self.ring
    }

    /// Arms the timeout clock. On expiry the entry is removed from `table`
    /// and the operation completes with [`RequestErrorKind::Timeout`].
    pub fn start(&self, table: Arc<RequestTable>, handle: &Handle) {
        let op = self.clone();
        handle.spawn(async move {
            let completed = op.core.done.notified().timeout(op.timeout).await.is_ok();
            if !completed {
                let _ = table.try_remove_entry(op.id);
                if op.complete(Err(ErrorOf::new(
                    RequestErrorKind::Timeout,
                    format!("no reply from {} within {:?}", op.target, op.timeout),
                ))) {
                    debug!(id = %op.id, target = %op.target, "request timed out");
                }
            }
        });
    }

    /// Returns `false` if the operation had already been completed.
    pub fn complete(&self, result: RequestResult) -> bool {
        let Some(tx) = self.core.tx.lock().take() else {
            return false
        };
        let _ = tx.send(result);
        self.core.done.notify_one();
        true
    }

    pub fn is_completed(&self) -> bool {
        self.core.tx.lock().is_none()
    }
}

impl PendingRequest {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn target(&self) -> NodeInstance {
        self.target
    }

    pub fn ring(&self) -> &RingName {
        &self.ring
    }

    pub(crate) fn failed(
        id: MessageId,
        target: NodeInstance,
        ring: RingName,
        error: ErrorOf<RequestErrorKind>,
    ) -> Self {
        let (op, pending) = RequestOperation::new(id, target, ring, Duration::ZERO);
        op.complete(Err(error));
        pending
    }
}

impl RequestTable {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            entries: Default::default(),
            closed: AtomicBool::new(false),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.contains(&id)
    }

    pub fn try_insert_entry(
        &self,
        id: MessageId,
        operation: RequestOperation,
    ) -> Result<(), ErrorOf<InsertErrorKind>> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(ErrorOf::new(InsertErrorKind::Closed, "request table is closed"))
        }
        if self.entries.insert(id, operation).is_err() {
            return Err(ErrorOf::new(
                InsertErrorKind::Conflict,
                format!("request {} is already pending", id),
            ))
        }
        // A concurrent `close` may have drained the table before our insert.
        if self.closed.load(AtomicOrdering::Acquire) {
            if let Some(op) = self.try_remove_entry(id) {
                op.complete(Err(closed_error()));
            }
            return Err(ErrorOf::new(InsertErrorKind::Closed, "request table is closed"))
        }
        Ok(())
    }

    /// Inserts an operation whose timer is already armed. `Ok(false)` when
    /// the operation completed before the insert landed; its entry is
    /// removed again and nothing should be sent.
    pub fn register(
        &self,
        id: MessageId,
        operation: &RequestOperation,
    ) -> Result<bool, ErrorOf<InsertErrorKind>> {
        self.try_insert_entry(id, operation.clone())?;
        if operation.is_completed() {
            trace!(%id, "request completed before it was registered");
            let _ = self.try_remove_entry(id);
            return Ok(false)
        }
        Ok(true)
    }

    pub fn try_remove_entry(&self, id: MessageId) -> Option<RequestOperation> {
        self.entries.remove(&id).map(|(_, op)| op)
    }

    /// Cancels a pending request. `false` if nothing was pending under `id`.
    pub fn cancel(&self, id: MessageId) -> bool {
        let Some(op) = self.try_remove_entry(id) else {
            return false
        };
        op.complete(Err(ErrorOf::new(
            RequestErrorKind::Cancelled,
            "request cancelled",
        )))
    }

    /// Completes the request `message` relates to. A fault reply completes it
    /// with the fault's code. `false` if no pending request matched.
    pub fn on_reply_message(&self, message: Message) -> bool {
        let Some(id) = message.relates_to() else {
            return false
        };
        let Some(op) = self.try_remove_entry(id) else {
            self.events
                .dropped(DropReason::StrayReply, message.action(), Some(id));
            return false
        };
        trace!(%id, action = message.action(), "reply correlated");
        self.events.emit(Event::ReplyCorrelated { id });

        let result = match message.fault_code() {
            Some(code) => {
                Err(ErrorOf::new(
                    RequestErrorKind::Fault(code),
                    format!("{} replied with {:?}", op.target, code),
                ))
            },
            None => Ok(message),
        };
        op.complete(result);
        true
    }

    pub fn close(&self) {
        if self.closed.swap(true, AtomicOrdering::AcqRel) {
            return
        }
        let mut ids = Vec::new();
        self.entries.scan(|id, _| ids.push(*id));
        for id in ids {
            if let Some(op) = self.try_remove_entry(id) {
                op.complete(Err(closed_error()));
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

fn closed_error() -> ErrorOf<RequestErrorKind> {
    ErrorOf::new(RequestErrorKind::ObjectClosed, "request table is closed")
}
