use std::sync::{Arc, Weak};

use federa_common::log::trace;
use federa_jobs::{JobOutcome, JobQueue, JobQueueLimits, ScheduleErrorKind};
use federa_proto::Message;
use tokio::runtime::Handle;

use crate::events::{DropReason, EventSink, EventSinkExt};
use crate::manager::PointToPointManager;
use crate::ports::LoopbackDelay;

/// Delivers self-addressed messages back into the receive path, one at a
/// time and in the order they were sent.
pub(crate) struct LoopbackDispatcher {
    queue:  JobQueue<()>,
    handle: Handle,
    events: Arc<dyn EventSink>,
}

impl LoopbackDispatcher {
    pub(crate) fn new(limits: JobQueueLimits, handle: Handle, events: Arc<dyn EventSink>) -> Self {
        let queue = JobQueue::new("loopback", limits, handle.clone());
        Self {
            queue,
            handle,
            events,
        }
    }

    pub(crate) fn deliver(
        &self,
        manager: Weak<PointToPointManager>,
        message: Message,
        delay: LoopbackDelay,
    ) {
        match delay {
            LoopbackDelay::Immediate => enqueue(&self.queue, &self.events, manager, message),
            LoopbackDelay::After(delay) => {
                let queue = self.queue.clone();
                let events = self.events.clone();
                self.handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    enqueue(&queue, &events, manager, message);
                });
            },
            LoopbackDelay::Drop => {
                self.events.dropped(
                    DropReason::SimulatedPartition,
                    message.action(),
                    message.message_id(),
                )
            },
        }
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

fn enqueue(
    queue: &JobQueue<()>,
    events: &Arc<dyn EventSink>,
    manager: Weak<PointToPointManager>,
    message: Message,
) {
    let action: Arc<str> = message.action().into();
    let message_id = message.message_id();
    let job = Box::new(move || {
        if let Some(manager) = manager.upgrade() {
            manager.process_incoming_transport_message(message, None);
        }
        JobOutcome::Done
    });
    if let Err(reason) = queue.schedule((), job) {
        trace!(%reason, %action, "loopback delivery refused");
        let drop_reason = match reason.kind {
            ScheduleErrorKind::Full => DropReason::QueueFull,
            ScheduleErrorKind::Closed => DropReason::Closed,
        };
        events.dropped(drop_reason, &action, message_id);
    }
}
