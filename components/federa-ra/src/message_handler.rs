//! Admission and ordered dispatch of reconfiguration-agent messages.
//!
//! Admission runs on the caller's (transport) thread and only consults
//! static metadata and the lifecycle. Everything that touches generations or
//! entities happens behind the admission queue, and processing itself runs
//! on the job queue, one job at a time per entity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_channel::TrySendError;
use federa_common::log::{debug, error, info, trace, warn};
use federa_common::validation::Valid;
use federa_jobs::{Job, JobOutcome, JobQueue, ScheduleErrorKind};
use federa_p2p::{
    DropReason, Event, EventSink, EventSinkExt, Filter, MessageHandlerPair, PointToPointManager,
    ReceiverContext,
};
use federa_proto::headers::GenerationHeader;
use federa_proto::{Actor, FaultCode, Message};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::config::{GenerationPolicy, RaConfig};
use crate::context::{MessageContext, Unprocessed};
use crate::entity_map::{EntityId, EntityMap};
use crate::generation::{GenerationCheck, GenerationState};
use crate::lifecycle::{Lifecycle, NodeLifecycle};
use crate::metadata::{Decoded, MessageKind, MessageKinds};

/// Job key for messages processed by the node rather than an entity.
const NODE_KEY_NAME: &str = "<node>";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JobKey {
    Node,
    Entity(EntityId),
}

struct Admitted<E> {
    kind:     Arc<MessageKind<E>>,
    message:  Message,
    receiver: ReceiverContext,
}

type EntityFactory<E> = Box<dyn Fn(&EntityId) -> E + Send + Sync + 'static>;

#[derive(derive_more::Debug)]
pub struct MessageHandler<E> {
    #[debug(skip)]
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    config:       Valid<RaConfig>,
    kinds:        MessageKinds<E>,
    entities:     EntityMap<E>,
    create:       EntityFactory<E>,
    generations:  GenerationState,
    lifecycle:    Lifecycle,
    jobs:         JobQueue<JobKey>,
    admission:    async_channel::Sender<Admitted<E>>,
    /// Admitted but not yet turned into a job.
    in_flight:    AtomicUsize,
    events:       Arc<dyn EventSink>,
    registration: Mutex<Option<Filter>>,
}

impl<E> MessageHandler<E>
where
    E: Send + 'static,
{
    pub fn new<F>(
        config: Valid<RaConfig>,
        kinds: MessageKinds<E>,
        create: F,
        events: Arc<dyn EventSink>,
        handle: Handle,
    ) -> Self
    where
        F: Fn(&EntityId) -> E + Send + Sync + 'static,
    {
        let (admission, admitted) = async_channel::bounded(config.message_queue_depth.max(1));
        let jobs = JobQueue::new("ra", config.jobs, handle.clone());
        let inner = Arc::new(Inner {
            config,
            kinds,
            entities: EntityMap::new(),
            create: Box::new(create),
            generations: GenerationState::default(),
            lifecycle: Lifecycle::new(),
            jobs,
            admission,
            in_flight: AtomicUsize::new(0),
            events,
            registration: Mutex::new(None),
        });
        handle.spawn(pump(Arc::downgrade(&inner), admitted));
        Self { inner }
    }

    pub fn entities(&self) -> &EntityMap<E> {
        &self.inner.entities
    }

    pub fn generations(&self) -> &GenerationState {
        &self.inner.generations
    }

    pub fn kinds(&self) -> &MessageKinds<E> {
        &self.inner.kinds
    }

    pub fn lifecycle(&self) -> NodeLifecycle {
        self.inner.lifecycle.get()
    }

    /// Registers on the reconfiguration-agent actor and starts admitting
    /// messages.
    pub fn open(&self, manager: &PointToPointManager) {
        let mut registration = self.inner.registration.lock();
        if registration.is_some() {
            return
        }
        let filter: Filter = Arc::new(|_: &Message| true);
        let one_way = Arc::downgrade(&self.inner);
        let request = one_way.clone();
        let handlers = MessageHandlerPair::new(
            move |message, ctx| {
                let receiver = ReceiverContext::OneWay(ctx);
                match one_way.upgrade() {
                    Some(inner) => inner.process_request_helper(message, receiver),
                    None => receiver.reject(FaultCode::ObjectClosed),
                }
            },
            move |message, ctx| {
                let receiver = ReceiverContext::Request(ctx);
                match request.upgrade() {
                    Some(inner) => inner.process_request_helper(message, receiver),
                    None => receiver.reject(FaultCode::ObjectClosed),
                }
            },
        );
        manager.register_message_handler(Actor::RA, handlers, Some(filter.clone()));
        *registration = Some(filter);
        self.inner.lifecycle.advance(NodeLifecycle::Open);
        info!(instance = %manager.instance(), "reconfiguration agent open");
    }

    /// From now on only messages allowed during close are admitted.
    pub fn begin_close(&self) {
        self.inner.lifecycle.advance(NodeLifecycle::Closing);
    }

    /// Stops admission, unregisters from `manager` and discards queued jobs.
    /// Jobs already executing run to completion.
    pub fn close(&self, manager: &PointToPointManager) {
        if self.inner.lifecycle.advance(NodeLifecycle::Closed) == NodeLifecycle::Closed {
            return
        }
        if let Some(filter) = self.inner.registration.lock().take() {
            if !manager.unregister_message_handler(Actor::RA, Some(&filter)) {
                error!("reconfiguration agent handler was not registered");
                debug_assert!(false, "reconfiguration agent handler was not registered");
            }
        }
        self.inner.admission.close();
        self.inner.jobs.close();
        info!(instance = %manager.instance(), "reconfiguration agent closed");
    }

    /// Entry point for a message addressed to the agent. Runs the cheap
    /// checks and queues the message; rejections are answered immediately.
    pub fn process_request_helper(&self, message: Message, receiver: ReceiverContext) {
        self.inner.process_request_helper(message, receiver)
    }

    /// Resolves once everything admitted so far has been processed.
    pub async fn drained(&self) {
        loop {
            let in_flight = self.inner.in_flight.load(Ordering::Acquire);
            if in_flight == 0 && self.inner.jobs.pending() == 0 {
                return
            }
            self.inner.jobs.drained().await;
            tokio::task::yield_now().await;
        }
    }
}

impl<E> Inner<E>
where
    E: Send + 'static,
{
    fn process_request_helper(&self, message: Message, receiver: ReceiverContext) {
        let message_id = message.message_id();
        let Some(kind) = self.kinds.get(message.action()) else {
            let from = receiver.from_instance();
            debug!(action = message.action(), ?message_id, ?from, "unknown message");
            self.events.dropped(DropReason::UnknownAction, message.action(), message_id);
            return receiver.reject(FaultCode::InvalidMessage)
        };
        let metadata = &kind.metadata;

        if metadata.deprecated {
            debug!(action = message.action(), ?message_id, "deprecated message");
            self.events.dropped(DropReason::Deprecated, message.action(), message_id);
            return receiver.reject(FaultCode::Deprecated)
        }
        if !self.lifecycle.admits(metadata) {
            let lifecycle = self.lifecycle.get();
            trace!(action = message.action(), %lifecycle, "not admitted in this state");
            self.events.dropped(DropReason::NotReady, message.action(), message_id);
            return receiver.reject(FaultCode::NotReady)
        }

        let admitted = Admitted {
            kind,
            message,
            receiver,
        };
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let refused = match self.admission.try_send(admitted) {
            Ok(()) => return,
            Err(refused) => refused,
        };
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        match refused {
            TrySendError::Full(rejected) => {
                warn!(action = rejected.message.action(), ?message_id, "message queue is full");
                self.events.dropped(DropReason::QueueFull, rejected.message.action(), message_id);
                rejected.receiver.reject(FaultCode::QueueFull)
            },
            TrySendError::Closed(rejected) => {
                self.events.dropped(DropReason::Closed, rejected.message.action(), message_id);
                rejected.receiver.reject(FaultCode::ObjectClosed)
            },
        }
    }

    /// Decodes the body, checks the generation, finds the entity and queues
    /// the processor behind the entity's earlier jobs.
    fn create_job_item_for_ft_message(&self, admitted: Admitted<E>) {
        let Admitted {
            kind,
            message,
            receiver,
        } = admitted;
        let metadata = &kind.metadata;
        let message_id = message.message_id();

        if self.lifecycle.get() == NodeLifecycle::Closed {
            trace!(action = message.action(), ?message_id, "admitted before close");
            self.events.dropped(DropReason::Closed, message.action(), message_id);
            return receiver.reject(FaultCode::ObjectClosed)
        }

        let decoded = match kind.decode(&message) {
            Ok(decoded) => decoded,
            Err(reason) => {
                debug!(%reason, action = message.action(), ?message_id, "undecodable body");
                self.events.dropped(DropReason::InvalidBody, message.action(), message_id);
                return receiver.reject(FaultCode::InvalidMessage)
            },
        };

        let (key, job) = match decoded {
            Decoded::Node(run) => {
                if self.is_saturated(&message, &receiver) {
                    return receiver.reject(FaultCode::QueueFull)
                }
                let mut ctx = Unprocessed::new(MessageContext::new(&message, receiver));
                let job: Job = Box::new(move || {
                    let Some(ctx) = ctx.take() else {
                        return JobOutcome::Done
                    };
                    run(ctx)
                });
                (JobKey::Node, job)
            },
            Decoded::Entity { id, run } => {
                if metadata.check_generation && self.is_stale(&message, &receiver) {
                    return receiver.reject(FaultCode::StaleGeneration)
                }

                let create = |id: &EntityId| (self.create)(id);
                let found = self.entities.get_or_create(&id, metadata.create_entity, create);
                let Some((entry, created)) = found else {
                    debug!(action = message.action(), entity = %id, "no such entity");
                    self.events.dropped(DropReason::EntityNotFound, message.action(), message_id);
                    return receiver.reject(FaultCode::EntityNotFound)
                };
                if created {
                    self.events.emit(Event::EntityCreated {
                        entity: id.as_arc().clone(),
                    });
                }

                if self.is_saturated(&message, &receiver) {
                    return receiver.reject(FaultCode::QueueFull)
                }
                let mut ctx = Unprocessed::new(MessageContext::new(&message, receiver));
                let job: Job = Box::new(move || {
                    let Some(ctx) = ctx.take() else {
                        return JobOutcome::Done
                    };
                    let mut state = entry.lock();
                    run(&mut *state, ctx)
                });
                (JobKey::Entity(id), job)
            },
        };

        let entity: Arc<str> = match &key {
            JobKey::Node => NODE_KEY_NAME.into(),
            JobKey::Entity(id) => id.as_arc().clone(),
        };
        match self.jobs.schedule(key, job) {
            Ok(()) => {
                self.events.emit(Event::JobScheduled {
                    action: message.action().into(),
                    entity,
                })
            },
            // The discarded job answers its request through `Unprocessed`.
            Err(reason) => {
                debug!(%reason, action = message.action(), %entity, "job not scheduled");
                let drop_reason = match reason.kind {
                    ScheduleErrorKind::Full => DropReason::QueueFull,
                    ScheduleErrorKind::Closed => DropReason::Closed,
                };
                self.events.dropped(drop_reason, message.action(), message_id);
            },
        }
    }

    /// A missing generation header is not stale.
    fn is_stale(&self, message: &Message, receiver: &ReceiverContext) -> bool {
        if self.config.generation_policy == GenerationPolicy::Disabled {
            return false
        }
        let Ok(Some(header)) = message.headers().try_read_first::<GenerationHeader>() else {
            return false
        };
        let generation = header.generation;
        let ring = receiver.from_ring().cloned().unwrap_or_default();
        let GenerationCheck::Stale { known } = self.generations.observe(&ring, generation) else {
            return false
        };
        debug!(action = message.action(), %generation, %known, %ring, "stale generation");
        self.events
            .dropped(DropReason::StaleGeneration, message.action(), message.message_id());
        true
    }

    /// Only the admission pump schedules jobs, so a free slot seen here is
    /// still free when the job is scheduled.
    fn is_saturated(&self, message: &Message, receiver: &ReceiverContext) -> bool {
        if self.jobs.pending() < self.config.jobs.max_pending {
            return false
        }
        warn!(action = message.action(), from = ?receiver.from_instance(), "job queue is full");
        self.events.dropped(DropReason::QueueFull, message.action(), message.message_id());
        true
    }
}

async fn pump<E>(inner: Weak<Inner<E>>, admitted: async_channel::Receiver<Admitted<E>>)
where
    E: Send + 'static,
{
    while let Ok(next) = admitted.recv().await {
        let Some(inner) = inner.upgrade() else {
            next.receiver.reject(FaultCode::ObjectClosed);
            continue
        };
        inner.create_job_item_for_ft_message(next);
        inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
    trace!("admission queue closed");
}
