use std::sync::Arc;

use federa_common::validation::Valid;
use federa_proto::{Actor, NodeInstance, RingName};
use tokio::runtime::Handle;

use super::{PointToPointManager, federation_fault_handler};
use crate::actor_map::ActorMap;
use crate::config::P2pConfig;
use crate::events::{EventSink, TracingEventSink};
use crate::loopback::LoopbackDispatcher;
use crate::partner::PartnerTable;
use crate::ports::{AlwaysValidLease, DeliveryScheduler, ImmediateDelivery, LeaseAgent};
use crate::request_table::RequestTable;
use crate::transport::Transport;

pub struct PointToPointManagerBuilder {
    instance:  NodeInstance,
    ring:      RingName,
    transport: Arc<dyn Transport>,
    handle:    Handle,
    config:    Valid<P2pConfig>,
    lease:     Arc<dyn LeaseAgent>,
    scheduler: Option<Arc<dyn DeliveryScheduler>>,
    events:    Arc<dyn EventSink>,
}

impl PointToPointManagerBuilder {
    pub(super) fn new(
        instance: NodeInstance,
        ring: RingName,
        transport: Arc<dyn Transport>,
        handle: Handle,
    ) -> Self {
        Self {
            instance,
            ring,
            transport,
            handle,
            config: Default::default(),
            lease: Arc::new(AlwaysValidLease),
            scheduler: None,
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn config(self, config: Valid<P2pConfig>) -> Self {
        Self { config, ..self }
    }

    pub fn lease_agent(self, lease: Arc<dyn LeaseAgent>) -> Self {
        Self { lease, ..self }
    }

    /// Overrides how self-addressed messages are delivered. Without it they
    /// are delivered immediately, unless the configuration carries
    /// unreliable-transport rules.
    pub fn delivery_scheduler(self, scheduler: Arc<dyn DeliveryScheduler>) -> Self {
        Self {
            scheduler: Some(scheduler),
            ..self
        }
    }

    pub fn event_sink(self, events: Arc<dyn EventSink>) -> Self {
        Self { events, ..self }
    }

    pub fn build(self) -> Arc<PointToPointManager> {
        let Self {
            instance,
            ring,
            transport,
            handle,
            config,
            lease,
            scheduler,
            events,
        } = self;
        let scheduler = scheduler.unwrap_or_else(|| default_scheduler(&config));

        Arc::new_cyclic(|weak_self| {
            let partners =
                PartnerTable::new(instance, ring.clone(), transport.clone(), events.clone());
            let requests = Arc::new(RequestTable::new(events.clone()));
            let actors = ActorMap::new(handle.clone());
            let loopback =
                LoopbackDispatcher::new(config.loopback, handle.clone(), events.clone());

            let (handlers, filter) = federation_fault_handler(weak_self.clone());
            actors.register(Actor::FEDERATION, handlers, Some(filter));

            PointToPointManager {
                instance,
                ring,
                config,
                handle,
                transport,
                lease,
                scheduler,
                events,
                partners,
                requests,
                actors,
                loopback,
                weak_self: weak_self.clone(),
            }
        })
    }
}

#[cfg(feature = "unreliable-transport")]
fn default_scheduler(config: &P2pConfig) -> Arc<dyn DeliveryScheduler> {
    if config.unreliable_transport.is_empty() {
        Arc::new(ImmediateDelivery)
    } else {
        Arc::new(crate::unreliable::UnreliableTransport::new(
            config.unreliable_transport.clone(),
        ))
    }
}

#[cfg(not(feature = "unreliable-transport"))]
fn default_scheduler(_config: &P2pConfig) -> Arc<dyn DeliveryScheduler> {
    Arc::new(ImmediateDelivery)
}
