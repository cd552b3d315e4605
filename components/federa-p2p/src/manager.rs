//! The routing core: attaches and checks point-to-point headers, correlates
//! replies with pending requests and dispatches everything else to the
//! registered actor handlers.

mod builder;
mod receive;
mod send;

use std::sync::{Arc, Weak};

use federa_common::log::{debug, info};
use federa_common::validation::Valid;
use federa_proto::{
    Actor, FaultCode, Message, MessageId, NodeDoesNotMatchFaultBody, NodeInstance, RingName,
};
use tokio::runtime::Handle;

pub use self::builder::PointToPointManagerBuilder;
use crate::actor_map::{ActorMap, Filter, MessageHandlerPair};
use crate::config::P2pConfig;
use crate::events::EventSink;
use crate::loopback::LoopbackDispatcher;
use crate::partner::{PartnerNode, PartnerTable};
use crate::ports::{DeliveryScheduler, LeaseAgent};
use crate::request_table::RequestTable;
use crate::transport::Transport;

#[derive(derive_more::Debug)]
pub struct PointToPointManager {
    instance:  NodeInstance,
    ring:      RingName,
    config:    Valid<P2pConfig>,
    #[debug(skip)]
    handle:    Handle,
    #[debug(skip)]
    transport: Arc<dyn Transport>,
    #[debug(skip)]
    lease:     Arc<dyn LeaseAgent>,
    #[debug(skip)]
    scheduler: Arc<dyn DeliveryScheduler>,
    #[debug(skip)]
    events:    Arc<dyn EventSink>,
    partners:  PartnerTable,
    requests:  Arc<RequestTable>,
    actors:    ActorMap,
    #[debug(skip)]
    loopback:  LoopbackDispatcher,
    #[debug(skip)]
    weak_self: Weak<Self>,
}

impl PointToPointManager {
    pub fn builder(
        instance: NodeInstance,
        ring: RingName,
        transport: Arc<dyn Transport>,
        handle: Handle,
    ) -> PointToPointManagerBuilder {
        PointToPointManagerBuilder::new(instance, ring, transport, handle)
    }

    pub fn instance(&self) -> NodeInstance {
        self.instance
    }

    pub fn ring(&self) -> &RingName {
        &self.ring
    }

    pub fn config(&self) -> &P2pConfig {
        &self.config
    }

    pub fn partners(&self) -> &PartnerTable {
        &self.partners
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Learns a partner's address from the topology.
    pub fn add_partner(
        &self,
        instance: NodeInstance,
        ring: RingName,
        address: impl Into<Arc<str>>,
    ) -> Arc<PartnerNode> {
        self.partners.add_or_update(instance, ring, address)
    }

    pub fn register_message_handler(
        &self,
        actor: Actor,
        handlers: MessageHandlerPair,
        filter: Option<Filter>,
    ) {
        self.actors.register(actor, handlers, filter)
    }

    pub fn unregister_message_handler(&self, actor: Actor, filter: Option<&Filter>) -> bool {
        self.actors.unregister(actor, filter)
    }

    /// Completes a pending request with `Cancelled`. `false` if it had
    /// already completed.
    pub fn cancel_ptop_request(&self, id: MessageId) -> bool {
        self.requests.cancel(id)
    }

    /// Drops every handler, fails every pending request with `ObjectClosed`
    /// and stops loopback delivery.
    pub fn close(&self) {
        info!(instance = %self.instance, ring = %self.ring, "closing point-to-point manager");
        self.actors.close();
        self.requests.close();
        self.loopback.close();
    }
}

/// Handles `NodeDoesNotMatch` faults sent one-way on the federation actor:
/// the instance named in the fault is no longer reachable on its ring.
fn federation_fault_handler(manager: Weak<PointToPointManager>) -> (MessageHandlerPair, Filter) {
    let filter: Filter =
        Arc::new(|m: &Message| m.fault_code() == Some(FaultCode::NodeDoesNotMatch));
    let handlers = MessageHandlerPair::one_way(move |message, ctx| {
        let body = match message.body::<NodeDoesNotMatchFaultBody>() {
            Ok(body) => body,
            Err(reason) => {
                debug!(%reason, "unreadable node-does-not-match fault");
                return ctx.reject(FaultCode::InvalidMessage)
            },
        };
        if let Some(manager) = manager.upgrade() {
            manager.partners.mark_shutdown(body.instance, &body.ring);
        }
        ctx.accept();
    });
    (handlers, filter)
}
