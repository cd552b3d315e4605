//! An in-memory network of managers for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use federa_common::errors::error_of::ErrorOf;
use federa_proto::{Message, NodeInstance, RingName};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::events::RecordingEventSink;
use crate::manager::{PointToPointManager, PointToPointManagerBuilder};
use crate::transport::{SendTarget, Transport, TransportErrorKind};

/// Managers connected by address. Every message crosses the "wire" as
/// msgpack bytes and is delivered on the sender's thread.
#[derive(Default)]
pub struct Network {
    nodes: Mutex<HashMap<String, Weak<PointToPointManager>>>,
    down:  Mutex<HashSet<String>>,
}

pub struct Node {
    pub address: String,
    pub manager: Arc<PointToPointManager>,
    pub events:  Arc<RecordingEventSink>,
}

struct NetTransport {
    network: Arc<Network>,
    from:    String,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Default::default()
    }

    pub fn node(self: &Arc<Self>, address: &str, instance: NodeInstance) -> Node {
        self.node_with(address, instance, RingName::default(), |b| b)
    }

    pub fn node_with(
        self: &Arc<Self>,
        address: &str,
        instance: NodeInstance,
        ring: RingName,
        configure: impl FnOnce(PointToPointManagerBuilder) -> PointToPointManagerBuilder,
    ) -> Node {
        let events = RecordingEventSink::new();
        let transport = Arc::new(NetTransport {
            network: self.clone(),
            from:    address.to_owned(),
        });
        let builder = PointToPointManager::builder(instance, ring, transport, Handle::current())
            .event_sink(events.clone());
        let manager = configure(builder).build();
        self.nodes
            .lock()
            .insert(address.to_owned(), Arc::downgrade(&manager));
        Node {
            address: address.to_owned(),
            manager,
            events,
        }
    }

    /// Addresses marked down no longer resolve.
    pub fn set_down(&self, address: &str) {
        self.down.lock().insert(address.to_owned());
    }
}

impl Node {
    /// Makes `other` known to this node under `instance`, which may differ
    /// from the instance `other` actually runs.
    pub fn knows(&self, other: &Node, instance: NodeInstance) {
        self.manager
            .add_partner(instance, other.manager.ring().clone(), other.address.as_str());
    }

    pub fn knows_address(&self, address: &str, instance: NodeInstance, ring: RingName) {
        self.manager.add_partner(instance, ring, address);
    }
}

impl Transport for NetTransport {
    fn resolve_target(&self, address: &str) -> Option<SendTarget> {
        if self.network.down.lock().contains(address) {
            return None
        }
        Some(SendTarget::new(address))
    }

    fn send_one_way(
        &self,
        target: &SendTarget,
        message: Message,
    ) -> Result<(), ErrorOf<TransportErrorKind>> {
        let bytes = message
            .to_bytes()
            .map_err(|e| ErrorOf::new(TransportErrorKind::MessageTooLarge, e.to_string()))?;
        let receiver = self
            .network
            .nodes
            .lock()
            .get(target.address())
            .and_then(Weak::upgrade)
            .ok_or_else(|| ErrorOf::bare(TransportErrorKind::Unreachable))?;
        let message = Message::from_bytes(&bytes)
            .map_err(|e| ErrorOf::new(TransportErrorKind::Closed, e.to_string()))?;
        let reply_target = SendTarget::new(self.from.as_str());
        receiver.process_incoming_transport_message(message, Some(reply_target));
        Ok(())
    }
}
