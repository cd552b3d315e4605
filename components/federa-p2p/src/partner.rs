//! Known remote participants, keyed by node id and ring.

use std::collections::HashMap;
use std::collections::hash_map::Entry::{Occupied, Vacant};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use federa_common::errors::error_of::ErrorOf;
use federa_common::impl_error_kind;
use federa_common::log::{debug, trace};
use federa_proto::{NodeId, NodeInstance, RingName};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::events::{Event, EventSink};
use crate::transport::{SendTarget, Transport};

#[derive(derive_more::Debug)]
pub struct PartnerNode {
    instance: NodeInstance,
    ring:     RingName,
    address:  Arc<str>,
    is_local: bool,

    link: Mutex<Link>,

    sent:     AtomicU64,
    received: AtomicU64,
}

#[derive(Debug)]
struct Link {
    target:      Option<SendTarget>,
    last_access: Instant,
    shutdown:    bool,
}

/// Where a message for a partner should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Loopback,
    Remote(SendTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsolidateErrorKind {
    /// The header names an older instance than the one known.
    StaleInstance,
}

impl_error_kind!(ConsolidateErrorKind);

#[derive(derive_more::Debug)]
pub struct PartnerTable {
    local: Arc<PartnerNode>,
    #[debug(skip)]
    transport: Arc<dyn Transport>,
    #[debug(skip)]
    events: Arc<dyn EventSink>,
    partners: RwLock<HashMap<(NodeId, RingName), Arc<PartnerNode>>>,
}

impl PartnerNode {
    fn new(instance: NodeInstance, ring: RingName, address: Arc<str>, is_local: bool) -> Self {
        Self {
            instance,
            ring,
            address,
            is_local,
            link: Mutex::new(Link {
                target:      None,
                last_access: Instant::now(),
                shutdown:    false,
            }),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    pub fn instance(&self) -> NodeInstance {
        self.instance
    }

    pub fn id(&self) -> NodeId {
        self.instance.id
    }

    pub fn ring(&self) -> &RingName {
        &self.ring
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn is_shutdown(&self) -> bool {
        self.link.lock().shutdown
    }

    pub fn last_access(&self) -> Instant {
        self.link.lock().last_access
    }

    pub fn update_last_access(&self, now: Instant) {
        let mut link = self.link.lock();
        link.last_access = link.last_access.max(now);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(AtomicOrdering::Relaxed)
    }

    pub fn received_count(&self) -> u64 {
        self.received.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn record_send(&self) {
        self.sent.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn record_receive(&self, now: Instant) {
        self.received.fetch_add(1, AtomicOrdering::Relaxed);
        self.update_last_access(now);
    }
}

impl PartnerTable {
    pub fn new(
        local_instance: NodeInstance,
        local_ring: RingName,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let local = Arc::new(PartnerNode::new(
            local_instance,
            local_ring.clone(),
            "".into(),
            true,
        ));
        let partners = [((local_instance.id, local_ring), local.clone())]
            .into_iter()
            .collect();
        Self {
            local,
            transport,
            events,
            partners: RwLock::new(partners),
        }
    }

    pub fn local(&self) -> &Arc<PartnerNode> {
        &self.local
    }

    pub fn len(&self) -> usize {
        self.partners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.read().is_empty()
    }

    pub fn resolve(&self, id: NodeId, ring: &RingName) -> Option<Arc<PartnerNode>> {
        self.partners.read().get(&(id, ring.clone())).cloned()
    }

    /// Learns about a node from the topology. A newer instance replaces the
    /// known one; an older one is ignored and the known partner returned.
    pub fn add_or_update(
        &self,
        instance: NodeInstance,
        ring: RingName,
        address: impl Into<Arc<str>>,
    ) -> Arc<PartnerNode> {
        let address = address.into();
        let mut partners = self.partners.write();
        match partners.entry((instance.id, ring.clone())) {
            Vacant(vacant) => {
                debug!(%instance, %ring, %address, "new partner");
                vacant
                    .insert(Arc::new(PartnerNode::new(instance, ring, address, false)))
                    .clone()
            },
            Occupied(mut occupied) => {
                let known = occupied.get();
                let refresh = known.instance < instance
                    || (known.instance == instance && !known.is_local && known.address != address);
                if refresh {
                    let old = known.instance;
                    debug!(%old, new = %instance, %ring, %address, "partner refreshed");
                    occupied.insert(Arc::new(PartnerNode::new(instance, ring, address, false)));
                }
                occupied.get().clone()
            },
        }
    }

    /// Where to send a message for `partner`. `None` while the partner is
    /// shut down or its address cannot be resolved.
    pub fn send_target(&self, partner: &PartnerNode) -> Option<Resolved> {
        if partner.is_local {
            return Some(Resolved::Loopback)
        }
        let mut link = partner.link.lock();
        if link.shutdown {
            return None
        }
        if link.target.is_none() && !partner.address.is_empty() {
            link.target = self.transport.resolve_target(&partner.address);
        }
        link.target.clone().map(Resolved::Remote)
    }

    /// Called when a remote reports that `instance` is not who answers on
    /// `ring` any more. Only that exact instance is affected.
    pub fn mark_shutdown(&self, instance: NodeInstance, ring: &RingName) -> bool {
        let Some(partner) = self.resolve(instance.id, ring) else {
            return false
        };
        if partner.instance != instance || partner.is_local {
            return false
        }
        let mut link = partner.link.lock();
        if link.shutdown {
            return false
        }
        link.shutdown = true;
        link.target = None;
        std::mem::drop(link);

        self.events.emit(Event::PartnerShutdown {
            instance,
            ring: ring.clone(),
        });
        true
    }

    /// Whether `instance` is known to be gone: either marked shut down or
    /// superseded by a newer instance on the same ring.
    pub fn is_shutdown(&self, instance: NodeInstance, ring: &RingName) -> bool {
        match self.resolve(instance.id, ring) {
            Some(known) if known.instance > instance => true,
            Some(known) if known.instance == instance => known.is_shutdown(),
            _ => false,
        }
    }

    /// Resolves the sender of an inbound message.
    ///
    /// Unknown senders are learnt; a sender restarted with a newer instance
    /// replaces the old entry. When `exact` holds, the transport's reply
    /// target becomes the cached send target of the partner.
    pub fn consolidate(
        &self,
        from: NodeInstance,
        from_ring: &RingName,
        reply_target: Option<SendTarget>,
        exact: bool,
    ) -> Result<Arc<PartnerNode>, ErrorOf<ConsolidateErrorKind>> {
        if from == self.local.instance && *from_ring == self.local.ring {
            return Ok(self.local.clone())
        }

        let known = self.resolve(from.id, from_ring);
        if let Some(known) = &known {
            if known.instance > from {
                return Err(ErrorOf::new(
                    ConsolidateErrorKind::StaleInstance,
                    format!("{} is superseded by {}", from, known.instance),
                ))
            }
            if known.instance == from {
                if exact {
                    if let Some(target) = reply_target {
                        known.link.lock().target = Some(target);
                    }
                }
                return Ok(known.clone())
            }
        }

        // A restarted sender keeps the address the topology gave it.
        let address: Arc<str> = match (&reply_target, &known) {
            (Some(target), _) => target.address().into(),
            (None, Some(known)) => known.address.clone(),
            (None, None) => "".into(),
        };
        let partner = self.add_or_update(from, from_ring.clone(), address);
        if partner.instance != from {
            return Err(ErrorOf::new(
                ConsolidateErrorKind::StaleInstance,
                format!("{} is superseded by {}", from, partner.instance),
            ))
        }
        if let Some(target) = reply_target {
            partner.link.lock().target.get_or_insert(target);
        }
        trace!(%from, ring = %from_ring, "partner consolidated");
        Ok(partner)
    }
}
