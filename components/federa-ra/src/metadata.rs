//! Static per-action knowledge: what a message targets, whether it is still
//! supported, and how its body turns into a job.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use federa_common::errors::error_of::ErrorOf;
use federa_jobs::JobOutcome;
use federa_proto::{CodecErrorKind, Message};
use serde::de::DeserializeOwned;

use crate::context::MessageContext;
use crate::entity_map::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    /// Processed by the node itself, in arrival order.
    Node,
    /// Processed by the entity the body names, in arrival order per entity.
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub action:               Arc<str>,
    pub target:               MessageTarget,
    pub deprecated:           bool,
    pub process_during_close: bool,
    pub create_entity:        bool,
    pub check_generation:     bool,
}

impl MessageMetadata {
    pub fn new(action: impl Into<Arc<str>>) -> Self {
        Self {
            action:               action.into(),
            target:               MessageTarget::Entity,
            deprecated:           false,
            process_during_close: false,
            create_entity:        false,
            check_generation:     true,
        }
    }

    pub fn deprecated(self) -> Self {
        Self {
            deprecated: true,
            ..self
        }
    }

    pub fn process_during_close(self) -> Self {
        Self {
            process_during_close: true,
            ..self
        }
    }

    /// An unknown entity is created on first contact instead of the message
    /// being dropped.
    pub fn create_entity(self) -> Self {
        Self {
            create_entity: true,
            ..self
        }
    }

    pub fn skip_generation_check(self) -> Self {
        Self {
            check_generation: false,
            ..self
        }
    }
}

pub(crate) type NodeJob = Box<dyn FnOnce(MessageContext) -> JobOutcome + Send + 'static>;
pub(crate) type EntityJob<E> =
    Box<dyn FnOnce(&mut E, MessageContext) -> JobOutcome + Send + 'static>;

/// A decoded message, bound to its processor but not yet scheduled.
pub(crate) enum Decoded<E> {
    Node(NodeJob),
    Entity { id: EntityId, run: EntityJob<E> },
}

type Decoder<E> =
    Arc<dyn Fn(&Message) -> Result<Decoded<E>, ErrorOf<CodecErrorKind>> + Send + Sync + 'static>;

pub(crate) struct MessageKind<E> {
    pub(crate) metadata: MessageMetadata,
    decode:              Decoder<E>,
}

/// Maps an action to its metadata and its typed decoder and processor.
pub struct MessageKinds<E> {
    kinds: HashMap<Arc<str>, Arc<MessageKind<E>>>,
}

impl<E> MessageKind<E> {
    pub(crate) fn decode(&self, message: &Message) -> Result<Decoded<E>, ErrorOf<CodecErrorKind>> {
        (self.decode)(message)
    }
}

impl<E: Send + 'static> MessageKinds<E> {
    pub fn new() -> Self {
        Self {
            kinds: Default::default(),
        }
    }

    /// Registers a message processed by the node's own job key.
    pub fn node<B, P>(mut self, metadata: MessageMetadata, process: P) -> Self
    where
        B: DeserializeOwned + Send + 'static,
        P: Fn(B, MessageContext) -> JobOutcome + Send + Sync + 'static,
    {
        let process = Arc::new(process);
        let decode: Decoder<E> = Arc::new(move |message: &Message| {
            let body: B = message.body()?;
            let process = process.clone();
            let run: NodeJob = Box::new(move |ctx| process(body, ctx));
            Ok(Decoded::Node(run))
        });
        let metadata = MessageMetadata {
            target: MessageTarget::Node,
            ..metadata
        };
        self.insert(metadata, decode);
        self
    }

    /// Registers a message processed by the entity `key` extracts from the
    /// body.
    pub fn entity<B, K, P>(mut self, metadata: MessageMetadata, key: K, process: P) -> Self
    where
        B: DeserializeOwned + Send + 'static,
        K: Fn(&B) -> EntityId + Send + Sync + 'static,
        P: Fn(&mut E, B, MessageContext) -> JobOutcome + Send + Sync + 'static,
    {
        let process = Arc::new(process);
        let decode: Decoder<E> = Arc::new(move |message: &Message| {
            let body: B = message.body()?;
            let id = key(&body);
            let process = process.clone();
            let run: EntityJob<E> = Box::new(move |entity, ctx| process(entity, body, ctx));
            Ok(Decoded::Entity { id, run })
        });
        let metadata = MessageMetadata {
            target: MessageTarget::Entity,
            ..metadata
        };
        self.insert(metadata, decode);
        self
    }

    pub fn metadata(&self, action: &str) -> Option<&MessageMetadata> {
        self.kinds.get(action).map(|k| &k.metadata)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub(crate) fn get(&self, action: &str) -> Option<Arc<MessageKind<E>>> {
        self.kinds.get(action).cloned()
    }

    fn insert(&mut self, metadata: MessageMetadata, decode: Decoder<E>) {
        let action = metadata.action.clone();
        let kind = Arc::new(MessageKind { metadata, decode });
        let replaced = self.kinds.insert(action, kind);
        debug_assert!(replaced.is_none(), "an action is registered twice");
    }
}

impl<E: Send + 'static> Default for MessageKinds<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for MessageKinds<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds.keys()).finish()
    }
}
