//! Per-actor handler registrations.
//!
//! Registrations for an actor are scanned in insertion order and the first
//! one whose filter accepts the message handles it. A registration without
//! a filter accepts everything.

use std::collections::HashMap;
use std::sync::Arc;

use federa_common::log::{debug, info};
use federa_proto::{Actor, FaultCode, Message};
use parking_lot::RwLock;
use tokio::runtime::Handle;

use crate::receiver::{OneWayReceiverContext, ReceiverContext, RequestReceiverContext};

pub trait MessageFilter: Send + Sync + 'static {
    fn matches(&self, message: &Message) -> bool;
}

impl<F> MessageFilter for F
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    fn matches(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Filters are compared by identity when unregistering.
pub type Filter = Arc<dyn MessageFilter>;

pub type OneWayHandler = Arc<dyn Fn(Message, OneWayReceiverContext) + Send + Sync + 'static>;
pub type RequestHandler = Arc<dyn Fn(Message, RequestReceiverContext) + Send + Sync + 'static>;

#[derive(Clone, derive_more::Debug)]
pub struct MessageHandlerPair {
    #[debug(skip)]
    one_way:                      OneWayHandler,
    #[debug(skip)]
    request:                      RequestHandler,
    dispatch_on_transport_thread: bool,
}

#[derive(derive_more::Debug)]
pub struct ActorMap {
    #[debug(skip)]
    handle: Handle,
    #[debug(skip)]
    state:  RwLock<State>,
}

#[derive(Default)]
struct State {
    closed:  bool,
    entries: HashMap<Actor, Vec<Registration>>,
}

struct Registration {
    filter:   Option<Filter>,
    handlers: MessageHandlerPair,
}

impl MessageHandlerPair {
    pub fn new<O, R>(one_way: O, request: R) -> Self
    where
        O: Fn(Message, OneWayReceiverContext) + Send + Sync + 'static,
        R: Fn(Message, RequestReceiverContext) + Send + Sync + 'static,
    {
        Self {
            one_way:                      Arc::new(one_way),
            request:                      Arc::new(request),
            dispatch_on_transport_thread: true,
        }
    }

    /// Handlers that only expect one-way messages; requests are rejected with
    /// `MessageHandlerDoesNotExist`.
    pub fn one_way<O>(one_way: O) -> Self
    where
        O: Fn(Message, OneWayReceiverContext) + Send + Sync + 'static,
    {
        Self::new(one_way, |_, ctx: RequestReceiverContext| {
            ctx.reject(FaultCode::MessageHandlerDoesNotExist)
        })
    }

    /// When unset the handler runs on a spawned task instead of the caller's
    /// thread.
    pub fn dispatch_on_transport_thread(self, dispatch_on_transport_thread: bool) -> Self {
        Self {
            dispatch_on_transport_thread,
            ..self
        }
    }

    fn invoke(&self, message: Message, context: ReceiverContext, handle: &Handle) {
        let run = {
            let handlers = self.clone();
            move || {
                match context {
                    ReceiverContext::OneWay(ctx) => (handlers.one_way)(message, ctx),
                    ReceiverContext::Request(ctx) => (handlers.request)(message, ctx),
                }
            }
        };
        if self.dispatch_on_transport_thread {
            run()
        } else {
            handle.spawn(async move { run() });
        }
    }
}

impl ActorMap {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            state: Default::default(),
        }
    }

    /// Appends a registration. Ignored once the map is closed.
    pub fn register(&self, actor: Actor, handlers: MessageHandlerPair, filter: Option<Filter>) {
        let mut state = self.state.write();
        if state.closed {
            debug!(%actor, "actor map is closed, registration ignored");
            return
        }
        state
            .entries
            .entry(actor)
            .or_default()
            .push(Registration { filter, handlers });
    }

    /// Removes the first registration whose filter is `filter` (by identity).
    pub fn unregister(&self, actor: Actor, filter: Option<&Filter>) -> bool {
        let mut state = self.state.write();
        let Some(registrations) = state.entries.get_mut(&actor) else {
            return false
        };
        let position = registrations.iter().position(|r| {
            match (&r.filter, filter) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
        });
        let Some(position) = position else {
            return false
        };
        registrations.remove(position);
        if registrations.is_empty() {
            state.entries.remove(&actor);
        }
        true
    }

    pub fn is_registered(&self, actor: Actor) -> bool {
        self.state.read().entries.contains_key(&actor)
    }

    /// Hands a copy of `message` to the first matching registration. The
    /// handler runs after the lock is released.
    pub fn dispatch(&self, message: &Message, context: ReceiverContext) {
        let actor = message.actor();
        let handlers = {
            let state = self.state.read();
            state.entries.get(&actor).and_then(|registrations| {
                registrations
                    .iter()
                    .find(|r| r.filter.as_ref().is_none_or(|f| f.matches(message)))
                    .map(|r| r.handlers.clone())
            })
        };

        match handlers {
            Some(handlers) => handlers.invoke(message.clone(), context, &self.handle),
            None => {
                info!(%actor, action = message.action(), "no message handler");
                context.reject(FaultCode::MessageHandlerDoesNotExist);
            },
        }
    }

    pub fn close(&self) {
        let mut state = self.state.write();
        state.closed = true;
        state.entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}
