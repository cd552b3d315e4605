use federa_common::log::trace;
use federa_p2p::{ReceiverContext, RequestReceiverContext};
use federa_proto::headers::{GenerationHeader, RetryHeader};
use federa_proto::{FaultCode, Generation, Message, MessageId, NodeInstance, RingName};

/// Everything a processor learns about a message besides its body.
#[derive(Debug)]
pub struct MessageContext {
    action:     Box<str>,
    from:       Option<NodeInstance>,
    from_ring:  Option<RingName>,
    message_id: Option<MessageId>,
    generation: Option<Generation>,
    attempt:    u32,
    reply:      Option<RequestReceiverContext>,
}

impl MessageContext {
    pub(crate) fn new(message: &Message, receiver: ReceiverContext) -> Self {
        let from = receiver.from_instance();
        let from_ring = receiver.from_ring().cloned();
        let message_id = receiver.message_id();
        let reply = match receiver {
            ReceiverContext::OneWay(ctx) => {
                ctx.accept();
                None
            },
            ReceiverContext::Request(ctx) => Some(ctx),
        };
        let headers = message.headers();
        let generation = headers
            .try_read_first::<GenerationHeader>()
            .ok()
            .flatten()
            .map(|h| h.generation);
        let attempt = headers
            .try_read_first::<RetryHeader>()
            .ok()
            .flatten()
            .map_or(0, |h| h.attempt);
        Self {
            action: message.action().into(),
            from,
            from_ring,
            message_id,
            generation,
            attempt,
            reply,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(message: &Message) -> Self {
        Self {
            action:     message.action().into(),
            from:       None,
            from_ring:  None,
            message_id: message.message_id(),
            generation: None,
            attempt:    0,
            reply:      None,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn from_instance(&self) -> Option<NodeInstance> {
        self.from
    }

    pub fn from_ring(&self) -> Option<&RingName> {
        self.from_ring.as_ref()
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// Zero for a first delivery.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answers the request. `false` for one-way messages or if the reply
    /// could not be sent.
    pub fn reply(self, message: Message) -> bool {
        match self.reply {
            Some(ctx) => ctx.reply(message),
            None => {
                trace!(action = %self.action, "reply to a one-way message discarded");
                false
            },
        }
    }

    pub fn reject(self, code: FaultCode) {
        if let Some(ctx) = self.reply {
            ctx.reject(code)
        }
    }
}

/// A context waiting for its job to run. Dropping it before the job takes
/// the context answers the request with `ObjectClosed`.
#[derive(Debug)]
pub(crate) struct Unprocessed(Option<MessageContext>);

impl Unprocessed {
    pub(crate) fn new(ctx: MessageContext) -> Self {
        Self(Some(ctx))
    }

    pub(crate) fn take(&mut self) -> Option<MessageContext> {
        self.0.take()
    }
}

impl Drop for Unprocessed {
    fn drop(&mut self) {
        if let Some(ctx) = self.0.take() {
            trace!(action = %ctx.action, "job discarded before it ran");
            ctx.reject(FaultCode::ObjectClosed);
        }
    }
}
