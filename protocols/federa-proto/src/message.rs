use std::sync::Arc;

use bytes::Bytes;
use federa_common::errors::error_of::ErrorOf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::codec::{self, CodecErrorKind};
use crate::fault::FaultCode;
use crate::headers::{
    ExpectsReplyHeader, FaultHeader, Headers, MessageIdHeader, RelatesToHeader,
};
use crate::message_id::MessageId;

/// A routed message: an action, the actor it is addressed to, headers and an
/// encoded body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    action:     Arc<str>,
    actor:      Actor,
    idempotent: bool,
    headers:    Headers,
    body:       Bytes,

    /// Local-only: set by a transport that failed to validate or decrypt.
    #[serde(skip)]
    invalid: bool,
}

impl Message {
    pub fn new<B: Serialize>(
        actor: Actor,
        action: impl Into<Arc<str>>,
        body: &B,
    ) -> Result<Self, ErrorOf<CodecErrorKind>> {
        let body = codec::encode(body)?;
        Ok(Self::with_body_bytes(actor, action, body))
    }

    pub fn empty(actor: Actor, action: impl Into<Arc<str>>) -> Self {
        Self::with_body_bytes(actor, action, Bytes::new())
    }

    pub fn with_body_bytes(
        actor: Actor,
        action: impl Into<Arc<str>>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            action: action.into(),
            actor,
            idempotent: false,
            headers: Headers::default(),
            body: body.into(),
            invalid: false,
        }
    }

    /// A fault reply carrying `code` and an encoded body.
    pub fn fault<B: Serialize>(
        actor: Actor,
        code: FaultCode,
        body: &B,
    ) -> Result<Self, ErrorOf<CodecErrorKind>> {
        let mut message = Self::new(actor, fault_action(code), body)?;
        message.headers.replace(&FaultHeader { code })?;
        Ok(message)
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn set_idempotent(&mut self, idempotent: bool) {
        self.idempotent = idempotent;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn body<B: DeserializeOwned>(&self) -> Result<B, ErrorOf<CodecErrorKind>> {
        codec::decode(&self.body)
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub fn mark_invalid(&mut self) {
        self.invalid = true;
    }

    /// Absent as well as unreadable ids yield `None`.
    pub fn message_id(&self) -> Option<MessageId> {
        self.headers
            .try_read_first::<MessageIdHeader>()
            .ok()
            .flatten()
            .map(|h| h.0)
    }

    pub fn ensure_message_id(&mut self) -> Result<MessageId, ErrorOf<CodecErrorKind>> {
        if let Some(id) = self.message_id() {
            return Ok(id)
        }
        let id = MessageId::next();
        self.headers.replace(&MessageIdHeader(id))?;
        Ok(id)
    }

    pub fn expects_reply(&self) -> bool {
        self.headers
            .try_read_first::<ExpectsReplyHeader>()
            .ok()
            .flatten()
            .is_some_and(|h| h.0)
    }

    pub fn set_expects_reply(
        &mut self,
        expects_reply: bool,
    ) -> Result<(), ErrorOf<CodecErrorKind>> {
        self.headers.replace(&ExpectsReplyHeader(expects_reply))
    }

    pub fn relates_to(&self) -> Option<MessageId> {
        self.headers
            .try_read_first::<RelatesToHeader>()
            .ok()
            .flatten()
            .map(|h| h.0)
    }

    pub fn set_relates_to(&mut self, id: MessageId) -> Result<(), ErrorOf<CodecErrorKind>> {
        self.headers.replace(&RelatesToHeader(id))
    }

    pub fn is_reply(&self) -> bool {
        self.relates_to().is_some()
    }

    pub fn fault_code(&self) -> Option<FaultCode> {
        self.headers
            .try_read_first::<FaultHeader>()
            .ok()
            .flatten()
            .map(|h| h.code)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ErrorOf<CodecErrorKind>> {
        codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ErrorOf<CodecErrorKind>> {
        codec::decode(bytes)
    }
}

fn fault_action(code: FaultCode) -> String {
    format!("{:?}Fault", code)
}
