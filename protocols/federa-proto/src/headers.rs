//! Headers travel as opaque, individually encoded blobs tagged by kind, so
//! intermediaries can carry headers they do not understand.

use bytes::Bytes;
use federa_common::errors::error_of::ErrorOf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::actor::PToPActor;
use crate::codec::{self, CodecErrorKind};
use crate::fault::FaultCode;
use crate::generation::Generation;
use crate::message_id::MessageId;
use crate::node::{NodeInstance, RingName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HeaderKind {
    PToP,
    MessageId,
    ExpectsReply,
    RelatesTo,
    Retry,
    Fault,
    Generation,
    Neighborhood,
    Custom(u16),
}

pub trait Header: Serialize + DeserializeOwned {
    const KIND: HeaderKind;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(HeaderKind, Bytes)>,
}

impl Headers {
    pub fn add<H: Header>(&mut self, header: &H) -> Result<(), ErrorOf<CodecErrorKind>> {
        let blob = codec::encode(header)?;
        self.entries.push((H::KIND, blob.into()));
        Ok(())
    }

    /// Removes every header of this kind, then adds the given one.
    pub fn replace<H: Header>(&mut self, header: &H) -> Result<(), ErrorOf<CodecErrorKind>> {
        let blob = codec::encode(header)?;
        self.entries.retain(|(kind, _)| *kind != H::KIND);
        self.entries.push((H::KIND, blob.into()));
        Ok(())
    }

    pub fn try_read_first<H: Header>(&self) -> Result<Option<H>, ErrorOf<CodecErrorKind>> {
        self.entries
            .iter()
            .find(|(kind, _)| *kind == H::KIND)
            .map(|(_, blob)| codec::decode(blob))
            .transpose()
    }

    /// Removes the first header of this kind and returns it decoded.
    pub fn try_remove<H: Header>(&mut self) -> Result<Option<H>, ErrorOf<CodecErrorKind>> {
        let Some(idx) = self.entries.iter().position(|(kind, _)| *kind == H::KIND) else {
            return Ok(None)
        };
        let (_, blob) = self.entries.remove(idx);
        codec::decode(&blob).map(Some)
    }

    pub fn contains<H: Header>(&self) -> bool {
        self.entries.iter().any(|(kind, _)| *kind == H::KIND)
    }

    pub fn count<H: Header>(&self) -> usize {
        self.entries
            .iter()
            .filter(|(kind, _)| *kind == H::KIND)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PToPHeader {
    pub from:           NodeInstance,
    pub to:             NodeInstance,
    pub actor:          PToPActor,
    pub from_ring:      RingName,
    pub to_ring:        RingName,
    pub exact_instance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIdHeader(pub MessageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectsReplyHeader(pub bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatesToHeader(pub MessageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryHeader {
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultHeader {
    pub code: FaultCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationHeader {
    pub generation: Generation,
}

/// Attached when a message leaves its sender's ring, so the receiver learns
/// where the sender lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodHeader {
    pub instance: NodeInstance,
    pub ring:     RingName,
}

macro_rules! header_kind {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Header for $ty {
                const KIND: HeaderKind = HeaderKind::$kind;
            }
        )*
    };
}

header_kind! {
    PToPHeader => PToP,
    MessageIdHeader => MessageId,
    ExpectsReplyHeader => ExpectsReply,
    RelatesToHeader => RelatesTo,
    RetryHeader => Retry,
    FaultHeader => Fault,
    GenerationHeader => Generation,
    NeighborhoodHeader => Neighborhood,
}
