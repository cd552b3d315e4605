#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]

//! Wire model shared by the routing core: node identities, message ids,
//! the header collection and the message envelope itself.

pub mod actor;
pub mod fault;
pub mod generation;
pub mod headers;
pub mod message;
pub mod message_id;
pub mod node;

mod codec;

pub use actor::{Actor, PToPActor};
pub use codec::CodecErrorKind;
pub use fault::{FaultCode, NodeDoesNotMatchFaultBody};
pub use generation::Generation;
pub use message::Message;
pub use message_id::MessageId;
pub use node::{NodeId, NodeInstance, RingName};
