#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]

//! Point-to-point messaging between the nodes of a federation: routing
//! headers, request/reply correlation, actor dispatch and loopback.

pub mod actor_map;
pub mod config;
pub mod events;
pub mod manager;
pub mod partner;
pub mod ports;
pub mod receiver;
pub mod request_table;
pub mod transport;

mod loopback;
#[cfg(feature = "test-util")]
pub mod testing;
#[cfg(feature = "unreliable-transport")]
pub mod unreliable;

pub use actor_map::{Filter, MessageFilter, MessageHandlerPair};
pub use config::P2pConfig;
pub use events::{DropReason, Event, EventSink, EventSinkExt, TracingEventSink};
pub use manager::{PointToPointManager, PointToPointManagerBuilder};
pub use partner::{PartnerNode, PartnerTable};
pub use ports::{DeliveryScheduler, LeaseAgent, LoopbackDelay};
pub use receiver::{OneWayReceiverContext, ReceiverContext, RequestReceiverContext};
pub use request_table::{PendingRequest, RequestErrorKind};
pub use transport::{SendTarget, Transport, TransportErrorKind};
