#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]

//! The reconfiguration agent's message intake: per-action metadata,
//! admission checks, generation tracking and ordered per-entity processing.

pub mod config;
pub mod context;
pub mod entity_map;
pub mod generation;
pub mod lifecycle;
pub mod message_handler;
pub mod metadata;

pub use config::{GenerationPolicy, RaConfig};
pub use context::MessageContext;
pub use entity_map::{EntityEntry, EntityId, EntityMap};
pub use generation::{GenerationCheck, GenerationState};
pub use lifecycle::NodeLifecycle;
pub use message_handler::MessageHandler;
pub use metadata::{MessageKinds, MessageMetadata, MessageTarget};
