#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]

//! Point-to-point messaging between the nodes of a federation, and the
//! ordered per-entity dispatch built on top of it.

pub mod proto {
    //! The wire model: node identities, headers, messages and faults.

    pub use federa_proto::headers;
    pub use federa_proto::{
        Actor, CodecErrorKind, FaultCode, Generation, Message, MessageId, NodeDoesNotMatchFaultBody,
        NodeId, NodeInstance, PToPActor, RingName,
    };
}

pub mod common {
    //! Errors, futures and validation shared by every crate.

    pub use federa_common::impl_error_kind;

    pub mod log {
        pub use federa_common::log::*;
    }

    pub mod error {
        pub use federa_common::errors::error_kind::HasErrorKind;
        pub use federa_common::errors::error_of::ErrorOf;
    }

    pub mod future {
        pub use federa_common::futures::catch_panic::{CatchPanic, CatchPanicExt};
        pub use federa_common::futures::timeout::FutureTimeoutExt;
    }

    pub mod validation {
        pub use federa_common::validation::{Valid, Validate};
    }
}

pub mod jobs {
    //! Jobs under one key run in order, one at a time.

    pub use federa_jobs::{Job, JobOutcome, JobQueue, JobQueueLimits, ScheduleErrorKind};
}

pub mod p2p {
    //! The point-to-point manager: routing, request/reply correlation,
    //! actor dispatch and loopback.

    pub use federa_p2p::*;
}

#[cfg(feature = "ra")]
pub mod ra {
    //! The reconfiguration agent's message handler: admission, generation
    //! checks and ordered per-entity processing.

    pub use federa_ra::*;
}
