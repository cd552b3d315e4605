#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]

//! An ordered per-key job queue.
//!
//! Jobs scheduled under the same key run one at a time, in the order they
//! were scheduled. Jobs under different keys run in parallel, bounded by
//! `max_concurrency`.

mod limits;
mod queue;

pub use limits::JobQueueLimits;
pub use queue::{Job, JobOutcome, JobQueue, ScheduleErrorKind};
