use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

static ORIGIN: OnceLock<u64> = OnceLock::new();
static SEQ_NO: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a message.
///
/// The `origin` is picked at random once per process, the `seq` is taken
/// from a process-wide counter, so ids never repeat within a process and
/// practically never collide across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub origin: u64,
    pub seq:    u64,
}

impl MessageId {
    pub fn next() -> Self {
        let origin = *ORIGIN.get_or_init(rand::random::<u64>);
        let seq = SEQ_NO.fetch_add(1, AtomicOrdering::Relaxed);
        Self { origin, seq }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}:{}", self.origin, self.seq)
    }
}
