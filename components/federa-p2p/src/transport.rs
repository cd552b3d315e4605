use std::fmt;
use std::sync::Arc;

use federa_common::errors::error_of::ErrorOf;
use federa_common::impl_error_kind;
use federa_proto::Message;

/// A resolved, transport-specific handle to send to.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SendTarget {
    address: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Unreachable,
    MessageTooLarge,
    Closed,
}

impl_error_kind!(TransportErrorKind);

/// The transport below the routing core. Implementations report failures as
/// errors and never block the caller on I/O.
pub trait Transport: Send + Sync + 'static {
    /// A cached or cheaply created handle; `None` if the address is unknown.
    fn resolve_target(&self, address: &str) -> Option<SendTarget>;

    fn send_one_way(
        &self,
        target: &SendTarget,
        message: Message,
    ) -> Result<(), ErrorOf<TransportErrorKind>>;
}

impl SendTarget {
    pub fn new(address: impl Into<Arc<str>>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Debug for SendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SendTarget({})", self.address)
    }
}
