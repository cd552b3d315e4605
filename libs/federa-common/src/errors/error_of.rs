use std::sync::Arc;

use crate::errors::error_kind::{ErrorKind, HasErrorKind};

/// An error of a known kind, accompanied by a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}", kind, message)]
pub struct ErrorOf<Kind: ErrorKind> {
    pub kind:    Kind,
    pub message: Arc<str>,
}

impl<K0> ErrorOf<K0>
where
    K0: ErrorKind,
{
    pub fn map_kind<K1>(self, map: impl FnOnce(K0) -> K1) -> ErrorOf<K1>
    where
        K1: ErrorKind,
    {
        let ErrorOf { kind, message } = self;
        let kind = map(kind);
        ErrorOf { kind, message }
    }
}

impl<K: ErrorKind> ErrorOf<K> {
    pub fn new(kind: K, message: impl Into<Arc<str>>) -> Self {
        let message = message.into();
        Self { kind, message }
    }

    /// An error whose message is the kind itself.
    pub fn bare(kind: K) -> Self {
        let message = kind.to_string();
        Self::new(kind, message)
    }

    pub fn is(&self, kind: K) -> bool {
        self.kind == kind
    }
}

impl<Kind: ErrorKind> HasErrorKind<Kind> for ErrorOf<Kind> {
    fn kind(&self) -> Kind {
        self.kind
    }
}
