use federa_common::errors::error_of::ErrorOf;
use federa_common::impl_error_kind;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodecErrorKind {
    Encode,
    Decode,
}

impl_error_kind!(CodecErrorKind);

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ErrorOf<CodecErrorKind>> {
    rmp_serde::to_vec(value).map_err(|e| ErrorOf::new(CodecErrorKind::Encode, e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ErrorOf<CodecErrorKind>> {
    rmp_serde::from_slice(bytes).map_err(|e| ErrorOf::new(CodecErrorKind::Decode, e.to_string()))
}
