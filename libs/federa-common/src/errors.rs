pub mod error_kind;
pub mod error_of;
