//! The prelude exports the types and helpers which almost every user
//! of this crate needs.
pub use super::descriptor::{IoDescriptor, ResultDescriptor, ResultFlags, TransferMode};
pub use super::unit::UnitId;
pub use super::word::*;
