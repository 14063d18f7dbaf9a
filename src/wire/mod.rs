//! Conversions between engine-native values and the transport-neutral
//! shapes exchanged with the remote caller.

pub mod query;
pub mod snapshot;
pub mod value;
pub mod write;

pub use write::{CommandKind, WriteCommand};
