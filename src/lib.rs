//! Message-passing bridge adapter for a document database client.
//!
//! The crate exposes documents, queries, aggregates, batched writes and
//! server-managed transactions to a host application that lives in a
//! different execution context and can only reach the client through
//! asynchronous messages. All boundary operations hang off
//! [`DocstoreBridge`]; transaction progress is reported out-of-band on the
//! push channel returned by [`DocstoreBridge::subscribe`].
//!
//! The hard part of the design is driving the engine's synchronous
//! transaction callback from commands that arrive asynchronously from the
//! remote caller. See [`bridge::transaction`] for the rendezvous protocol.

pub mod bridge;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod value;
pub mod wire;

mod constants;
mod runtime;

pub use bridge::{BridgeOptions, DocstoreBridge, TransactionEvent, TransactionEventType};
pub use error::{BridgeError, BridgeErrorCode, BridgeResult};
pub use registry::{InstanceKey, InstanceRegistry};
pub use store::{ClientSettings, EmulatorEndpoint, StoreClient};
