pub mod aggregate;
pub mod client;
pub mod datastore;
pub mod memory;
pub mod query;
pub mod snapshot;
pub mod write;

pub use aggregate::{AggregateDefinition, AggregateOperation};
pub use client::{run_transaction, ClientSettings, EmulatorEndpoint, StoreClient};
pub use datastore::{AttemptOutcome, Datastore, TransactionAttempt, WriteOperation};
pub use memory::MemoryDatastore;
pub use query::{
    Bound, FieldFilter, FilterOperator, LimitType, OrderBy, OrderDirection, QueryDefinition,
    QueryScope,
};
pub use snapshot::{DocumentSnapshot, SnapshotMetadata};
pub use write::SetOptions;
