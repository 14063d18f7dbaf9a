use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BridgeResult;
use crate::model::{DocumentKey, FieldPath};
use crate::store::aggregate::AggregateDefinition;
use crate::store::query::QueryDefinition;
use crate::store::snapshot::DocumentSnapshot;
use crate::store::write::FieldTransform;
use crate::value::{MapValue, StoreValue};

/// A single write inside a batch or transaction commit.
#[derive(Clone, Debug)]
pub enum WriteOperation {
    Set {
        key: DocumentKey,
        data: MapValue,
        mask: Option<Vec<FieldPath>>,
        transforms: Vec<FieldTransform>,
    },
    Update {
        key: DocumentKey,
        data: MapValue,
        field_paths: Vec<FieldPath>,
        transforms: Vec<FieldTransform>,
    },
    Delete {
        key: DocumentKey,
    },
}

/// How a transaction attempt's commit resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// All reads were still current; the staged writes are applied.
    Committed,
    /// A document read by the attempt changed underneath it; the caller
    /// should begin a fresh attempt.
    Contended,
}

/// Narrow seam to the underlying document database.
///
/// Everything above this trait is engine-agnostic; the bundled
/// implementation is [`crate::store::MemoryDatastore`].
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> BridgeResult<DocumentSnapshot>;

    async fn run_query(&self, query: &QueryDefinition) -> BridgeResult<Vec<DocumentSnapshot>>;

    async fn run_aggregate(
        &self,
        query: &QueryDefinition,
        aggregates: &[AggregateDefinition],
    ) -> BridgeResult<BTreeMap<String, StoreValue>>;

    /// Applies the writes atomically, in submitted order.
    async fn commit(&self, writes: Vec<WriteOperation>) -> BridgeResult<()>;

    /// Starts a new transaction attempt.
    fn begin_attempt(&self) -> Arc<dyn TransactionAttempt>;
}

/// One execution of a transaction body against a consistent view.
///
/// Reads observe the attempt's own staged writes. The attempt stays valid
/// until [`TransactionAttempt::commit`] resolves; afterwards the handle must
/// be discarded.
#[async_trait]
pub trait TransactionAttempt: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> BridgeResult<DocumentSnapshot>;

    /// Queues a write to be applied if the attempt commits.
    fn stage(&self, write: WriteOperation) -> BridgeResult<()>;

    /// Validates the attempt's read set and applies its staged writes.
    async fn commit(&self) -> BridgeResult<AttemptOutcome>;
}
