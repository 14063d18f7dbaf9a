use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

use crate::constants::{MAX_BATCH_WRITES, MAX_TRANSACTION_ATTEMPTS};
use crate::error::{
    aborted, failed_precondition, invalid_argument, resource_exhausted, BridgeResult,
};
use crate::runtime;
use crate::store::aggregate::AggregateDefinition;
use crate::store::datastore::{
    AttemptOutcome, Datastore, TransactionAttempt, WriteOperation,
};
use crate::store::query::QueryDefinition;
use crate::store::snapshot::DocumentSnapshot;
use crate::store::write::{self, SetOptions};
use crate::value::StoreValue;

const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Endpoint of a local test/emulator backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorEndpoint {
    host: String,
    port: u16,
}

impl EmulatorEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Connection settings attached to a client handle.
#[derive(Clone, Debug, Default)]
pub struct ClientSettings {
    host: Option<String>,
    ssl: Option<bool>,
    cache_size_bytes: Option<i64>,
    emulator: Option<EmulatorEndpoint>,
}

impl ClientSettings {
    /// Decodes a settings map from the boundary. Recognized keys are `host`,
    /// `ssl` and `cacheSizeBytes`; anything else is ignored with a debug log
    /// so newer callers do not break older bridges.
    pub fn from_wire(raw: &JsonValue) -> BridgeResult<Self> {
        let map = match raw {
            JsonValue::Null => return Ok(Self::default()),
            JsonValue::Object(map) => map,
            _ => return Err(invalid_argument("Settings must be an object")),
        };

        let mut settings = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "host" => {
                    settings.host = Some(
                        value
                            .as_str()
                            .ok_or_else(|| invalid_argument("Settings host must be a string"))?
                            .to_string(),
                    );
                }
                "ssl" => {
                    settings.ssl = Some(
                        value
                            .as_bool()
                            .ok_or_else(|| invalid_argument("Settings ssl must be a boolean"))?,
                    );
                }
                "cacheSizeBytes" => {
                    settings.cache_size_bytes = Some(value.as_i64().ok_or_else(|| {
                        invalid_argument("Settings cacheSizeBytes must be an integer")
                    })?);
                }
                other => {
                    log::debug!("ignoring unrecognized settings key '{other}'");
                }
            }
        }
        Ok(settings)
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn ssl(&self) -> Option<bool> {
        self.ssl
    }

    pub fn cache_size_bytes(&self) -> Option<i64> {
        self.cache_size_bytes
    }

    pub fn emulator(&self) -> Option<&EmulatorEndpoint> {
        self.emulator.as_ref()
    }

    pub fn with_emulator(mut self, endpoint: EmulatorEndpoint) -> Self {
        self.emulator = Some(endpoint);
        self
    }
}

/// Handle to one (application, database) pairing.
///
/// Handles are cheap to clone; all clones share the terminated flag, so
/// terminating through the registry invalidates every outstanding copy.
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    app_name: String,
    database_id: String,
    settings: ClientSettings,
    datastore: Arc<dyn Datastore>,
    terminated: AtomicBool,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("app_name", &self.inner.app_name)
            .field("database_id", &self.inner.database_id)
            .field("settings", &self.inner.settings)
            .field(
                "terminated",
                &self.inner.terminated.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl StoreClient {
    pub(crate) fn new(
        app_name: impl Into<String>,
        database_id: impl Into<String>,
        settings: ClientSettings,
        datastore: Arc<dyn Datastore>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                app_name: app_name.into(),
                database_id: database_id.into(),
                settings,
                datastore,
                terminated: AtomicBool::new(false),
            }),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    pub fn database_id(&self) -> &str {
        &self.inner.database_id
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub(crate) fn datastore(&self) -> Arc<dyn Datastore> {
        Arc::clone(&self.inner.datastore)
    }

    pub(crate) fn mark_terminated(&self) {
        self.inner.terminated.store(true, Ordering::SeqCst);
    }

    fn ensure_active(&self) -> BridgeResult<()> {
        if self.inner.terminated.load(Ordering::SeqCst) {
            return Err(failed_precondition(format!(
                "The client for '{}:{}' has been terminated",
                self.inner.app_name, self.inner.database_id
            )));
        }
        Ok(())
    }

    pub async fn get_doc(&self, path: &str) -> BridgeResult<DocumentSnapshot> {
        self.ensure_active()?;
        let key = write::validate_document_path(path)?;
        self.inner.datastore.get_document(&key).await
    }

    pub async fn set_doc(
        &self,
        path: &str,
        data: BTreeMap<String, StoreValue>,
        options: SetOptions,
    ) -> BridgeResult<()> {
        self.ensure_active()?;
        let key = write::validate_document_path(path)?;
        let encoded = write::encode_set_data(data, &options)?;
        self.inner
            .datastore
            .commit(vec![WriteOperation::Set {
                key,
                data: encoded.map,
                mask: encoded.mask,
                transforms: encoded.transforms,
            }])
            .await
    }

    /// Applies a partial update, requiring the document to exist.
    pub async fn update_doc(
        &self,
        path: &str,
        data: BTreeMap<String, StoreValue>,
    ) -> BridgeResult<()> {
        self.ensure_active()?;
        let key = write::validate_document_path(path)?;
        let encoded = write::encode_update_data(data)?;
        self.inner
            .datastore
            .commit(vec![WriteOperation::Update {
                key,
                data: encoded.map,
                field_paths: encoded.field_paths,
                transforms: encoded.transforms,
            }])
            .await
    }

    /// Deletes the document at `path`; succeeds even if it does not exist.
    pub async fn delete_doc(&self, path: &str) -> BridgeResult<()> {
        self.ensure_active()?;
        let key = write::validate_document_path(path)?;
        self.inner
            .datastore
            .commit(vec![WriteOperation::Delete { key }])
            .await
    }

    pub async fn run_query(
        &self,
        query: &QueryDefinition,
    ) -> BridgeResult<Vec<DocumentSnapshot>> {
        self.ensure_active()?;
        let mut documents = self.inner.datastore.run_query(query).await?;
        if query.limit_type() == crate::store::query::LimitType::Last {
            documents.reverse();
        }
        Ok(documents)
    }

    pub async fn run_aggregate(
        &self,
        query: &QueryDefinition,
        aggregates: &[AggregateDefinition],
    ) -> BridgeResult<BTreeMap<String, StoreValue>> {
        self.ensure_active()?;
        if aggregates.is_empty() {
            return Err(invalid_argument(
                "Aggregate queries must name at least one aggregation",
            ));
        }
        self.inner.datastore.run_aggregate(query, aggregates).await
    }

    /// Commits an atomic batch of writes in submitted order.
    pub async fn commit_batch(&self, writes: Vec<WriteOperation>) -> BridgeResult<()> {
        self.ensure_active()?;
        if writes.len() > MAX_BATCH_WRITES {
            return Err(resource_exhausted(format!(
                "Batches cannot contain more than {MAX_BATCH_WRITES} writes"
            )));
        }
        self.inner.datastore.commit(writes).await
    }
}

/// Runs `body` inside a server-managed transaction, retrying contended
/// attempts with exponential backoff.
///
/// The body is re-invoked with a fresh attempt handle on every retry; any
/// error it returns aborts the transaction without further attempts.
pub async fn run_transaction<F>(client: &StoreClient, mut body: F) -> BridgeResult<()>
where
    F: FnMut(Arc<dyn TransactionAttempt>) -> BoxFuture<'static, BridgeResult<()>> + Send,
{
    client.ensure_active()?;

    let mut backoff = INITIAL_RETRY_BACKOFF;
    for attempt_index in 0..MAX_TRANSACTION_ATTEMPTS {
        let attempt = client.inner.datastore.begin_attempt();
        body(Arc::clone(&attempt)).await?;
        match attempt.commit().await? {
            AttemptOutcome::Committed => return Ok(()),
            AttemptOutcome::Contended => {
                log::debug!(
                    "transaction attempt {} contended for '{}:{}', retrying",
                    attempt_index + 1,
                    client.app_name(),
                    client.database_id()
                );
                runtime::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }

    Err(aborted(
        "Transaction failed: too many contended attempts",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDatastore;
    use futures::FutureExt;

    fn memory_client() -> StoreClient {
        StoreClient::new(
            "test-app",
            "(default)",
            ClientSettings::default(),
            Arc::new(MemoryDatastore::new()),
        )
    }

    fn string_data(name: &str, value: &str) -> BTreeMap<String, StoreValue> {
        BTreeMap::from([(name.to_string(), StoreValue::from_string(value))])
    }

    #[tokio::test]
    async fn set_and_get_document() {
        let client = memory_client();
        client
            .set_doc("users/ada", string_data("name", "Ada"), SetOptions::overwrite())
            .await
            .unwrap();
        let snapshot = client.get_doc("users/ada").await.unwrap();
        assert!(snapshot.exists());
    }

    #[tokio::test]
    async fn terminated_client_rejects_operations() {
        let client = memory_client();
        client.mark_terminated();
        let err = client.get_doc("users/ada").await.unwrap_err();
        assert_eq!(err.code_str(), "failed-precondition");
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let client = memory_client();
        let key = crate::model::DocumentKey::from_string("users/ada").unwrap();
        let writes: Vec<_> = (0..=MAX_BATCH_WRITES)
            .map(|_| WriteOperation::Delete { key: key.clone() })
            .collect();
        let err = client.commit_batch(writes).await.unwrap_err();
        assert_eq!(err.code_str(), "resource-exhausted");
    }

    #[tokio::test]
    async fn transaction_commits_staged_writes() {
        let client = memory_client();
        run_transaction(&client, |attempt| {
            async move {
                let mut data = BTreeMap::new();
                data.insert("x".to_string(), StoreValue::from_integer(1));
                let encoded =
                    write::encode_set_data(data, &SetOptions::overwrite()).unwrap();
                attempt.stage(WriteOperation::Set {
                    key: crate::model::DocumentKey::from_string("c/1").unwrap(),
                    data: encoded.map,
                    mask: encoded.mask,
                    transforms: encoded.transforms,
                })
            }
            .boxed()
        })
        .await
        .unwrap();

        let snapshot = client.get_doc("c/1").await.unwrap();
        assert!(snapshot.exists());
    }

    #[tokio::test]
    async fn persistent_contention_exhausts_attempts() {
        let client = memory_client();
        client
            .set_doc("users/ada", string_data("name", "Ada"), SetOptions::overwrite())
            .await
            .unwrap();

        let contender = client.clone();
        let result = run_transaction(&client, move |attempt| {
            let contender = contender.clone();
            async move {
                let key = crate::model::DocumentKey::from_string("users/ada").unwrap();
                attempt.get_document(&key).await?;
                // Invalidate the read before every commit.
                contender
                    .set_doc(
                        "users/ada",
                        BTreeMap::from([(
                            "name".to_string(),
                            StoreValue::from_string("Grace"),
                        )]),
                        SetOptions::overwrite(),
                    )
                    .await
            }
            .boxed()
        })
        .await;

        assert_eq!(result.unwrap_err().code_str(), "aborted");
    }

    #[tokio::test]
    async fn body_error_aborts_without_retry() {
        let client = memory_client();
        let result = run_transaction(&client, |_attempt| {
            async { Err(invalid_argument("bad command")) }.boxed()
        })
        .await;
        assert_eq!(result.unwrap_err().code_str(), "invalid-argument");
    }
}
