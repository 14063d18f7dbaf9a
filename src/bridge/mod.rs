//! The boundary surface: every operation the remote caller can invoke.

pub(crate) mod buffer;
pub mod events;
pub mod transaction;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::{internal_error, invalid_argument, unsupported, BridgeResult};
use crate::registry::{DatastoreFactory, InstanceRegistry};
use crate::store::client::{ClientSettings, StoreClient};
use crate::store::{AggregateDefinition, AggregateOperation};
use crate::value::ValueKind;
use crate::wire;

use self::events::EventChannel;
use self::transaction::TransactionCoordinator;

pub use self::events::{TransactionEvent, TransactionEventType};

const COUNT_ALIAS: &str = "count";

/// Construction-time knobs for a [`DocstoreBridge`].
#[derive(Default)]
pub struct BridgeOptions {
    /// Factory for the datastore behind newly constructed client handles;
    /// defaults to the bundled in-memory engine.
    pub datastore_factory: Option<DatastoreFactory>,
    /// Optional bound on how long a transaction attempt waits for its
    /// command buffer. Unset means wait indefinitely.
    pub command_deadline: Option<Duration>,
}

/// Owned context for one bridge endpoint.
///
/// Holds the instance registry, the transaction coordinator and the push
/// event channel; nothing lives in process-wide globals, so several
/// independent bridges can coexist in one process.
#[derive(Clone)]
pub struct DocstoreBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    registry: InstanceRegistry,
    coordinator: Arc<TransactionCoordinator>,
    events: EventChannel,
}

impl Default for DocstoreBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl DocstoreBridge {
    pub fn new() -> Self {
        Self::with_options(BridgeOptions::default())
    }

    pub fn with_options(options: BridgeOptions) -> Self {
        let registry = match options.datastore_factory {
            Some(factory) => InstanceRegistry::with_factory(factory),
            None => InstanceRegistry::new(),
        };
        let events = EventChannel::new();
        let coordinator = Arc::new(TransactionCoordinator::new(
            events.clone(),
            options.command_deadline,
        ));
        Self {
            inner: Arc::new(BridgeInner {
                registry,
                coordinator,
                events,
            }),
        }
    }

    /// Receiver for the push notification channel. A single consumer is
    /// expected; events are delivered in emission order.
    pub fn subscribe(&self) -> async_channel::Receiver<TransactionEvent> {
        self.inner.events.subscribe()
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.inner.registry
    }

    fn instance(&self, app_name: &str, database_id: &str) -> BridgeResult<StoreClient> {
        self.inner.registry.get_instance(app_name, database_id)
    }

    // ---- instance lifecycle -------------------------------------------------

    /// Adjusts the global log level. Accepted levels: `silent`, `error`,
    /// `warn`, `info`, `debug`, `verbose`.
    pub fn set_log_level(&self, level: &str) -> BridgeResult<()> {
        let filter = match level {
            "silent" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "verbose" => log::LevelFilter::Trace,
            other => {
                return Err(invalid_argument(format!("Unknown log level '{other}'")));
            }
        };
        log::set_max_level(filter);
        Ok(())
    }

    pub fn use_emulator(
        &self,
        app_name: &str,
        database_id: &str,
        host: &str,
        port: u16,
    ) -> BridgeResult<()> {
        self.inner
            .registry
            .configure_emulator(app_name, database_id, host, port)
    }

    pub fn settings(
        &self,
        app_name: &str,
        database_id: &str,
        settings: &JsonValue,
    ) -> BridgeResult<()> {
        let settings = ClientSettings::from_wire(settings)?;
        self.inner
            .registry
            .configure_settings(app_name, database_id, settings)?;
        Ok(())
    }

    pub fn terminate(&self, app_name: &str, database_id: &str) -> BridgeResult<()> {
        self.inner.registry.terminate(app_name, database_id)
    }

    // ---- one-shot reads -----------------------------------------------------

    pub async fn document_get(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        get_options: &JsonValue,
    ) -> BridgeResult<JsonValue> {
        wire::query::ensure_supported_source(get_options)?;
        let client = self.instance(app_name, database_id)?;
        let snapshot = client.get_doc(path).await?;
        wire::snapshot::document_result(&snapshot)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn collection_get(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        query_type: &str,
        filters: &JsonValue,
        orders: &JsonValue,
        options: &JsonValue,
        get_options: &JsonValue,
    ) -> BridgeResult<JsonValue> {
        wire::query::ensure_supported_source(get_options)?;
        let client = self.instance(app_name, database_id)?;
        let query = wire::query::decode_query(path, query_type, filters, orders, options)?;
        let documents = client.run_query(&query).await?;
        wire::snapshot::query_result(&documents)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn collection_count(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        query_type: &str,
        filters: &JsonValue,
        orders: &JsonValue,
        options: &JsonValue,
    ) -> BridgeResult<i64> {
        let client = self.instance(app_name, database_id)?;
        let query = wire::query::decode_query(path, query_type, filters, orders, options)?;
        let aggregates = vec![AggregateDefinition::new(COUNT_ALIAS, AggregateOperation::Count)?];
        let results = client.run_aggregate(&query, &aggregates).await?;
        match results.get(COUNT_ALIAS).map(|value| value.kind()) {
            Some(ValueKind::Integer(count)) => Ok(*count),
            _ => Err(internal_error(
                "Count aggregation returned a non-integer result",
            )),
        }
    }

    /// Runs named aggregations over a query, returning a plain map from the
    /// caller's alias to a scalar (numbers, or null for an undefined
    /// average).
    #[allow(clippy::too_many_arguments)]
    pub async fn aggregate_query(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        query_type: &str,
        filters: &JsonValue,
        orders: &JsonValue,
        options: &JsonValue,
        aggregate_specs: &JsonValue,
    ) -> BridgeResult<JsonValue> {
        let client = self.instance(app_name, database_id)?;
        let query = wire::query::decode_query(path, query_type, filters, orders, options)?;
        let aggregates = wire::query::decode_aggregates(aggregate_specs)?;
        let results = client.run_aggregate(&query, &aggregates).await?;

        let mut body = serde_json::Map::new();
        for (alias, value) in results {
            let scalar = match value.kind() {
                ValueKind::Integer(n) => JsonValue::from(*n),
                ValueKind::Double(d) => JsonValue::from(*d),
                ValueKind::Null => JsonValue::Null,
                other => {
                    return Err(internal_error(format!(
                        "Aggregation '{alias}' produced a non-scalar result ({other:?})"
                    )))
                }
            };
            body.insert(alias, scalar);
        }
        Ok(JsonValue::Object(body))
    }

    // ---- one-shot writes ----------------------------------------------------

    pub async fn document_set(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        data: &JsonValue,
        options: &JsonValue,
    ) -> BridgeResult<()> {
        let client = self.instance(app_name, database_id)?;
        let fields = wire::value::decode_fields(data)?;
        let options = wire::write::decode_set_options(Some(options))?;
        client.set_doc(path, fields, options).await
    }

    pub async fn document_update(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
        data: &JsonValue,
    ) -> BridgeResult<()> {
        let client = self.instance(app_name, database_id)?;
        let fields = wire::value::decode_fields(data)?;
        client.update_doc(path, fields).await
    }

    pub async fn document_delete(
        &self,
        app_name: &str,
        database_id: &str,
        path: &str,
    ) -> BridgeResult<()> {
        let client = self.instance(app_name, database_id)?;
        client.delete_doc(path).await
    }

    /// Commits an unordered-at-the-API but atomic batch; writes land in
    /// submitted order, so later writes to the same document win.
    pub async fn document_batch(
        &self,
        app_name: &str,
        database_id: &str,
        writes: &JsonValue,
    ) -> BridgeResult<()> {
        let client = self.instance(app_name, database_id)?;
        let writes = wire::write::decode_batch(writes)?;
        client.commit_batch(writes).await
    }

    // ---- transactions -------------------------------------------------------

    /// Starts a remote-driven transaction. Resolves once the attempt loop is
    /// spawned; progress and outcome arrive on the push channel.
    pub fn transaction_begin(
        &self,
        app_name: &str,
        database_id: &str,
        transaction_id: &str,
    ) -> BridgeResult<()> {
        let client = self.instance(app_name, database_id)?;
        self.inner
            .coordinator
            .begin(client, transaction_id.to_string())
    }

    pub async fn transaction_get_document(
        &self,
        _app_name: &str,
        _database_id: &str,
        transaction_id: &str,
        path: &str,
    ) -> BridgeResult<JsonValue> {
        let snapshot = self
            .inner
            .coordinator
            .get_document(transaction_id, path)
            .await?;
        wire::snapshot::document_result(&snapshot)
    }

    pub fn transaction_apply_buffer(
        &self,
        _app_name: &str,
        _database_id: &str,
        transaction_id: &str,
        commands: &JsonValue,
    ) -> BridgeResult<()> {
        let commands = wire::write::decode_commands(commands)?;
        self.inner
            .coordinator
            .apply_buffer(transaction_id, commands)
    }

    pub fn transaction_dispose(
        &self,
        _app_name: &str,
        _database_id: &str,
        transaction_id: &str,
    ) -> BridgeResult<()> {
        self.inner.coordinator.dispose(transaction_id);
        Ok(())
    }

    // ---- unsupported surface ------------------------------------------------

    pub fn on_document_snapshot(
        &self,
        _app_name: &str,
        _database_id: &str,
        _path: &str,
    ) -> BridgeResult<()> {
        Err(unsupported(
            "Live document snapshot listeners are not available through this bridge",
        ))
    }

    pub fn on_collection_snapshot(
        &self,
        _app_name: &str,
        _database_id: &str,
        _path: &str,
    ) -> BridgeResult<()> {
        Err(unsupported(
            "Live collection snapshot listeners are not available through this bridge",
        ))
    }

    pub fn get_named_query(
        &self,
        _app_name: &str,
        _database_id: &str,
        _name: &str,
    ) -> BridgeResult<()> {
        Err(unsupported(
            "Named queries require bundle support, which this bridge does not offer",
        ))
    }

    pub fn load_bundle(&self, _app_name: &str, _database_id: &str) -> BridgeResult<()> {
        Err(unsupported(
            "Bundle loading is not available through this bridge",
        ))
    }

    pub fn clear_persistence(&self, _app_name: &str, _database_id: &str) -> BridgeResult<()> {
        Err(unsupported(
            "There is no persistence layer behind this bridge to clear",
        ))
    }

    pub fn enable_network(&self, _app_name: &str, _database_id: &str) -> BridgeResult<()> {
        Err(unsupported(
            "Network toggling is not available through this bridge",
        ))
    }

    pub fn disable_network(&self, _app_name: &str, _database_id: &str) -> BridgeResult<()> {
        Err(unsupported(
            "Network toggling is not available through this bridge",
        ))
    }

    pub fn set_index_configuration(
        &self,
        _app_name: &str,
        _database_id: &str,
    ) -> BridgeResult<()> {
        Err(unsupported(
            "Cache index management is not available through this bridge",
        ))
    }

    /// With no offline queue there is never anything to wait on, so this
    /// resolves immediately rather than erroring.
    pub async fn wait_for_pending_writes(
        &self,
        _app_name: &str,
        _database_id: &str,
    ) -> BridgeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_roundtrips_through_the_boundary() {
        let bridge = DocstoreBridge::new();
        bridge
            .document_set(
                "app",
                "(default)",
                "users/1",
                &json!({ "name": { "stringValue": "A" } }),
                &json!({}),
            )
            .await
            .unwrap();

        let result = bridge
            .document_get("app", "(default)", "users/1", &JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(result["path"], json!("users/1"));
        assert_eq!(result["exists"], json!(true));
        assert_eq!(result["data"]["name"], json!({ "stringValue": "A" }));
    }

    #[tokio::test]
    async fn unsupported_surface_fails_fast() {
        let bridge = DocstoreBridge::new();
        for err in [
            bridge.on_document_snapshot("app", "(default)", "users/1"),
            bridge.on_collection_snapshot("app", "(default)", "users"),
            bridge.get_named_query("app", "(default)", "top-users"),
            bridge.load_bundle("app", "(default)"),
            bridge.clear_persistence("app", "(default)"),
            bridge.enable_network("app", "(default)"),
            bridge.disable_network("app", "(default)"),
            bridge.set_index_configuration("app", "(default)"),
        ] {
            assert_eq!(err.unwrap_err().code_str(), "unsupported");
        }

        bridge
            .wait_for_pending_writes("app", "(default)")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_log_levels_are_rejected() {
        let bridge = DocstoreBridge::new();
        assert!(bridge.set_log_level("verbose").is_ok());
        let err = bridge.set_log_level("chatty").unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[tokio::test]
    async fn document_update_requires_existing_document() {
        let bridge = DocstoreBridge::new();
        let err = bridge
            .document_update(
                "app",
                "(default)",
                "users/missing",
                &json!({ "name": { "stringValue": "A" } }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "not-found");
    }
}
