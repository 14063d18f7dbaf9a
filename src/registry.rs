use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::DEFAULT_DATABASE_ID;
use crate::error::{invalid_argument, BridgeResult};
use crate::store::client::{ClientSettings, EmulatorEndpoint, StoreClient};
use crate::store::datastore::Datastore;
use crate::store::memory::MemoryDatastore;

/// Constructs the datastore backing a newly built client handle.
///
/// The default factory serves the bundled in-memory engine; tests and
/// embedders that dial a real backend install their own and read the
/// endpoint out of the provided settings.
pub type DatastoreFactory =
    Arc<dyn Fn(&InstanceKey, &ClientSettings) -> Arc<dyn Datastore> + Send + Sync>;

/// Identifies one cached client handle: (application name, database id).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    app_name: String,
    database_id: String,
}

impl InstanceKey {
    pub fn new(app_name: impl Into<String>, database_id: impl Into<String>) -> Self {
        let database_id: String = database_id.into();
        Self {
            app_name: app_name.into(),
            database_id: if database_id.is_empty() {
                DEFAULT_DATABASE_ID.to_string()
            } else {
                database_id
            },
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.app_name, self.database_id)
    }
}

/// Process-lifetime cache of client handles, one per [`InstanceKey`].
///
/// Owned by the bridge context rather than stored in ambient globals, so
/// tests can run several isolated registries side by side.
pub struct InstanceRegistry {
    factory: DatastoreFactory,
    clients: Mutex<HashMap<InstanceKey, StoreClient>>,
    datastores: Mutex<HashMap<InstanceKey, Arc<dyn Datastore>>>,
    emulators: Mutex<HashMap<InstanceKey, EmulatorEndpoint>>,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::with_factory(Arc::new(|_key, _settings| {
            Arc::new(MemoryDatastore::new()) as Arc<dyn Datastore>
        }))
    }

    pub fn with_factory(factory: DatastoreFactory) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
            datastores: Mutex::new(HashMap::new()),
            emulators: Mutex::new(HashMap::new()),
        }
    }

    fn clients_guard(&self) -> MutexGuard<'_, HashMap<InstanceKey, StoreClient>> {
        self.clients.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn datastores_guard(&self) -> MutexGuard<'_, HashMap<InstanceKey, Arc<dyn Datastore>>> {
        self.datastores
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn emulators_guard(&self) -> MutexGuard<'_, HashMap<InstanceKey, EmulatorEndpoint>> {
        self.emulators
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn validated_key(app_name: &str, database_id: &str) -> BridgeResult<InstanceKey> {
        if app_name.trim().is_empty() {
            return Err(invalid_argument("Application names must not be empty"));
        }
        Ok(InstanceKey::new(app_name, database_id))
    }

    /// Returns the cached handle for the key, constructing it on first use.
    ///
    /// An emulator endpoint recorded before first use is applied to the
    /// handle's settings here.
    pub fn get_instance(&self, app_name: &str, database_id: &str) -> BridgeResult<StoreClient> {
        let key = Self::validated_key(app_name, database_id)?;
        if let Some(client) = self.clients_guard().get(&key) {
            return Ok(client.clone());
        }

        let settings = self.settings_with_recorded_emulator(&key, ClientSettings::default());
        let client = self.build_client(&key, settings);
        self.clients_guard().insert(key, client.clone());
        Ok(client)
    }

    /// Records an emulator endpoint for the key. An already constructed
    /// handle is rebuilt immediately so new operations pick up the endpoint;
    /// otherwise the endpoint is applied at first construction.
    pub fn configure_emulator(
        &self,
        app_name: &str,
        database_id: &str,
        host: &str,
        port: u16,
    ) -> BridgeResult<()> {
        let key = Self::validated_key(app_name, database_id)?;
        if host.trim().is_empty() {
            return Err(invalid_argument("Emulator hosts must not be empty"));
        }

        let endpoint = EmulatorEndpoint::new(host, port);
        self.emulators_guard().insert(key.clone(), endpoint.clone());

        let existing = self.clients_guard().get(&key).cloned();
        if let Some(existing) = existing {
            log::debug!("reconnecting '{key}' to emulator {host}:{port}");
            let settings = existing.settings().clone().with_emulator(endpoint);
            let rebuilt = self.build_client(&key, settings);
            self.clients_guard().insert(key, rebuilt);
        }
        Ok(())
    }

    /// Reconstructs the handle with explicit settings, replacing any cached
    /// one. A previously recorded emulator endpoint is preserved unless the
    /// settings carry their own.
    pub fn configure_settings(
        &self,
        app_name: &str,
        database_id: &str,
        settings: ClientSettings,
    ) -> BridgeResult<StoreClient> {
        let key = Self::validated_key(app_name, database_id)?;
        let settings = self.settings_with_recorded_emulator(&key, settings);
        let client = self.build_client(&key, settings);
        self.clients_guard().insert(key, client.clone());
        Ok(client)
    }

    /// Closes the handle for the key. Every outstanding clone of the handle
    /// is invalidated; the next `get_instance` builds a fresh one.
    pub fn terminate(&self, app_name: &str, database_id: &str) -> BridgeResult<()> {
        let key = Self::validated_key(app_name, database_id)?;
        if let Some(client) = self.clients_guard().remove(&key) {
            client.mark_terminated();
        }
        self.datastores_guard().remove(&key);
        Ok(())
    }

    fn settings_with_recorded_emulator(
        &self,
        key: &InstanceKey,
        settings: ClientSettings,
    ) -> ClientSettings {
        if settings.emulator().is_some() {
            return settings;
        }
        match self.emulators_guard().get(key) {
            Some(endpoint) => settings.with_emulator(endpoint.clone()),
            None => settings,
        }
    }

    fn build_client(&self, key: &InstanceKey, settings: ClientSettings) -> StoreClient {
        let datastore = {
            let mut datastores = self.datastores_guard();
            match datastores.get(key) {
                Some(datastore) => Arc::clone(datastore),
                None => {
                    let datastore = (self.factory)(key, &settings);
                    datastores.insert(key.clone(), Arc::clone(&datastore));
                    datastore
                }
            }
        };
        StoreClient::new(key.app_name(), key.database_id(), settings, datastore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SetOptions;
    use crate::value::StoreValue;
    use std::collections::BTreeMap;

    #[test]
    fn get_instance_is_memoized() {
        let registry = InstanceRegistry::new();
        let first = registry.get_instance("app", "(default)").unwrap();
        let second = registry.get_instance("app", "(default)").unwrap();
        assert!(Arc::ptr_eq(&first.datastore(), &second.datastore()));
    }

    #[test]
    fn empty_database_id_maps_to_default() {
        let registry = InstanceRegistry::new();
        let client = registry.get_instance("app", "").unwrap();
        assert_eq!(client.database_id(), DEFAULT_DATABASE_ID);
    }

    #[test]
    fn emulator_recorded_before_first_use_applies_at_construction() {
        let registry = InstanceRegistry::new();
        registry
            .configure_emulator("app", "(default)", "localhost", 8080)
            .unwrap();
        let client = registry.get_instance("app", "(default)").unwrap();
        let endpoint = client.settings().emulator().expect("emulator endpoint");
        assert_eq!(endpoint.host(), "localhost");
        assert_eq!(endpoint.port(), 8080);
    }

    #[test]
    fn emulator_recorded_after_construction_rebuilds_the_handle() {
        let registry = InstanceRegistry::new();
        let before = registry.get_instance("app", "(default)").unwrap();
        assert!(before.settings().emulator().is_none());

        registry
            .configure_emulator("app", "(default)", "127.0.0.1", 9099)
            .unwrap();
        let after = registry.get_instance("app", "(default)").unwrap();
        assert_eq!(
            after.settings().emulator().map(|e| e.port()),
            Some(9099)
        );
        // Both handles keep talking to the same backing datastore.
        assert!(Arc::ptr_eq(&before.datastore(), &after.datastore()));
    }

    #[tokio::test]
    async fn terminate_invalidates_outstanding_handles() {
        let registry = InstanceRegistry::new();
        let stale = registry.get_instance("app", "(default)").unwrap();
        registry.terminate("app", "(default)").unwrap();

        let err = stale.get_doc("users/ada").await.unwrap_err();
        assert_eq!(err.code_str(), "failed-precondition");

        let fresh = registry.get_instance("app", "(default)").unwrap();
        fresh
            .set_doc(
                "users/ada",
                BTreeMap::from([("name".to_string(), StoreValue::from_string("Ada"))]),
                SetOptions::overwrite(),
            )
            .await
            .unwrap();
    }

    #[test]
    fn settings_reconstruction_preserves_recorded_emulator() {
        let registry = InstanceRegistry::new();
        registry
            .configure_emulator("app", "(default)", "localhost", 8080)
            .unwrap();
        let client = registry
            .configure_settings("app", "(default)", ClientSettings::default())
            .unwrap();
        assert!(client.settings().emulator().is_some());
    }

    #[test]
    fn blank_app_names_are_rejected() {
        let registry = InstanceRegistry::new();
        let err = registry.get_instance("  ", "(default)").unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }
}
