use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::controller::StorageController;
use crate::config::StorageConfig;
use crate::core::{DEFAULT_NAMESPACE, Result, StorageError, resolve_namespace};
use crate::persistence::{DiskStore, FileDiskStore};

/// Owns the single `StorageController` of every namespace
///
/// Controllers are created on first access and live as long as the registry. Creation
/// happens under the write lock, so concurrent first lookups of a name always receive the
/// same instance.
pub struct NamespaceRegistry<V> {
    disk: Arc<dyn DiskStore>,
    config: StorageConfig,
    controllers: RwLock<HashMap<String, Arc<StorageController<V>>>>,
}

impl<V> NamespaceRegistry<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Registry with unlimited-capacity, bincode-encoded namespaces over `disk`
    pub fn new(disk: Arc<dyn DiskStore>) -> Self {
        Self::with_config(disk, StorageConfig::default())
    }

    /// Registry whose namespaces take their capacity and codec from `config`
    pub fn with_config(disk: Arc<dyn DiskStore>, config: StorageConfig) -> Self {
        Self {
            disk,
            config,
            controllers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry over a `FileDiskStore` rooted at `config.data_dir`
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        config.validate()?;

        let disk = FileDiskStore::open(&config.data_dir).map_err(|e| {
            StorageError::InvalidConfig(format!(
                "cannot open data_dir {:?}: {}",
                config.data_dir, e
            ))
        })?;

        Ok(Self::with_config(Arc::new(disk), config.clone()))
    }

    /// The controller for `namespace`; `None` or `""` selects the default namespace
    pub fn controller_for(&self, namespace: Option<&str>) -> Arc<StorageController<V>> {
        let name = resolve_namespace(namespace);

        let existing = self.controllers.read().get(name).cloned();
        if let Some(controller) = existing {
            return controller;
        }

        let mut controllers = self.controllers.write();
        let controller = controllers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(self.create_controller(name)));

        Arc::clone(controller)
    }

    pub fn default_controller(&self) -> Arc<StorageController<V>> {
        self.controller_for(Some(DEFAULT_NAMESPACE))
    }

    /// Namespaces that have a controller, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.controllers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn disk(&self) -> &Arc<dyn DiskStore> {
        &self.disk
    }

    fn create_controller(&self, name: &str) -> StorageController<V> {
        let settings = self.config.settings_for(name);

        info!(
            "Creating storage controller for namespace {} (capacity={}, codec={:?})",
            name, settings.max_in_memory_capacity, settings.codec
        );

        StorageController::new(
            name.to_string(),
            Arc::clone(&self.disk),
            settings.codec.serializer(),
            settings.codec.deserializer(),
            settings.max_in_memory_capacity,
        )
    }
}
