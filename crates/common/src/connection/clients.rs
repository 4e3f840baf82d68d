use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use object_store::{BlobStore, StorageBackend};
use parking_lot::Mutex;

use super::{connect, Connection};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::observer::Observer;

/// One connection per container, created on first use.
#[derive(Debug)]
pub struct ContainerClients {
    config: EngineConfig,
    observer: Arc<dyn Observer>,
    clients: Mutex<HashMap<String, Arc<dyn Connection>>>,
}

impl ContainerClients {
    pub fn new(config: EngineConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            config,
            observer,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connection for the configured default container.
    pub async fn default_container(&self) -> Result<Arc<dyn Connection>, EngineError> {
        let container = self.config.container.clone();
        self.get(&container).await
    }

    /// Connection for `container`, opening its backend if needed.
    pub async fn get(&self, container: &str) -> Result<Arc<dyn Connection>, EngineError> {
        let cached = self.clients.lock().get(container).cloned();
        if let Some(client) = cached {
            return Ok(client);
        }

        // Open outside the lock; a concurrent opener may win the insert
        let backend = self.open_backend(container).await?;
        let client = connect(&self.config, backend, self.observer.clone());
        let mut clients = self.clients.lock();
        let client = clients
            .entry(container.to_string())
            .or_insert(client)
            .clone();
        Ok(client)
    }

    /// Register a connection over an existing backend.
    pub fn insert(&self, container: &str, backend: Arc<dyn StorageBackend>) -> Arc<dyn Connection> {
        let client = connect(&self.config, backend, self.observer.clone());
        self.clients
            .lock()
            .insert(container.to_string(), client.clone());
        client
    }

    /// Names of the known containers, sorted.
    ///
    /// Covers every container opened through this cache and, for a
    /// persistent backend, every container database in the data directory.
    pub fn list_containers(&self) -> Result<Vec<String>, EngineError> {
        let mut names: BTreeSet<String> = self.clients.lock().keys().cloned().collect();

        if let Some(dir) = &self.config.storage.data_dir {
            let read_err = |e: std::io::Error| {
                EngineError::Config(format!("failed to read {}: {}", dir.display(), e))
            };
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(names.into_iter().collect())
                }
                Err(e) => return Err(read_err(e)),
            };
            for entry in entries {
                let path = entry.map_err(read_err)?.path();
                if path.extension().is_some_and(|ext| ext == "db") {
                    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                        names.insert(stem.to_string());
                    }
                }
            }
        }

        tracing::debug!(count = names.len(), "containers listed");
        Ok(names.into_iter().collect())
    }

    async fn open_backend(&self, container: &str) -> Result<Arc<dyn StorageBackend>, EngineError> {
        if container.is_empty() || container.contains('/') {
            return Err(EngineError::InvalidArgument(format!(
                "invalid container name: {:?}",
                container
            )));
        }

        let objects = self.config.storage.objects.scoped(container);
        let store = match self.config.database_path(container) {
            Some(db_path) => BlobStore::new(&db_path, objects).await?,
            None => BlobStore::in_memory(objects).await?,
        };
        tracing::info!(container = %container, "container backend opened");
        Ok(Arc::new(store.with_limits(self.config.limits)))
    }
}
