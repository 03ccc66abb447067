//! Hub assembly: one owner for the bus, the connection registry, the
//! state store, and the module registry.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use station_bus::EventBus;
use station_core::ids::ClientId;
use station_core::protocol::update_event;
use station_modules::{FsModuleSource, ModuleRegistry, ModuleSource};
use station_store::{CollectionStore, JsonStore, MemoryStore, StateStore, UpdateFanout};

use crate::config::{StationConfig, StorageBackend};
use crate::websocket::broadcast::BroadcastManager;

/// Everything a running hub owns. One instance per process, shared with
/// the WebSocket layer behind an `Arc`; nothing here is global.
pub struct StationHub {
    bus: Arc<EventBus>,
    broadcasts: Arc<BroadcastManager>,
    state: Arc<StateStore>,
    modules: Arc<ModuleRegistry>,
    entities: HashSet<String>,
}

impl StationHub {
    /// Start assembling a hub.
    #[must_use]
    pub fn builder() -> StationHubBuilder {
        StationHubBuilder::default()
    }

    /// Assemble a hub from loaded configuration.
    pub async fn from_config(config: &StationConfig) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn CollectionStore> = match config.data.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Json => Arc::new(JsonStore::open(&config.data.dir).await?),
        };
        Ok(Self::builder()
            .store(store)
            .module_source(Arc::new(FsModuleSource::new(&config.modules.dir)))
            .entities(config.data.entities.iter().cloned())
            .build())
    }

    /// The server-side event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The connection registry.
    #[must_use]
    pub fn broadcasts(&self) -> &Arc<BroadcastManager> {
        &self.broadcasts
    }

    /// The snapshot owner.
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// The module cache.
    #[must_use]
    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    /// Whether data events for `entity` reach the state store. An empty
    /// allowlist accepts every entity.
    #[must_use]
    pub fn is_entity(&self, entity: &str) -> bool {
        self.entities.is_empty() || self.entities.contains(entity)
    }
}

/// Builder for [`StationHub`].
#[derive(Default)]
pub struct StationHubBuilder {
    store: Option<Arc<dyn CollectionStore>>,
    source: Option<Arc<dyn ModuleSource>>,
    entities: Vec<String>,
}

impl StationHubBuilder {
    /// Use this storage backend (defaults to [`MemoryStore`]).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CollectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this module source (defaults to `modules/` on disk).
    #[must_use]
    pub fn module_source(mut self, source: Arc<dyn ModuleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Accept mutations for these entity names.
    #[must_use]
    pub fn entities(mut self, entities: impl IntoIterator<Item = String>) -> Self {
        self.entities.extend(entities);
        self
    }

    /// Assemble the hub.
    #[must_use]
    pub fn build(self) -> Arc<StationHub> {
        let broadcasts = Arc::new(BroadcastManager::new());
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FsModuleSource::new("modules")));
        let fanout = Arc::new(SnapshotFanout {
            broadcasts: broadcasts.clone(),
        });
        Arc::new(StationHub {
            bus: Arc::new(EventBus::new()),
            state: Arc::new(StateStore::new(store, fanout)),
            modules: Arc::new(ModuleRegistry::new(source)),
            entities: self.entities.into_iter().collect(),
            broadcasts,
        })
    }
}

/// Routes state-store snapshots into the broadcast registry, excluding
/// the originating connection.
struct SnapshotFanout {
    broadcasts: Arc<BroadcastManager>,
}

#[async_trait]
impl UpdateFanout for SnapshotFanout {
    async fn publish(&self, entity: &str, snapshot: &[Value], origin: &ClientId) {
        self.broadcasts.broadcast_except(
            origin,
            &update_event(entity),
            &Value::Array(snapshot.to_vec()),
        );
    }
}
