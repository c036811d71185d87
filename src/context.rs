use std::sync::Arc;

use crate::config::EngineConfig;
use crate::config::StoreConfig;
use crate::namemaps::NameMaps;
use crate::nonstore::NonStoreProvider;
use crate::store::StoreRegistry;
use crate::Result;

/// Process-scoped context threaded through every constructor: the store
/// registry, the name maps, the non-store provider and engine tuning. Built
/// once at startup; tests build their own over the memory adaptor.
pub struct TelemetryContext {
    registry: Arc<StoreRegistry>,
    maps: NameMaps,
    nonstore: NonStoreProvider,
    engine: EngineConfig,
}

impl TelemetryContext {
    pub fn new(registry: Arc<StoreRegistry>, engine: EngineConfig) -> Arc<Self> {
        let maps = NameMaps::new(registry.clone());
        Arc::new(Self {
            registry,
            maps,
            nonstore: NonStoreProvider::new(),
            engine,
        })
    }

    /// Opens the redis-backed registry and wraps it.
    pub async fn open(store: &StoreConfig, engine: EngineConfig) -> Result<Arc<Self>> {
        let registry = Arc::new(StoreRegistry::open_redis(store).await?);
        Ok(Self::new(registry, engine))
    }

    /// Context over in-memory stores, for tests and embedders.
    pub fn memory() -> Arc<Self> {
        Self::new(Arc::new(StoreRegistry::memory()), EngineConfig::default())
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    pub fn maps(&self) -> &NameMaps {
        &self.maps
    }

    pub fn nonstore(&self) -> &NonStoreProvider {
        &self.nonstore
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }
}
