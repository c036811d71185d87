use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::store::adaptors::mem::MemoryStore;
use crate::store::adaptors::redis::RedisStore;
use crate::store::StoreConnector;
use crate::Result;

/// The pseudo target that routes to the non-store provider. It owns no
/// connector and is absent from the registry.
pub const NON_DB_TARGET: &str = "OTHERS";

/// The logical stores on the backing server. Names and numeric identifiers
/// are part of the external contract.
const STORE_TABLE: [(&str, u32); 8] = [
    ("APPL_DB", 0),
    ("ASIC_DB", 1),
    ("COUNTERS_DB", 2),
    ("LOGLEVEL_DB", 3),
    ("CONFIG_DB", 4),
    ("PFC_WD_DB", 5),
    ("FLEX_COUNTER_DB", 5),
    ("STATE_DB", 6),
];

/// A named logical store: numeric identifier plus key-part separator.
#[derive(Debug, Clone)]
pub struct StoreDescriptor {
    pub name: String,
    pub db_id: u32,
    pub separator: char,
}

impl StoreDescriptor {
    fn new(name: &str, db_id: u32) -> Self {
        // Configuration-like stores join key parts with '|'.
        let separator = match name {
            "CONFIG_DB" | "STATE_DB" => '|',
            _ => ':',
        };
        Self {
            name: name.to_string(),
            db_id,
            separator,
        }
    }
}

/// A descriptor paired with its long-lived connector.
#[derive(Clone)]
pub struct StoreHandle {
    pub descriptor: StoreDescriptor,
    pub connector: Arc<dyn StoreConnector>,
}

/// Process-scoped map from target name to store handle.
///
/// Built once at startup and shared read-only afterwards; passing it
/// explicitly into every constructor keeps tests deterministic.
pub struct StoreRegistry {
    stores: HashMap<String, StoreHandle>,
}

impl StoreRegistry {
    /// Opens one redis connector per logical store.
    pub async fn open_redis(cfg: &StoreConfig) -> Result<Self> {
        let mut stores = HashMap::new();
        for (name, db_id) in STORE_TABLE {
            let descriptor = StoreDescriptor::new(name, db_id);
            let connector = RedisStore::connect(cfg, &descriptor).await?;
            stores.insert(
                name.to_string(),
                StoreHandle {
                    descriptor,
                    connector,
                },
            );
        }
        info!("Opened {} store connectors", stores.len());
        Ok(Self { stores })
    }

    /// Builds a registry over in-memory stores. Stores sharing a numeric
    /// identifier share backing data, matching the server's db layout.
    pub fn memory() -> Self {
        let mut by_id: HashMap<u32, Arc<MemoryStore>> = HashMap::new();
        let mut stores = HashMap::new();
        for (name, db_id) in STORE_TABLE {
            let backing = by_id
                .entry(db_id)
                .or_insert_with(MemoryStore::new)
                .clone();
            stores.insert(
                name.to_string(),
                StoreHandle {
                    descriptor: StoreDescriptor::new(name, db_id),
                    connector: backing as Arc<dyn StoreConnector>,
                },
            );
        }
        Self { stores }
    }

    /// Builds a registry from explicit handles. Embedders and tests use this
    /// to splice in custom connectors.
    pub fn from_handles(handles: impl IntoIterator<Item = StoreHandle>) -> Self {
        Self {
            stores: handles
                .into_iter()
                .map(|h| (h.descriptor.name.clone(), h))
                .collect(),
        }
    }

    pub fn get(&self, target: &str) -> Result<&StoreHandle> {
        self.stores
            .get(target)
            .ok_or_else(|| StoreError::UnknownTarget(target.to_string()).into())
    }

    pub fn connector(&self, target: &str) -> Result<Arc<dyn StoreConnector>> {
        Ok(self.get(target)?.connector.clone())
    }

    /// Whether `target` names a real store (the non-store target is not one).
    pub fn is_valid_target(&self, target: &str) -> bool {
        self.stores.contains_key(target)
    }

    pub fn separator(&self, target: &str) -> Result<char> {
        Ok(self.get(target)?.descriptor.separator)
    }

    pub fn db_id(&self, target: &str) -> Result<u32> {
        Ok(self.get(target)?.descriptor.db_id)
    }
}
