use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;
use tracing::info;

use crate::errors::ResolveError;
use crate::store::StoreRegistry;
use crate::Result;

/// Mutually inverse vendor-alias translation maps.
#[derive(Debug, Default, Clone)]
pub struct AliasMaps {
    /// vendor alias -> interface name
    pub alias_to_name: HashMap<String, String>,
    /// interface name -> vendor alias
    pub name_to_alias: HashMap<String, String>,
}

impl AliasMaps {
    /// Translates a vendor alias to the interface name; unmatched names pass
    /// through unchanged.
    pub fn to_name<'a>(&'a self, alias: &'a str) -> &'a str {
        self.alias_to_name.get(alias).map_or(alias, |s| s.as_str())
    }

    /// Translates an interface name to its vendor alias; unmatched names pass
    /// through unchanged.
    pub fn to_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.name_to_alias.get(name).map_or(name, |s| s.as_str())
    }
}

/// port -> (composite queue key -> oid), composite key `<port><sep><index>`.
pub type QueueOidMap = HashMap<String, HashMap<String, String>>;

/// Lazily-initialized lookup maps shared by the resolvers.
pub struct NameMaps {
    registry: Arc<StoreRegistry>,
    port_oid: OnceCell<HashMap<String, String>>,
    queue_oid: OnceCell<QueueOidMap>,
    alias: OnceCell<AliasMaps>,
    pfcwd_queue: OnceCell<QueueOidMap>,
}

impl NameMaps {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            registry,
            port_oid: OnceCell::new(),
            queue_oid: OnceCell::new(),
            alias: OnceCell::new(),
            pfcwd_queue: OnceCell::new(),
        }
    }

    /// port name -> oid, from `COUNTERS_PORT_NAME_MAP`.
    pub async fn port_oid_map(&self) -> Result<&HashMap<String, String>> {
        self.port_oid
            .get_or_try_init(|| async {
                let map = self.counters_map("COUNTERS_PORT_NAME_MAP").await?;
                info!("loaded {} entries from COUNTERS_PORT_NAME_MAP", map.len());
                Ok(map)
            })
            .await
    }

    /// port name -> (composite queue key -> oid), from
    /// `COUNTERS_QUEUE_NAME_MAP`.
    pub async fn queue_oid_map(&self) -> Result<&QueueOidMap> {
        self.queue_oid
            .get_or_try_init(|| async {
                let separator = self.registry.separator("COUNTERS_DB")?;
                let flat = self.counters_map("COUNTERS_QUEUE_NAME_MAP").await?;
                let mut grouped: QueueOidMap = HashMap::new();
                for (key, oid) in flat {
                    // key is `<port><sep><queue index>`
                    let port = key
                        .split(separator)
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    grouped.entry(port).or_default().insert(key, oid);
                }
                info!("loaded queue map for {} ports", grouped.len());
                Ok(grouped)
            })
            .await
    }

    /// Vendor alias translation maps from `CONFIG_DB/PORT`.
    pub async fn alias_maps(&self) -> Result<&AliasMaps> {
        self.alias
            .get_or_try_init(|| async {
                let store = self.registry.connector("CONFIG_DB")?;
                let separator = self.registry.separator("CONFIG_DB")?;
                let prefix = format!("PORT{separator}");
                let keys = store.keys(&format!("{prefix}*")).await?;

                let mut maps = AliasMaps::default();
                for key in keys {
                    let name = key[prefix.len()..].to_string();
                    match store.hget(&key, "alias").await? {
                        Some(alias) => {
                            maps.alias_to_name.insert(alias.clone(), name.clone());
                            maps.name_to_alias.insert(name, alias);
                        }
                        None => {
                            debug!("{name} has no vendor alias");
                        }
                    }
                }
                info!("loaded {} alias entries", maps.alias_to_name.len());
                Ok(maps)
            })
            .await
    }

    /// port name -> watchdog-enabled queue map, derived from
    /// `PFC_WD_TABLE`, `PORT_QOS_MAP.pfc_enable` and
    /// `MAP_PFC_PRIORITY_TO_QUEUE|AZURE`.
    ///
    /// Absent watchdog configuration yields an empty map, not an error.
    pub async fn pfcwd_queue_map(&self) -> Result<&QueueOidMap> {
        self.pfcwd_queue
            .get_or_try_init(|| async {
                let store = self.registry.connector("CONFIG_DB")?;
                let separator = self.registry.separator("CONFIG_DB")?;

                let prefix = format!("PFC_WD_TABLE{separator}");
                let wd_keys = store.keys(&format!("{prefix}*")).await?;
                if wd_keys.is_empty() {
                    debug!("PFC watchdog not enabled on device");
                    return Ok(QueueOidMap::new());
                }

                let qos_keys = store.keys("PORT_QOS_MAP*").await?;
                let Some(qos_key) = qos_keys.first() else {
                    debug!("PORT_QOS_MAP not present, PFC watchdog inactive");
                    return Ok(QueueOidMap::new());
                };
                let priorities = store
                    .hget(qos_key, "pfc_enable")
                    .await?
                    .unwrap_or_default();

                let prio_to_queue = store
                    .hgetall(&format!("MAP_PFC_PRIORITY_TO_QUEUE{separator}AZURE"))
                    .await?;

                let mut indices = Vec::new();
                for priority in priorities.split(',').filter(|p| !p.is_empty()) {
                    match prio_to_queue.get(priority) {
                        Some(queue) => indices.push(queue.clone()),
                        None => debug!("no queue mapped for PFC priority {priority}"),
                    }
                }

                let queue_map = self.queue_oid_map().await?;
                if queue_map.is_empty() {
                    debug!("COUNTERS_QUEUE_NAME_MAP is empty");
                    return Ok(QueueOidMap::new());
                }

                let queue_separator = self.registry.separator("COUNTERS_DB")?;
                let mut wd_map = QueueOidMap::new();
                for key in wd_keys {
                    let port = key[prefix.len()..].to_string();
                    let mut queues = HashMap::new();
                    for index in &indices {
                        let queue_key = format!("{port}{queue_separator}{index}");
                        let oid = queue_map
                            .get(&port)
                            .and_then(|m| m.get(&queue_key))
                            .ok_or_else(|| ResolveError::MissingQueueOid(queue_key.clone()))?;
                        queues.insert(queue_key, oid.clone());
                    }
                    wd_map.insert(port, queues);
                }
                info!("loaded watchdog queue map for {} ports", wd_map.len());
                Ok(wd_map)
            })
            .await
    }

    async fn counters_map(&self, table: &str) -> Result<HashMap<String, String>> {
        let store = self.registry.connector("COUNTERS_DB")?;
        Ok(store.hgetall(table).await?)
    }
}
