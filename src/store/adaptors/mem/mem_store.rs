use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::trace;

use crate::store::glob_match;
use crate::store::subscription::EVENT_CHANNEL_CAPACITY;
use crate::store::FieldMap;
use crate::store::KeyspaceEvent;
use crate::store::KeyspaceSubscription;
use crate::store::MutationOp;
use crate::store::StoreConnector;
use crate::Result;

/// Capacity of the fan-out ring for keyspace events. Subscribers that lag
/// this far behind lose events, like a real keyspace-notification channel.
const BROADCAST_CAPACITY: usize = 1024;

/// In-memory store: a hash of hashes with keyspace-event fan-out.
///
/// Backs every test; also usable by embedders that want the engine without a
/// key/value server.
pub struct MemoryStore {
    data: RwLock<HashMap<String, FieldMap>>,
    events: broadcast::Sender<KeyspaceEvent>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            data: RwLock::new(HashMap::new()),
            events,
        })
    }

    /// Replaces a whole hash in one step, emitting a single `hmset` event.
    /// Test seeding helper and `hmset` stand-in.
    pub fn load_hash<K, F, V>(&self, key: K, fields: impl IntoIterator<Item = (F, V)>)
    where
        K: Into<String>,
        F: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let fv: FieldMap = fields
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .collect();
        self.data.write().insert(key.clone(), fv);
        self.emit(key, MutationOp::HMSet);
    }

    /// Deletes a key outright, emitting `del`.
    pub fn del(&self, key: &str) {
        if self.data.write().remove(key).is_some() {
            self.emit(key.to_string(), MutationOp::Del);
        }
    }

    fn emit(&self, key: String, op: MutationOp) {
        // No receivers is fine; events only matter to active subscriptions.
        let _ = self.events.send(KeyspaceEvent { key, op });
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .data
            .read()
            .get(key)
            .and_then(|fv| fv.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<FieldMap> {
        Ok(self.data.read().get(key).cloned().unwrap_or_default())
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut fields: Vec<String> = self
            .data
            .read()
            .get(key)
            .map(|fv| fv.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        Ok(fields)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.data
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self.emit(key.to_string(), MutationOp::HSet);
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let emptied = {
            let mut data = self.data.write();
            match data.get_mut(key) {
                Some(fv) => {
                    fv.remove(field);
                    let emptied = fv.is_empty();
                    if emptied {
                        data.remove(key);
                    }
                    Some(emptied)
                }
                None => None,
            }
        };
        match emptied {
            Some(true) => {
                // Removing the last field drops the key, like the real server.
                self.emit(key.to_string(), MutationOp::HDel);
                self.emit(key.to_string(), MutationOp::Del);
            }
            Some(false) => self.emit(key.to_string(), MutationOp::HDel),
            None => {}
        }
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<KeyspaceSubscription> {
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let pattern = pattern.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) if glob_match(&pattern, &event.key) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            trace!("keyspace subscription lagged by {n} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(KeyspaceSubscription::new(rx, cancel))
    }
}
