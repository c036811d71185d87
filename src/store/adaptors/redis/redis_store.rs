use std::sync::Arc;

use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::warn;

use crate::config::StoreConfig;
use crate::errors::StoreError;
use crate::store::subscription::EVENT_CHANNEL_CAPACITY;
use crate::store::FieldMap;
use crate::store::KeyspaceEvent;
use crate::store::KeyspaceSubscription;
use crate::store::MutationOp;
use crate::store::StoreConnector;
use crate::store::StoreDescriptor;
use crate::Result;

/// Redis-backed store connector: one multiplexed connection per logical
/// store, shared by all tasks, plus a dedicated pubsub connection per
/// keyspace subscription.
pub struct RedisStore {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
    db_id: u32,
}

impl RedisStore {
    /// Connects to the configured server, selecting the store's database.
    pub async fn connect(cfg: &StoreConfig, descriptor: &StoreDescriptor) -> Result<Arc<Self>> {
        let url = if cfg.use_local_tcp {
            format!("redis://{}/{}", cfg.tcp_address, descriptor.db_id)
        } else {
            format!(
                "redis+unix://{}?db={}",
                cfg.unix_socket_path, descriptor.db_id
            )
        };

        let client = redis::Client::open(url.as_str()).map_err(|e| StoreError::ConnectError {
            target: descriptor.name.clone(),
            detail: e.to_string(),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectError {
                target: descriptor.name.clone(),
                detail: e.to_string(),
            })?;
        debug!("Connected store {} via {}", descriptor.name, url);

        Ok(Arc::new(Self {
            client,
            conn,
            db_id: descriptor.db_id,
        }))
    }
}

#[async_trait]
impl StoreConnector for RedisStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await.map_err(StoreError::Redis)?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await.map_err(StoreError::Redis)?)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await.map_err(StoreError::Redis)?)
    }

    async fn hgetall(&self, key: &str) -> Result<FieldMap> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await.map_err(StoreError::Redis)?)
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hkeys(key).await.map_err(StoreError::Redis)?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<KeyspaceSubscription> {
        let channel_prefix = format!("__keyspace@{}__:", self.db_id);
        let channel_pattern = format!("{channel_prefix}{pattern}");

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(StoreError::Redis)?;
        pubsub
            .psubscribe(&channel_pattern)
            .await
            .map_err(StoreError::Redis)?;
        debug!("psubscribe {channel_pattern}");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    msg = stream.next() => {
                        let Some(msg) = msg else { break };
                        let channel = msg.get_channel_name().to_string();
                        let Some(key) = channel.strip_prefix(&channel_prefix) else {
                            warn!("unexpected notification channel {channel}");
                            continue;
                        };
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                warn!("notification payload decode failed: {e}");
                                continue;
                            }
                        };
                        let Some(op) = MutationOp::parse(&payload) else {
                            debug!("ignoring notification op {payload} for {key}");
                            continue;
                        };
                        let event = KeyspaceEvent { key: key.to_string(), op };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(KeyspaceSubscription::new(rx, cancel))
    }
}
