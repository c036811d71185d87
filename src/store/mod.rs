//! Uniform access to the logical stores on the backing key/value server.
//!
//! Every consumer goes through the [`StoreConnector`] trait so the engine and
//! resolver are independent of the concrete backend. The production adaptor
//! speaks to a redis server; the memory adaptor backs every test.

pub mod adaptors;
mod pattern;
mod registry;
mod subscription;

pub use pattern::glob_match;
pub use registry::*;
pub use subscription::*;

use std::collections::HashMap;

use tonic::async_trait;

use crate::Result;

/// Field name to value mapping of one hash entry.
pub type FieldMap = HashMap<String, String>;

/// Uniform store operations.
///
/// Implementations are shared between many concurrent tasks and must be safe
/// for concurrent use; connectors are created once at process start and never
/// mutated afterwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Lists keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Reads one field of a hash; `None` when the field or key is absent.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Reads all fields of a hash; empty when the key is absent.
    async fn hgetall(&self, key: &str) -> Result<FieldMap>;

    /// Lists the field names of a hash.
    async fn hkeys(&self, key: &str) -> Result<Vec<String>>;

    /// Writes one field of a hash.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Deletes one field of a hash.
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;

    /// Subscribes to keyspace-change notifications for keys matching a glob
    /// pattern. The returned handle delivers `(key, operation)` events until
    /// closed.
    async fn psubscribe(&self, pattern: &str) -> Result<KeyspaceSubscription>;
}

/// The mutation kinds a keyspace notification can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    HSet,
    HMSet,
    HSetNx,
    HDel,
    Del,
}

impl MutationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOp::HSet => "hset",
            MutationOp::HMSet => "hmset",
            MutationOp::HSetNx => "hsetnx",
            MutationOp::HDel => "hdel",
            MutationOp::Del => "del",
        }
    }

    /// Parses a notification payload; unknown operations are ignored by
    /// watchers, hence `None`.
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            "hset" => Some(MutationOp::HSet),
            "hmset" => Some(MutationOp::HMSet),
            "hsetnx" => Some(MutationOp::HSetNx),
            "hdel" => Some(MutationOp::HDel),
            "del" => Some(MutationOp::Del),
            _ => None,
        }
    }

    /// True for operations that add or overwrite fields.
    pub fn is_set(&self) -> bool {
        matches!(self, MutationOp::HSet | MutationOp::HMSet | MutationOp::HSetNx)
    }
}

/// One keyspace-change notification: the mutated key and the operation.
#[derive(Debug, Clone)]
pub struct KeyspaceEvent {
    pub key: String,
    pub op: MutationOp,
}
