//! Telemetry Service Error Hierarchy
//!
//! Error types for the streaming-telemetry data plane, categorized by the
//! layer that raises them, with a single conversion point onto gRPC status
//! codes at the RPC boundary.

use config::ConfigError;
use tonic::Status;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backing key/value store access failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Request path resolution failures
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Subscription engine failures
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Dial-out publisher configuration failures
    #[error(transparent)]
    DialOut(#[from] DialOutError),

    /// Unrecoverable failures requiring the subscription to terminate
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// A gRPC status surfaced by a downstream call
    #[error(transparent)]
    Rpc(#[from] Status),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connector could not be established at startup
    #[error("Store connect failed for {target}: {detail}")]
    ConnectError { target: String, detail: String },

    /// A single store operation failed
    #[error("Store op {op} failed for {key}: {detail}")]
    Op {
        op: &'static str,
        key: String,
        detail: String,
    },

    /// Keyspace notification channel torn down while a receiver was pending
    #[error("Keyspace subscription closed")]
    SubscriptionClosed,

    /// Target name not present in the store registry
    #[error("Invalid target name {0}")]
    UnknownTarget(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Empty path")]
    EmptyPath,

    #[error("Empty target")]
    EmptyTarget,

    #[error("Invalid db table path {0}")]
    InvalidPath(String),

    #[error("No valid entry found on {path} with key {key}")]
    NoSuchEntry { path: String, key: String },

    #[error("{port} not a valid interface, vendor alias is {alias}")]
    UnknownPort { port: String, alias: String },

    #[error("{0} not a valid queue name, use format 'Queue<n>'")]
    InvalidQueueName(String),

    #[error("Key {0} not present in counters queue name map")]
    MissingQueueOid(String),

    #[error("{0} has no matching counter fields")]
    NoMatchingFields(String),

    /// Write path rejected by the allow-list
    #[error("Config write to {0} not supported")]
    WriteNotPermitted(String),

    /// Write payload shape does not match the allow-list entry
    #[error("Unexpected value shape for {path}: {detail}")]
    ValueShape { path: String, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("On-change subscription not supported for {0}")]
    OnChangeUnsupported(String),

    #[error("Sample interval {requested_ms}ms below supported minimum {minimum_ms}ms")]
    IntervalTooSmall { requested_ms: u64, minimum_ms: u64 },

    #[error("Subscription contains no subscription entries")]
    EmptyList,

    /// Output queue closed underneath a producing watcher
    #[error("Value queue closed")]
    QueueClosed,

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DialOutError {
    #[error("Destination group {0} not defined")]
    UnknownDestinationGroup(String),

    #[error("Subscription {name} invalid: {detail}")]
    InvalidSubscription { name: String, detail: String },

    #[error("Destination group {0} has no destination addresses")]
    EmptyDestinationGroup(String),
}

impl Error {
    /// Maps an error onto the gRPC status the frontend reports.
    ///
    /// Unknown targets, malformed paths and missing entries are `not_found`;
    /// allow-list and capability gaps are `unimplemented`; everything else
    /// surfaces as `internal`.
    pub fn to_status(&self) -> Status {
        match self {
            Error::Store(StoreError::UnknownTarget(t)) => {
                Status::not_found(format!("invalid target name {t}"))
            }
            Error::Resolve(ResolveError::WriteNotPermitted(p)) => {
                Status::unimplemented(format!("config write to {p} not supported"))
            }
            Error::Resolve(e) => Status::not_found(e.to_string()),
            Error::Subscribe(SubscribeError::UnsupportedEncoding(e)) => {
                Status::unimplemented(format!("unsupported encoding: {e}"))
            }
            Error::Subscribe(e) => Status::invalid_argument(e.to_string()),
            Error::Store(e) => Status::not_found(e.to_string()),
            Error::Fatal(msg) => Status::aborted(msg.clone()),
            e => Status::internal(e.to_string()),
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        e.to_status()
    }
}
