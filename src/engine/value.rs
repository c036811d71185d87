use tonic::Status;

use crate::proto::gnmi;
use crate::utils::now_nanos;

/// What a queue entry carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// A resolved path with its current value
    Update {
        path: gnmi::Path,
        value: gnmi::TypedValue,
    },
    /// Every initially-known value has been delivered once
    Sync,
    /// The producing watcher hit an unrecoverable condition
    Fatal(String),
}

/// A timestamped envelope travelling through the subscription queue.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryValue {
    /// Source timestamp in nanoseconds
    pub timestamp: i64,
    pub prefix: Option<gnmi::Path>,
    pub kind: ValueKind,
}

impl TelemetryValue {
    pub fn update(prefix: Option<gnmi::Path>, path: gnmi::Path, value: gnmi::TypedValue) -> Self {
        Self {
            timestamp: now_nanos(),
            prefix,
            kind: ValueKind::Update { path, value },
        }
    }

    pub fn sync() -> Self {
        Self {
            timestamp: now_nanos(),
            prefix: None,
            kind: ValueKind::Sync,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            timestamp: now_nanos(),
            prefix: None,
            kind: ValueKind::Fatal(message.into()),
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self.kind, ValueKind::Sync)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ValueKind::Fatal(_))
    }

    /// Converts to the wire response. Fatal markers become the
    /// stream-terminating status instead of a message.
    pub fn into_response(self) -> std::result::Result<gnmi::SubscribeResponse, Status> {
        match self.kind {
            ValueKind::Sync => Ok(gnmi::SubscribeResponse {
                response: Some(gnmi::subscribe_response::Response::SyncResponse(true)),
            }),
            ValueKind::Fatal(message) => Err(Status::aborted(message)),
            ValueKind::Update { path, value } => Ok(gnmi::SubscribeResponse {
                response: Some(gnmi::subscribe_response::Response::Update(
                    gnmi::Notification {
                        timestamp: self.timestamp,
                        prefix: self.prefix,
                        update: vec![gnmi::Update {
                            path: Some(path),
                            val: Some(value),
                            duplicates: 0,
                        }],
                        delete: Vec::new(),
                    },
                )),
            }),
        }
    }
}
