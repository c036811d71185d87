use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;
use tracing::warn;

use crate::context::TelemetryContext;
use crate::engine::StreamEntry;
use crate::engine::SubscriptionEngine;
use crate::engine::ValueReceiver;
use crate::proto::gnmi;

/// Capacity of the wire-side response channel; small, the queue behind it
/// is the real buffer.
const RESPONSE_CHANNEL_CAPACITY: usize = 16;

/// The response stream type Subscribe returns.
pub type SubscribeStream = ReceiverStream<std::result::Result<gnmi::SubscribeResponse, Status>>;

/// One client's Subscribe call: an engine, its queue, and the drain onto
/// the wire. Cancelling the token tears all of it down.
pub struct ClientSession {
    cancel: CancellationToken,
}

impl ClientSession {
    /// Starts a session for a decoded subscription list.
    pub fn start(
        ctx: Arc<TelemetryContext>,
        list: gnmi::SubscriptionList,
        mut requests: Streaming<gnmi::SubscribeRequest>,
    ) -> std::result::Result<(Self, SubscribeStream), Status> {
        let mode = gnmi::subscription_list::Mode::try_from(list.mode)
            .map_err(|_| Status::invalid_argument("unknown subscription list mode"))?;

        let cancel = CancellationToken::new();
        let engine = Arc::new(SubscriptionEngine::new(ctx, list.prefix.clone()));
        let (queue_tx, queue_rx) = engine.queue();
        let (out_tx, out_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);

        let paths: Vec<gnmi::Path> = list
            .subscription
            .iter()
            .filter_map(|s| s.path.clone())
            .collect();
        if paths.is_empty() {
            return Err(Status::invalid_argument(
                "subscription list contains no paths",
            ));
        }

        match mode {
            gnmi::subscription_list::Mode::Once => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    match engine.get(&paths).await {
                        Ok(values) => {
                            for value in values {
                                if queue_tx.put(value).await.is_err() {
                                    return;
                                }
                            }
                            let _ = queue_tx.put_sync().await;
                        }
                        Err(e) => queue_tx.put_fatal(e.to_string()).await,
                    }
                });
            }
            gnmi::subscription_list::Mode::Poll => {
                let (poll_tx, poll_rx) = mpsc::channel(1);
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.poll_run(paths, queue_tx, poll_rx).await;
                });
                let cancel_reader = cancel.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel_reader.cancelled() => break,
                            message = requests.message() => match message {
                                Ok(Some(request)) => {
                                    if matches!(
                                        request.request,
                                        Some(gnmi::subscribe_request::Request::Poll(_))
                                    ) && poll_tx.send(()).await.is_err()
                                    {
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    debug!("poll request stream error: {e}");
                                    break;
                                }
                            },
                        }
                    }
                    // dropping poll_tx closes the trigger and ends poll_run
                    cancel_reader.cancel();
                });
            }
            gnmi::subscription_list::Mode::Stream => {
                let entries = stream_entries(&list)?;
                let engine = engine.clone();
                let cancel_run = cancel.clone();
                tokio::spawn(async move {
                    engine.stream_run(entries, queue_tx, cancel_run).await;
                });
                // watch for client disconnect
                let cancel_reader = cancel.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel_reader.cancelled() => break,
                            message = requests.message() => match message {
                                Ok(Some(_)) => continue,
                                Ok(None) | Err(_) => {
                                    debug!("client closed the request stream");
                                    cancel_reader.cancel();
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        }

        tokio::spawn(drain_queue(queue_rx, out_tx, cancel.clone()));

        Ok((Self { cancel }, ReceiverStream::new(out_rx)))
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A handle that resolves when the session winds down.
    pub fn done_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Moves values from the engine queue onto the wire. A fatal marker becomes
/// the terminating status; a disappearing wire cancels the session.
async fn drain_queue(
    mut queue_rx: ValueReceiver,
    out_tx: mpsc::Sender<std::result::Result<gnmi::SubscribeResponse, Status>>,
    cancel: CancellationToken,
) {
    while let Some(value) = queue_rx.get().await {
        match value.into_response() {
            Ok(response) => {
                if out_tx.send(Ok(response)).await.is_err() {
                    debug!("response stream gone, cancelling session");
                    cancel.cancel();
                    return;
                }
            }
            Err(status) => {
                warn!("subscription terminated: {status}");
                let _ = out_tx.send(Err(status)).await;
                cancel.cancel();
                return;
            }
        }
    }
    cancel.cancel();
}

/// Decodes the subscription list into engine stream entries.
fn stream_entries(
    list: &gnmi::SubscriptionList,
) -> std::result::Result<Vec<StreamEntry>, Status> {
    let mut entries = Vec::with_capacity(list.subscription.len());
    for subscription in &list.subscription {
        let Some(path) = subscription.path.clone() else {
            continue;
        };
        let mode = gnmi::SubscriptionMode::try_from(subscription.mode)
            .map_err(|_| Status::invalid_argument("unknown subscription mode"))?;
        entries.push(StreamEntry {
            path,
            mode,
            sample_interval_ns: subscription.sample_interval,
        });
    }
    Ok(entries)
}

/// Validates the encoding of a request; only the JSON flavors are served.
pub fn check_encoding(encoding: i32) -> std::result::Result<(), Status> {
    match gnmi::Encoding::try_from(encoding) {
        Ok(gnmi::Encoding::Json) | Ok(gnmi::Encoding::JsonIetf) => Ok(()),
        Ok(other) => Err(Status::unimplemented(format!(
            "unsupported encoding: {}",
            other.as_str_name()
        ))),
        Err(_) => Err(Status::unimplemented("unsupported encoding")),
    }
}

/// Extracts and validates the target-bearing prefix of a request.
pub fn require_target(prefix: Option<&gnmi::Path>) -> std::result::Result<&gnmi::Path, Status> {
    let prefix =
        prefix.ok_or_else(|| Status::unimplemented("No target specified in prefix"))?;
    if prefix.target.is_empty() {
        return Err(Status::unimplemented("Empty target data not supported"));
    }
    Ok(prefix)
}

