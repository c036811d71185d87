use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;

use crate::proto::gnmi;
use crate::proto::gnmi_dialout::g_nmi_dial_out_server::GNmiDialOut;
use crate::proto::gnmi_dialout::PublishResponse;
use crate::utils::now_nanos;

/// A collector-side `Publish` implementation: forwards every received
/// notification into a channel and acknowledges it. Backs the dial-out
/// test-harness server and the integration tests.
pub struct DialOutCollector {
    forward: mpsc::Sender<gnmi::SubscribeResponse>,
}

impl DialOutCollector {
    /// Builds a collector plus the receiving end of its forward channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<gnmi::SubscribeResponse>) {
        let (forward, received) = mpsc::channel(capacity);
        (Self { forward }, received)
    }
}

#[tonic::async_trait]
impl GNmiDialOut for DialOutCollector {
    type PublishStream = ReceiverStream<Result<PublishResponse, Status>>;

    async fn publish(
        &self,
        request: Request<Streaming<gnmi::SubscribeResponse>>,
    ) -> Result<Response<Self::PublishStream>, Status> {
        let peer = request
            .remote_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        debug!("publisher {peer} connected");

        let mut inbound = request.into_inner();
        let forward = self.forward.clone();
        let (ack_tx, ack_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(message)) => {
                        if forward.send(message).await.is_err() {
                            break;
                        }
                        // unidirectional publishers never read these
                        let _ = ack_tx.try_send(Ok(PublishResponse {
                            timestamp: now_nanos(),
                        }));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("publisher {peer} stream error: {e}");
                        break;
                    }
                }
            }
            debug!("publisher {peer} disconnected");
        });

        Ok(Response::new(ReceiverStream::new(ack_rx)))
    }
}
