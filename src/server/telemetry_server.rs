use std::sync::Arc;

use tokio::sync::watch;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::Server;
use tonic::transport::ServerTlsConfig;
use tracing::info;
use tracing::warn;

use crate::config::TelemetryConfig;
use crate::context::TelemetryContext;
use crate::proto::gnmi::g_nmi_server::GNmiServer;
use crate::server::AuthPolicy;
use crate::server::TelemetryService;
use crate::Error;
use crate::Result;

/// The inbound gNMI server: binds the configured listener, loads TLS
/// material unless the insecure toggle is set, and serves until the
/// shutdown signal fires.
pub struct TelemetryServer {
    ctx: Arc<TelemetryContext>,
    config: TelemetryConfig,
}

impl TelemetryServer {
    pub fn new(ctx: Arc<TelemetryContext>, config: TelemetryConfig) -> Self {
        Self { ctx, config }
    }

    pub async fn serve(self, mut shutdown: watch::Receiver<()>) -> Result<()> {
        let addr = self
            .config
            .service
            .listen_address
            .parse()
            .map_err(|e| Error::Fatal(format!("invalid listen address: {e}")))?;

        let auth = AuthPolicy::from_modes(&self.config.service.client_auth);
        let service = TelemetryService::new(self.ctx, auth);

        let mut builder = Server::builder();
        if self.config.tls.insecure {
            warn!("TLS disabled, serving plaintext; for testing only");
        } else {
            let cert = tokio::fs::read(&self.config.tls.server_certificate_path)
                .await
                .map_err(|e| Error::Fatal(format!("failed to load server certificate: {e}")))?;
            let key = tokio::fs::read(&self.config.tls.server_private_key_path)
                .await
                .map_err(|e| Error::Fatal(format!("failed to load server key: {e}")))?;
            let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));
            if !self.config.tls.client_ca_certificate_path.is_empty() {
                let ca = tokio::fs::read(&self.config.tls.client_ca_certificate_path)
                    .await
                    .map_err(|e| Error::Fatal(format!("failed to load client CA: {e}")))?;
                tls = tls.client_ca_root(Certificate::from_pem(ca));
            }
            builder = builder
                .tls_config(tls)
                .map_err(|e| Error::Fatal(format!("TLS configuration failed: {e}")))?;
        }

        info!("Starting RPC server on {addr}");
        builder
            .add_service(GNmiServer::new(service))
            .serve_with_shutdown(addr, async move {
                let _ = shutdown.changed().await;
                info!("shutdown signal received");
            })
            .await
            .map_err(|e| Error::Fatal(format!("RPC server failed: {e}")))?;
        Ok(())
    }
}
