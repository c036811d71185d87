use clap::Parser;
use sonic_telemetry::dialout::DialOutCollector;
use sonic_telemetry::proto::gnmi;
use sonic_telemetry::proto::gnmi_dialout::g_nmi_dial_out_server::GNmiDialOutServer;
use sonic_telemetry::{Error, Result};
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Test-harness collector: accepts dial-out Publish streams and logs what
/// arrives.
#[derive(Parser, Debug)]
#[command(name = "dialout-server", about = "SONiC telemetry dial-out collector")]
struct Args {
    /// Port to listen on
    #[arg(long)]
    port: u16,

    /// TLS server certificate
    #[arg(long)]
    server_crt: Option<String>,

    /// TLS server private key
    #[arg(long)]
    server_key: Option<String>,

    /// Serve plaintext, only for testing
    #[arg(long, default_value_t = false)]
    insecure: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let (collector, mut received) = DialOutCollector::channel(1024);
    tokio::spawn(async move {
        while let Some(response) = received.recv().await {
            match response.response {
                Some(gnmi::subscribe_response::Response::Update(notification)) => {
                    info!(
                        "update @{} with {} values",
                        notification.timestamp,
                        notification.update.len()
                    );
                }
                Some(gnmi::subscribe_response::Response::SyncResponse(_)) => {
                    info!("sync response");
                }
                None => {}
            }
        }
    });

    let addr = format!("0.0.0.0:{}", args.port)
        .parse()
        .map_err(|e| Error::Fatal(format!("invalid port: {e}")))?;

    let mut builder = Server::builder();
    if !args.insecure {
        let (Some(cert_path), Some(key_path)) = (&args.server_crt, &args.server_key) else {
            error!("server_crt and server_key must be set without --insecure");
            return Err(Error::Fatal("missing TLS material".to_string()));
        };
        let cert = tokio::fs::read(cert_path)
            .await
            .map_err(|e| Error::Fatal(format!("could not load server certificate: {e}")))?;
        let key = tokio::fs::read(key_path)
            .await
            .map_err(|e| Error::Fatal(format!("could not load server key: {e}")))?;
        builder = builder
            .tls_config(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))
            .map_err(|e| Error::Fatal(format!("TLS configuration failed: {e}")))?;
    }

    info!("Starting dial-out collector on {addr}");
    builder
        .add_service(GNmiDialOutServer::new(collector))
        .serve(addr)
        .await
        .map_err(|e| Error::Fatal(format!("collector failed: {e}")))?;
    Ok(())
}
