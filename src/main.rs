use std::path::Path;

use clap::Parser;
use sonic_telemetry::config::TelemetryConfig;
use sonic_telemetry::context::TelemetryContext;
use sonic_telemetry::server::TelemetryServer;
use sonic_telemetry::{Error, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// The telemetry RPC server.
#[derive(Parser, Debug)]
#[command(name = "telemetry", about = "SONiC streaming telemetry server")]
struct Args {
    /// Port to listen on; overrides the configured listen address port
    #[arg(long)]
    port: Option<u16>,

    /// TLS server certificate
    #[arg(long)]
    server_crt: Option<String>,

    /// TLS server private key
    #[arg(long)]
    server_key: Option<String>,

    /// CA certificate for client certificate validation
    #[arg(long)]
    ca_crt: Option<String>,

    /// Skip providing TLS cert and key, for testing only
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Client auth modes, comma-separated: none,cert,password
    #[arg(long)]
    client_auth: Option<String>,

    /// Connect to the key/value server over local TCP instead of the
    /// domain socket, for testing only
    #[arg(long, default_value_t = false)]
    use_local_tcp: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = TelemetryConfig::load()?;
    apply_args(&mut settings, &args);
    let settings = settings.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.service.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    let ctx = TelemetryContext::open(&settings.store, settings.engine.clone()).await?;
    info!("Serving gNMI on {}", settings.service.listen_address);

    if let Err(e) = TelemetryServer::new(ctx, settings).serve(graceful_rx).await {
        error!("server stopped: {:?}", e);
        return Err(e);
    }

    println!("Exiting program.");
    Ok(())
}

fn apply_args(settings: &mut TelemetryConfig, args: &Args) {
    if let Some(port) = args.port {
        let host = settings
            .service
            .listen_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        settings.service.listen_address = format!("{host}:{port}");
    }
    if let Some(cert) = &args.server_crt {
        settings.tls.server_certificate_path = cert.clone();
    }
    if let Some(key) = &args.server_key {
        settings.tls.server_private_key_path = key.clone();
    }
    if let Some(ca) = &args.ca_crt {
        settings.tls.client_ca_certificate_path = ca.clone();
    }
    if args.insecure {
        settings.tls.insecure = true;
    }
    if let Some(modes) = &args.client_auth {
        settings.service.client_auth = modes
            .split(',')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
    }
    if args.use_local_tcp {
        settings.store.use_local_tcp = true;
    }
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signalled");
    Ok(())
}

fn init_observability(log_dir: &str) -> Result<Option<WorkerGuard>> {
    if log_dir.is_empty() {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
            .init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::never(Path::new(log_dir), "telemetry.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(Some(guard))
}
