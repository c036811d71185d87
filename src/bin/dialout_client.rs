use std::time::Duration;

use clap::Parser;
use sonic_telemetry::config::TelemetryConfig;
use sonic_telemetry::context::TelemetryContext;
use sonic_telemetry::dialout::{dial_out_run, DialOutOptions};
use sonic_telemetry::proto::gnmi;
use sonic_telemetry::{Error, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// The telemetry publish client: dials out to configured collectors and
/// pushes subscription output.
#[derive(Parser, Debug)]
#[command(name = "dialout-client", about = "SONiC telemetry publish client")]
struct Args {
    /// Interval at which the client tries the next destination, seconds
    #[arg(long, default_value_t = 30)]
    retry_interval: u64,

    /// Value encoding: JSON or JSON_IETF
    #[arg(long, default_value = "JSON_IETF")]
    encoding: String,

    /// When set, use this hostname to verify the collector certificate
    #[arg(long)]
    server_name: Option<String>,

    /// Skip collector certificate verification during TLS handshake
    #[arg(long, default_value_t = false)]
    skip_verify: bool,

    /// Without TLS, only for testing
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// No response from the collector is expected
    #[arg(long, default_value_t = true)]
    unidirectional: bool,

    /// Connect to the key/value server over local TCP, for testing only
    #[arg(long, default_value_t = false)]
    use_local_tcp: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let mut settings = TelemetryConfig::load()?;
    settings.store.use_local_tcp |= args.use_local_tcp;

    let encoding = gnmi::Encoding::from_str_name(&args.encoding)
        .ok_or_else(|| Error::Fatal(format!("unknown encoding {}", args.encoding)))?;

    let ctx = TelemetryContext::open(&settings.store, settings.engine.clone()).await?;
    let options = DialOutOptions {
        retry_interval: Duration::from_secs(args.retry_interval),
        encoding,
        tls_disabled: args.insecure,
        server_name: args.server_name.clone(),
        insecure_skip_verify: args.skip_verify,
        unidirectional: args.unidirectional,
    };

    // Terminate on SIGINT/SIGTERM
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("signal handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("signal handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown requested");
        signal_cancel.cancel();
    });

    info!("Starting telemetry publish client");
    if let Err(e) = dial_out_run(ctx, options, cancel).await {
        error!("Exiting telemetry publish client: {:?}", e);
        return Err(e);
    }
    info!("Exiting telemetry publish client");
    Ok(())
}
