mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sonic_telemetry::context::TelemetryContext;
use sonic_telemetry::dialout::{dial_out_run, DialOutCollector, DialOutOptions};
use sonic_telemetry::proto::gnmi;
use sonic_telemetry::proto::gnmi_dialout::g_nmi_dial_out_server::GNmiDialOutServer;
use sonic_telemetry::test_utils::seed_counters_fixture;
use sonic_telemetry::Result;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

const WAIT: Duration = Duration::from_secs(15);

struct Collector {
    addr: SocketAddr,
    received: mpsc::Receiver<gnmi::SubscribeResponse>,
    handle: JoinHandle<()>,
}

impl Collector {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind collector");
        let addr = listener.local_addr().expect("collector addr");
        let (collector, received) = DialOutCollector::channel(256);
        let handle = tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(GNmiDialOutServer::new(collector))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;
        });
        Self {
            addr,
            received,
            handle,
        }
    }

    /// Kills the collector outright; in-flight publish streams break.
    fn kill(&self) {
        self.handle.abort();
    }

    async fn next_update(&mut self) -> Option<gnmi::Notification> {
        loop {
            let response = timeout(WAIT, self.received.recv()).await.ok()??;
            match response.response {
                Some(gnmi::subscribe_response::Response::Update(notification)) => {
                    return Some(notification)
                }
                _ => continue,
            }
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn seed_dialout_config(ctx: &Arc<TelemetryContext>, addrs: &str) -> Result<()> {
    let store = ctx.registry().connector("CONFIG_DB")?;
    store
        .hset("TELEMETRY_CLIENT|Global", "retry_interval", "1")
        .await?;
    store
        .hset("TELEMETRY_CLIENT|DestinationGroup_HS", "dst_addr", addrs)
        .await?;
    for (field, value) in [
        ("path_target", "COUNTERS_DB"),
        ("dst_group", "HS"),
        ("report_type", "periodic"),
        ("report_interval", "300"),
        ("paths", "COUNTERS/Ethernet68"),
    ] {
        store
            .hset("TELEMETRY_CLIENT|Subscription_HS_RDMA", field, value)
            .await?;
    }
    Ok(())
}

fn test_options() -> DialOutOptions {
    DialOutOptions {
        retry_interval: Duration::from_secs(1),
        tls_disabled: true,
        ..DialOutOptions::default()
    }
}

fn first_elem(notification: &gnmi::Notification) -> String {
    notification.update[0]
        .path
        .as_ref()
        .map(|p| {
            p.elem
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_publishes_to_first_destination() -> Result<()> {
    let ctx = TelemetryContext::memory();
    seed_counters_fixture(ctx.registry()).await?;

    let mut collector = Collector::start().await;
    seed_dialout_config(&ctx, &collector.addr.to_string()).await?;

    let cancel = CancellationToken::new();
    let runner = tokio::spawn(dial_out_run(ctx.clone(), test_options(), cancel.clone()));

    let notification = collector.next_update().await.expect("first update");
    assert_eq!(first_elem(&notification), "COUNTERS/Ethernet68");
    let json = common::json_of(notification.update[0].val.as_ref().unwrap());
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");

    cancel.cancel();
    timeout(WAIT, runner).await.expect("publisher stops").unwrap()?;
    Ok(())
}

#[tokio::test]
async fn test_failover_to_second_destination() -> Result<()> {
    let ctx = TelemetryContext::memory();
    seed_counters_fixture(ctx.registry()).await?;

    let mut first = Collector::start().await;
    let mut second = Collector::start().await;
    seed_dialout_config(&ctx, &format!("{},{}", first.addr, second.addr)).await?;

    let cancel = CancellationToken::new();
    let runner = tokio::spawn(dial_out_run(ctx.clone(), test_options(), cancel.clone()));

    // the client ranks destinations: traffic lands on the first
    assert!(first.next_update().await.is_some());

    // stop the first; within the retry interval the client moves to the
    // second and replays the subscription
    first.kill();
    let replay = second.next_update().await.expect("failover update");
    assert_eq!(first_elem(&replay), "COUNTERS/Ethernet68");

    // and keeps publishing there
    assert!(second.next_update().await.is_some());

    cancel.cancel();
    timeout(WAIT, runner).await.expect("publisher stops").unwrap()?;
    Ok(())
}

#[tokio::test]
async fn test_config_change_starts_new_subscription() -> Result<()> {
    let ctx = TelemetryContext::memory();
    seed_counters_fixture(ctx.registry()).await?;

    let mut collector = Collector::start().await;
    seed_dialout_config(&ctx, &collector.addr.to_string()).await?;

    let cancel = CancellationToken::new();
    let runner = tokio::spawn(dial_out_run(ctx.clone(), test_options(), cancel.clone()));

    // the configured subscription is live
    assert!(collector.next_update().await.is_some());

    // add a second subscription entry; the watcher picks it up
    let store = ctx.registry().connector("CONFIG_DB")?;
    for (field, value) in [
        ("path_target", "COUNTERS_DB"),
        ("dst_group", "HS"),
        ("report_type", "periodic"),
        ("report_interval", "300"),
        ("paths", "COUNTERS_PORT_NAME_MAP"),
    ] {
        store
            .hset("TELEMETRY_CLIENT|Subscription_MAPS", field, value)
            .await?;
    }

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "new subscription never produced output"
        );
        let Some(notification) = collector.next_update().await else {
            panic!("collector stream ended early");
        };
        if first_elem(&notification) == "COUNTERS_PORT_NAME_MAP" {
            break;
        }
    }

    cancel.cancel();
    timeout(WAIT, runner).await.expect("publisher stops").unwrap()?;
    Ok(())
}
