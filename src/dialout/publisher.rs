use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::context::TelemetryContext;
use crate::dialout::load_dialout_config;
use crate::dialout::DestinationGroup;
use crate::dialout::DialOutConfig;
use crate::dialout::GlobalConfig;
use crate::dialout::ReportType;
use crate::dialout::SubscriptionEntry;
use crate::dialout::TELEMETRY_CLIENT_TABLE;
use crate::engine::StreamEntry;
use crate::engine::SubscriptionEngine;
use crate::proto::gnmi;
use crate::proto::gnmi_dialout::g_nmi_dial_out_client::GNmiDialOutClient;
use crate::Result;

/// Options the dial-out CLI feeds in; the store's `Global` entry overrides
/// the overlapping ones at run time.
#[derive(Debug, Clone)]
pub struct DialOutOptions {
    /// Fallback retry interval when the store carries none
    pub retry_interval: Duration,
    /// Fallback encoding when the store carries none
    pub encoding: gnmi::Encoding,
    /// Serve without TLS, for testing only
    pub tls_disabled: bool,
    /// Hostname to verify the collector certificate against
    pub server_name: Option<String>,
    /// Skip collector certificate verification
    pub insecure_skip_verify: bool,
    /// Expect no responses from the collector
    pub unidirectional: bool,
}

impl Default for DialOutOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            encoding: gnmi::Encoding::JsonIetf,
            tls_disabled: false,
            server_name: None,
            insecure_skip_verify: false,
            unidirectional: true,
        }
    }
}

struct RunningEntry {
    entry: SubscriptionEntry,
    group: DestinationGroup,
    global: GlobalConfig,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The publisher control loop: keeps one running task per configured
/// subscription entry, reconciling against the configuration store whenever
/// its table changes. Runs until cancelled.
pub async fn dial_out_run(
    ctx: Arc<TelemetryContext>,
    options: DialOutOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let store = ctx.registry().connector("CONFIG_DB")?;
    let separator = ctx.registry().separator("CONFIG_DB")?;
    let mut config_watch = store
        .psubscribe(&format!("{TELEMETRY_CLIENT_TABLE}{separator}*"))
        .await?;

    let mut running: HashMap<String, RunningEntry> = HashMap::new();
    let defaults = GlobalConfig {
        retry_interval: options.retry_interval,
        encoding: options.encoding,
        src_ip: None,
        unidirectional: options.unidirectional,
    };

    loop {
        match load_dialout_config(&ctx, defaults.clone()).await {
            Ok(config) => reconcile(&ctx, &options, &config, &mut running),
            Err(e) => warn!("dial-out configuration unreadable, keeping current set: {e}"),
        }

        // Park until the table changes (drain the burst) or we are stopped.
        let changed = loop {
            tokio::select! {
                _ = cancel.cancelled() => break false,
                event = config_watch.recv(Duration::from_millis(500)) => match event {
                    Ok(Some(_)) => {
                        // settle a burst of writes before reloading
                        while let Ok(Some(_)) =
                            config_watch.recv(Duration::from_millis(200)).await
                        {}
                        break true;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("configuration watch lost: {e}");
                        tokio::time::sleep(options.retry_interval).await;
                        break true;
                    }
                },
            }
        };
        if !changed {
            break;
        }
        info!("telemetry client configuration changed");
    }

    for (name, entry) in running.drain() {
        debug!("stopping subscription {name}");
        entry.cancel.cancel();
        let _ = entry.handle.await;
    }
    Ok(())
}

/// Stops removed or changed entries, starts new ones.
fn reconcile(
    ctx: &Arc<TelemetryContext>,
    options: &DialOutOptions,
    config: &DialOutConfig,
    running: &mut HashMap<String, RunningEntry>,
) {
    running.retain(|name, current| {
        let keep = config
            .subscriptions
            .get(name)
            .map(|entry| {
                let group = config.groups.get(&entry.dst_group);
                *entry == current.entry
                    && group == Some(&current.group)
                    && config.global == current.global
            })
            .unwrap_or(false);
        if !keep {
            info!("stopping subscription {name}");
            current.cancel.cancel();
        }
        keep
    });

    for (name, entry) in &config.subscriptions {
        if running.contains_key(name) {
            continue;
        }
        let Some(group) = config.groups.get(&entry.dst_group) else {
            continue;
        };
        info!(
            "starting subscription {name} -> group {} ({} destinations)",
            entry.dst_group,
            group.addrs.len()
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_subscription_entry(
            ctx.clone(),
            entry.clone(),
            group.clone(),
            config.global.clone(),
            options.clone(),
            cancel.clone(),
        ));
        running.insert(
            name.clone(),
            RunningEntry {
                entry: entry.clone(),
                group: group.clone(),
                global: config.global.clone(),
                cancel,
                handle,
            },
        );
    }
}

/// One subscription entry: maintain a connection to the ranked destinations
/// and publish the engine's output over it. Every (re)connection restarts
/// the engine, replaying the subscription from its initial values.
async fn run_subscription_entry(
    ctx: Arc<TelemetryContext>,
    entry: SubscriptionEntry,
    group: DestinationGroup,
    global: GlobalConfig,
    options: DialOutOptions,
    cancel: CancellationToken,
) {
    let retry_interval = global.retry_interval;
    let mut destination = 0usize;

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let addr = &group.addrs[destination % group.addrs.len()];

        match connect(addr, &options).await {
            Ok(client) => {
                info!("subscription {}: connected to {addr}", entry.name);
                publish_over(&ctx, &entry, global.unidirectional, client, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
                warn!("subscription {}: connection to {addr} ended", entry.name);
            }
            Err(e) => {
                warn!("subscription {}: connect to {addr} failed: {e}", entry.name);
            }
        }

        // next destination, wrapping around, after the retry interval
        destination = (destination + 1) % group.addrs.len();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }
}

async fn connect(addr: &str, options: &DialOutOptions) -> Result<GNmiDialOutClient<Channel>> {
    let endpoint = if options.tls_disabled {
        Endpoint::from_shared(format!("http://{addr}"))
    } else {
        let mut tls = ClientTlsConfig::new();
        if let Some(server_name) = &options.server_name {
            tls = tls.domain_name(server_name.clone());
        }
        if options.insecure_skip_verify {
            warn!("insecure_skip_verify requested; certificate verification stays on");
        }
        Endpoint::from_shared(format!("https://{addr}"))
            .and_then(|e| e.tls_config(tls))
    }
    .map_err(|e| crate::Error::Fatal(format!("invalid destination {addr}: {e}")))?
    .connect_timeout(Duration::from_secs(5));

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| crate::Error::Fatal(format!("connect {addr}: {e}")))?;
    Ok(GNmiDialOutClient::new(channel))
}

/// Runs the engine for one connection's lifetime and forwards its queue to
/// the collector.
async fn publish_over(
    ctx: &Arc<TelemetryContext>,
    entry: &SubscriptionEntry,
    unidirectional: bool,
    mut client: GNmiDialOutClient<Channel>,
    cancel: &CancellationToken,
) {
    let prefix = gnmi::Path {
        origin: String::new(),
        elem: Vec::new(),
        target: entry.path_target.clone(),
    };
    let engine = Arc::new(SubscriptionEngine::new(ctx.clone(), Some(prefix)));
    let (queue_tx, mut queue_rx) = engine.queue();
    let run_cancel = cancel.child_token();

    let stream_entries: Vec<StreamEntry> = entry
        .paths
        .iter()
        .map(|path| StreamEntry {
            path: path.clone(),
            mode: match entry.report_type {
                ReportType::Stream => gnmi::SubscriptionMode::TargetDefined,
                ReportType::Periodic => gnmi::SubscriptionMode::Sample,
            },
            sample_interval_ns: entry.report_interval.as_nanos() as u64,
        })
        .collect();

    let engine_cancel = run_cancel.clone();
    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .stream_run(stream_entries, queue_tx, engine_cancel)
                .await;
        })
    };

    let (send_tx, send_rx) = mpsc::channel::<gnmi::SubscribeResponse>(16);
    let outbound = ReceiverStream::new(send_rx);

    let mut inbound = match client.publish(tonic::Request::new(outbound)).await {
        Ok(response) => response.into_inner(),
        Err(e) => {
            warn!("publish call failed: {e}");
            run_cancel.cancel();
            let _ = engine_task.await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            value = queue_rx.get() => match value {
                Some(value) => match value.into_response() {
                    Ok(response) => {
                        if send_tx.send(response).await.is_err() {
                            debug!("collector dropped the publish stream");
                            break;
                        }
                    }
                    Err(status) => {
                        error!("subscription {} fatal: {status}", entry.name);
                        break;
                    }
                },
                None => break,
            },
            reply = inbound.message(), if !unidirectional => match reply {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    debug!("collector closed the response stream");
                    break;
                }
                Err(e) => {
                    debug!("collector response error: {e}");
                    break;
                }
            },
        }
    }

    run_cancel.cancel();
    let _ = engine_task.await;
}
