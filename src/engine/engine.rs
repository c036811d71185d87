use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::context::TelemetryContext;
use crate::engine::value_queue;
use crate::engine::watchers;
use crate::engine::watchers::SyncToken;
use crate::engine::watchers::WatcherShared;
use crate::engine::PathBinding;
use crate::engine::TelemetryValue;
use crate::engine::ValueReceiver;
use crate::engine::ValueSender;
use crate::proto::gnmi;
use crate::resolve::Resolver;
use crate::utils::now_nanos;
use crate::Result;

/// One entry of a streaming subscription list.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub path: gnmi::Path,
    pub mode: gnmi::SubscriptionMode,
    /// Requested sample interval in nanoseconds; zero leaves the choice to
    /// the engine
    pub sample_interval_ns: u64,
}

/// How an entry ended up being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedMode {
    OnChange,
    Sample(Duration),
}

/// The per-subscription engine. One instance serves one client request for
/// its lifetime; all of its watchers answer to one cancellation token.
pub struct SubscriptionEngine {
    ctx: Arc<TelemetryContext>,
    resolver: Resolver,
    prefix: Option<gnmi::Path>,
}

impl SubscriptionEngine {
    pub fn new(ctx: Arc<TelemetryContext>, prefix: Option<gnmi::Path>) -> Self {
        let resolver = Resolver::new(ctx.clone());
        Self {
            ctx,
            resolver,
            prefix,
        }
    }

    /// Builds this engine's bounded output queue.
    pub fn queue(&self) -> (ValueSender, ValueReceiver) {
        value_queue(self.ctx.engine().queue_capacity)
    }

    async fn bind(&self, path: &gnmi::Path) -> Result<PathBinding> {
        PathBinding::resolve(&self.resolver, self.prefix.as_ref(), path).await
    }

    /// One-shot read: resolve, read, one value per path.
    pub async fn get(&self, paths: &[gnmi::Path]) -> Result<Vec<TelemetryValue>> {
        let mut values = Vec::with_capacity(paths.len());
        let timestamp = now_nanos();
        for path in paths {
            let binding = self.bind(path).await?;
            let value = binding.read(&self.ctx).await?;
            values.push(TelemetryValue {
                timestamp,
                prefix: self.prefix.clone(),
                kind: crate::engine::ValueKind::Update {
                    path: path.clone(),
                    value,
                },
            });
        }
        Ok(values)
    }

    /// Long-poll: an initial read, then one full re-read (plus sync marker)
    /// per trigger. Ends when the trigger channel closes.
    pub async fn poll_run(
        &self,
        paths: Vec<gnmi::Path>,
        queue: ValueSender,
        mut poll_rx: mpsc::Receiver<()>,
    ) {
        let mut bindings = Vec::with_capacity(paths.len());
        for path in &paths {
            match self.bind(path).await {
                Ok(binding) => bindings.push((path.clone(), binding)),
                Err(e) => {
                    queue.put_fatal(e.to_string()).await;
                    return;
                }
            }
        }

        if self.emit_all(&bindings, &queue).await.is_err() {
            return;
        }

        while poll_rx.recv().await.is_some() {
            let started = std::time::Instant::now();
            if self.emit_all(&bindings, &queue).await.is_err() {
                return;
            }
            debug!("poll served in {:?}", started.elapsed());
        }
        debug!("poll channel closed, exiting poll loop");
    }

    async fn emit_all(
        &self,
        bindings: &[(gnmi::Path, PathBinding)],
        queue: &ValueSender,
    ) -> Result<()> {
        for (path, binding) in bindings {
            match binding.read(&self.ctx).await {
                Ok(value) => {
                    queue
                        .put(TelemetryValue::update(
                            self.prefix.clone(),
                            path.clone(),
                            value,
                        ))
                        .await?;
                }
                Err(e) => {
                    queue.put_fatal(e.to_string()).await;
                    return Err(e);
                }
            }
        }
        queue.put_sync().await
    }

    /// Streaming: resolves each entry's mode, spawns the watcher fleet, and
    /// runs until cancelled. The sync marker is inserted once every path has
    /// delivered its initial value.
    pub async fn stream_run(
        &self,
        entries: Vec<StreamEntry>,
        queue: ValueSender,
        cancel: CancellationToken,
    ) {
        let mut field_watch = Vec::new();
        let mut table_watch = Vec::new();
        let mut sample_groups: HashMap<Duration, Vec<(gnmi::Path, PathBinding)>> = HashMap::new();

        for entry in entries {
            let binding = match self.bind(&entry.path).await {
                Ok(binding) => binding,
                Err(e) => {
                    queue.put_fatal(e.to_string()).await;
                    return;
                }
            };
            match self.resolve_mode(&entry, &binding) {
                Ok(ResolvedMode::OnChange) => {
                    if binding.is_field_granularity() {
                        field_watch.push((entry.path, binding));
                    } else {
                        table_watch.push((entry.path, binding));
                    }
                }
                Ok(ResolvedMode::Sample(interval)) => {
                    sample_groups
                        .entry(interval)
                        .or_default()
                        .push((entry.path, binding));
                }
                Err(e) => {
                    queue.put_fatal(e.to_string()).await;
                    return;
                }
            }
        }

        let shared = WatcherShared {
            ctx: self.ctx.clone(),
            queue: queue.clone(),
            prefix: self.prefix.clone(),
            cancel: cancel.clone(),
        };

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        let mut sync_rxs = Vec::new();

        for (path, binding) in field_watch {
            let PathBinding::Store { locations } = binding else {
                continue;
            };
            let (token, rx) = SyncToken::pair();
            sync_rxs.push(rx);
            handles.push(tokio::spawn(watchers::run_field_watcher(
                shared.clone(),
                path,
                locations,
                token,
            )));
        }
        for (path, binding) in table_watch {
            let PathBinding::Store { locations } = binding else {
                continue;
            };
            let (token, rx) = SyncToken::pair();
            sync_rxs.push(rx);
            handles.push(tokio::spawn(watchers::run_table_watcher(
                shared.clone(),
                path,
                locations,
                token,
            )));
        }
        for (interval, group) in sample_groups {
            let mut tokens = Vec::with_capacity(group.len());
            for _ in 0..group.len() {
                let (token, rx) = SyncToken::pair();
                sync_rxs.push(rx);
                tokens.push(token);
            }
            handles.push(tokio::spawn(watchers::run_sample_group(
                shared.clone(),
                group,
                interval,
                tokens,
            )));
        }

        // Wait until every path has delivered once, then inject the single
        // sync marker. A watcher dying early releases its slot by dropping
        // the token.
        let sync_queue = queue.clone();
        let sync_cancel = cancel.clone();
        let sync_task = tokio::spawn(async move {
            tokio::select! {
                _ = sync_cancel.cancelled() => {}
                _ = async {
                    for rx in sync_rxs {
                        let _ = rx.await;
                    }
                } => {
                    let _ = sync_queue.put_sync().await;
                    info!("subscription synced");
                }
            }
        });

        cancel.cancelled().await;
        join_all(handles).await;
        let _ = sync_task.await;
        debug!("subscription engine stopped");
    }

    /// Picks the effective streaming mode for one entry.
    fn resolve_mode(&self, entry: &StreamEntry, binding: &PathBinding) -> Result<ResolvedMode> {
        let support = binding.subscribe_support(&self.ctx);
        let requested = Duration::from_nanos(entry.sample_interval_ns);

        match entry.mode {
            gnmi::SubscriptionMode::TargetDefined => {
                if support.on_change && support.prefers_on_change {
                    Ok(ResolvedMode::OnChange)
                } else {
                    Ok(ResolvedMode::Sample(requested.max(support.min_interval)))
                }
            }
            gnmi::SubscriptionMode::OnChange => {
                if !support.on_change {
                    return Err(crate::errors::SubscribeError::OnChangeUnsupported(format!(
                        "{:?}",
                        entry.path.elem
                    ))
                    .into());
                }
                Ok(ResolvedMode::OnChange)
            }
            gnmi::SubscriptionMode::Sample => {
                if support.min_interval.is_zero() || requested < support.min_interval {
                    return Err(crate::errors::SubscribeError::IntervalTooSmall {
                        requested_ms: requested.as_millis() as u64,
                        minimum_ms: support.min_interval.as_millis() as u64,
                    }
                    .into());
                }
                Ok(ResolvedMode::Sample(requested))
            }
        }
    }
}
