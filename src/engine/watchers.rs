use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::codec;
use crate::codec::JsonMap;
use crate::context::TelemetryContext;
use crate::engine::PathBinding;
use crate::engine::TelemetryValue;
use crate::engine::ValueSender;
use crate::proto::gnmi;
use crate::resolve::TablePath;
use crate::store::KeyspaceEvent;
use crate::store::KeyspaceSubscription;
use crate::Result;

/// Consecutive store failures a watcher rides out before it gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// One slot of the engine's first-emission accounting. Firing it (or
/// dropping it, when a watcher dies early) releases the slot.
pub(crate) struct SyncToken(Option<oneshot::Sender<()>>);

impl SyncToken {
    pub(crate) fn pair() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }

    fn done(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Everything a watcher task needs, cloned per task.
#[derive(Clone)]
pub(crate) struct WatcherShared {
    pub ctx: Arc<TelemetryContext>,
    pub queue: ValueSender,
    pub prefix: Option<gnmi::Path>,
    pub cancel: CancellationToken,
}

impl WatcherShared {
    async fn emit(&self, path: &gnmi::Path, value: gnmi::TypedValue) -> Result<()> {
        self.queue
            .put(TelemetryValue::update(
                self.prefix.clone(),
                path.clone(),
                value,
            ))
            .await
    }

    async fn fail(&self, message: String) {
        warn!("watcher failed: {message}");
        self.queue.put_fatal(message).await;
    }
}

/// On-change watcher at field granularity: polls the fields and emits only
/// on observed change. The first pass always emits and counts the sync.
pub(crate) async fn run_field_watcher(
    shared: WatcherShared,
    path: gnmi::Path,
    locations: Vec<TablePath>,
    mut sync: SyncToken,
) {
    let interval = shared.ctx.engine().field_poll_interval();
    let scalar_mode = locations.len() == 1 && locations[0].json_key.is_none();

    let mut prev: Vec<Option<String>> = vec![None; locations.len()];
    let mut first = true;
    let mut errors = 0u32;

    loop {
        let mut msi = JsonMap::new();
        let mut scalar_change = None;

        for (idx, tp) in locations.iter().enumerate() {
            let field = tp.fields.single().unwrap_or_default();
            let store = match shared.ctx.registry().connector(&tp.target) {
                Ok(store) => store,
                Err(e) => {
                    shared.fail(e.to_string()).await;
                    return;
                }
            };
            let key = tp.db_key();
            match store.hget(&key, field).await {
                Ok(Some(value)) => {
                    errors = 0;
                    if first || prev[idx].as_deref() != Some(value.as_str()) {
                        prev[idx] = Some(value.clone());
                        if scalar_mode {
                            scalar_change = Some(value);
                        } else {
                            let json_key = tp.json_key.clone().unwrap_or_else(|| key.clone());
                            let json_field =
                                tp.json_field.clone().unwrap_or_else(|| field.to_string());
                            let slot = msi
                                .entry(json_key)
                                .or_insert_with(|| JsonValue::Object(JsonMap::new()));
                            if let JsonValue::Object(obj) = slot {
                                obj.insert(json_field, JsonValue::String(value));
                            }
                        }
                    }
                }
                Ok(None) => {
                    if tp.json_key.is_some() {
                        // stale alias derived from a virtual wildcard
                        debug!("{field} missing under {key}, skipping");
                        continue;
                    }
                    shared
                        .fail(format!("{field} doesn't exist with key {key} in db"))
                        .await;
                    return;
                }
                Err(e) => {
                    errors += 1;
                    warn!("hget {key}/{field} failed ({errors}): {e}");
                    if errors >= MAX_CONSECUTIVE_ERRORS {
                        shared
                            .fail(format!("persistent store failure on {key}: {e}"))
                            .await;
                        return;
                    }
                }
            }
        }

        if scalar_mode {
            if let Some(value) = scalar_change {
                if shared.emit(&path, codec::string_value(value)).await.is_err() {
                    return;
                }
            }
        } else if !msi.is_empty() {
            match codec::json_value(&msi) {
                Ok(value) => {
                    if shared.emit(&path, value).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    shared.fail(e.to_string()).await;
                    return;
                }
            }
        }

        if first {
            sync.done();
            first = false;
        }

        tokio::select! {
            _ = shared.cancel.cancelled() => {
                debug!("stopping field watcher for {:?}", path.elem);
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// On-change watcher at table/key granularity: keyspace notifications feed
/// per-location readers; a single publisher batches their deltas on a fixed
/// tick and de-duplicates repeats.
pub(crate) async fn run_table_watcher(
    shared: WatcherShared,
    path: gnmi::Path,
    locations: Vec<TablePath>,
    mut sync: SyncToken,
) {
    // Subscribe before the baseline read so no mutation is lost in between.
    let mut subscriptions = Vec::new();
    for tp in &locations {
        let pattern = if tp.key.is_empty() {
            tp.key_pattern()
        } else {
            tp.db_key()
        };
        let store = match shared.ctx.registry().connector(&tp.target) {
            Ok(store) => store,
            Err(e) => {
                shared.fail(e.to_string()).await;
                return;
            }
        };
        match store.psubscribe(&pattern).await {
            Ok(sub) => subscriptions.push(sub),
            Err(e) => {
                shared
                    .fail(format!("psubscribe to {pattern} failed: {e}"))
                    .await;
                return;
            }
        }
    }

    // Baseline emission.
    let mut msi = JsonMap::new();
    for tp in &locations {
        if let Err(e) = codec::table_data_to_map(&shared.ctx, tp, &mut msi).await {
            shared.fail(e.to_string()).await;
            return;
        }
    }
    let value = match codec::json_value(&msi) {
        Ok(value) => value,
        Err(e) => {
            shared.fail(e.to_string()).await;
            return;
        }
    };
    if shared.emit(&path, value).await.is_err() {
        return;
    }
    sync.done();

    // Per-location delta readers feed one bounded channel.
    let (delta_tx, mut delta_rx) = mpsc::channel::<JsonMap>(64);
    for (tp, sub) in locations.iter().zip(subscriptions) {
        tokio::spawn(delta_reader(
            shared.clone(),
            tp.clone(),
            sub,
            delta_tx.clone(),
        ));
    }
    drop(delta_tx);

    // Publisher: batch whatever arrived since the last tick into one value.
    let batch_interval = shared.ctx.engine().table_batch_interval();
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                debug!("stopping table watcher for {:?}", path.elem);
                return;
            }
            _ = tokio::time::sleep(batch_interval) => {
                let mut batch = JsonMap::new();
                while let Ok(delta) = delta_rx.try_recv() {
                    for (key, value) in delta {
                        batch.insert(key, value);
                    }
                }
                if batch.is_empty() {
                    continue;
                }
                match codec::json_value(&batch) {
                    Ok(value) => {
                        if shared.emit(&path, value).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        shared.fail(e.to_string()).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Reads one location's keyspace notifications and turns them into deltas.
async fn delta_reader(
    shared: WatcherShared,
    tp: TablePath,
    mut sub: KeyspaceSubscription,
    delta_tx: mpsc::Sender<JsonMap>,
) {
    let receive_timeout = shared.ctx.engine().notify_receive_timeout();
    let mut last_delta = JsonMap::new();

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                debug!("stopping delta reader for {}", tp.db_key());
                return;
            }
            event = sub.recv(receive_timeout) => {
                let event = match event {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(_) => {
                        debug!("keyspace subscription for {} closed", tp.db_key());
                        return;
                    }
                };
                match build_delta(&shared.ctx, &tp, &event).await {
                    Ok(delta) => {
                        // a notification whose post-image equals the last
                        // emitted image produces no output
                        if delta == last_delta {
                            continue;
                        }
                        last_delta = delta.clone();
                        if delta_tx.send(delta).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        shared.fail(e.to_string()).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Rebuilds the part of a location a notification touched.
async fn build_delta(
    ctx: &Arc<TelemetryContext>,
    tp: &TablePath,
    event: &KeyspaceEvent,
) -> Result<JsonMap> {
    let mut delta = JsonMap::new();

    if !tp.key.is_empty() {
        // keyed location: the post-image of the whole location
        codec::table_data_to_map(ctx, tp, &mut delta).await?;
        return Ok(delta);
    }

    // keyless location: rebuild only the affected key, presented under its
    // suffix; a vanished key is recorded as an empty sub-map
    let suffix = tp.key_suffix(&event.key).to_string();
    let mut affected = tp.clone();
    affected.key = suffix.clone();
    affected.json_key = Some(suffix.clone());
    codec::table_data_to_map(ctx, &affected, &mut delta).await?;
    if !event.op.is_set() {
        delta
            .entry(suffix)
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    }
    Ok(delta)
}

/// Periodic sampler: paths sharing an interval share one ticker. Each tick
/// re-reads every path in the group, emits their values, then one sync
/// marker for the group. The first tick's emissions release the engine-wide
/// sync instead of a group marker.
pub(crate) async fn run_sample_group(
    shared: WatcherShared,
    entries: Vec<(gnmi::Path, PathBinding)>,
    interval: Duration,
    mut syncs: Vec<SyncToken>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut first = true;
    let mut errors = 0u32;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                debug!("stopping sample group ({} paths)", entries.len());
                return;
            }
            _ = ticker.tick() => {}
        }

        for (path, binding) in &entries {
            match binding.read(&shared.ctx).await {
                Ok(value) => {
                    errors = 0;
                    if shared.emit(path, value).await.is_err() {
                        return;
                    }
                }
                Err(e) if first => {
                    shared.fail(e.to_string()).await;
                    return;
                }
                Err(e) => {
                    errors += 1;
                    warn!("sample read failed ({errors}): {e}");
                    if errors >= MAX_CONSECUTIVE_ERRORS {
                        shared
                            .fail(format!("persistent store failure: {e}"))
                            .await;
                        return;
                    }
                }
            }
        }

        if first {
            for sync in &mut syncs {
                sync.done();
            }
            first = false;
        } else if shared.queue.put_sync().await.is_err() {
            return;
        }
    }
}
