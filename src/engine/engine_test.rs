use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::StreamEntry;
use super::SubscriptionEngine;
use super::TelemetryValue;
use super::ValueKind;
use super::ValueReceiver;
use crate::context::TelemetryContext;
use crate::proto::gnmi;
use crate::test_utils::gnmi_path;
use crate::test_utils::gnmi_prefix;
use crate::test_utils::seed_counters_fixture;
use crate::test_utils::ETH68_OID;
use crate::Result;

const WAIT: Duration = Duration::from_secs(5);

async fn fixture_engine() -> Result<(Arc<TelemetryContext>, SubscriptionEngine)> {
    let ctx = TelemetryContext::memory();
    seed_counters_fixture(ctx.registry()).await?;
    let engine = SubscriptionEngine::new(ctx.clone(), Some(gnmi_prefix("COUNTERS_DB")));
    Ok((ctx, engine))
}

async fn next_value(rx: &mut ValueReceiver) -> TelemetryValue {
    timeout(WAIT, rx.get())
        .await
        .expect("value within deadline")
        .expect("queue open")
}

fn update_json(value: &TelemetryValue) -> serde_json::Value {
    match &value.kind {
        ValueKind::Update { value, .. } => match &value.value {
            Some(gnmi::typed_value::Value::JsonIetfVal(bytes)) => {
                serde_json::from_slice(bytes).expect("json payload")
            }
            other => panic!("expected json update, got {other:?}"),
        },
        other => panic!("expected update, got {other:?}"),
    }
}

fn update_string(value: &TelemetryValue) -> String {
    match &value.kind {
        ValueKind::Update { value, .. } => match &value.value {
            Some(gnmi::typed_value::Value::StringVal(s)) => s.clone(),
            other => panic!("expected string update, got {other:?}"),
        },
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_behavior() -> Result<()> {
    let (_ctx, engine) = fixture_engine().await?;
    let values = engine
        .get(&[gnmi_path(&["COUNTERS", "Ethernet68"])])
        .await?;
    assert_eq!(values.len(), 1);
    let json = update_json(&values[0]);
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");
    Ok(())
}

#[tokio::test]
async fn test_poll_behavior() -> Result<()> {
    let (_ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let (poll_tx, poll_rx) = mpsc::channel(1);

    let engine = Arc::new(engine);
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .poll_run(vec![gnmi_path(&["COUNTERS", "Ethernet68"])], tx, poll_rx)
                .await;
        })
    };

    // initial read plus sync
    assert!(matches!(next_value(&mut rx).await.kind, ValueKind::Update { .. }));
    assert!(next_value(&mut rx).await.is_sync());

    // one trigger, one re-read plus sync
    poll_tx.send(()).await.unwrap();
    assert!(matches!(next_value(&mut rx).await.kind, ValueKind::Update { .. }));
    assert!(next_value(&mut rx).await.is_sync());

    // closing the trigger terminates the behavior
    drop(poll_tx);
    timeout(WAIT, runner).await.expect("poll loop ends").unwrap();
    assert!(rx.get().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_stream_on_change_delta_and_dedup() -> Result<()> {
    let (ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    let entries = vec![StreamEntry {
        path: gnmi_path(&["COUNTERS", "Ethernet68"]),
        mode: gnmi::SubscriptionMode::OnChange,
        sample_interval_ns: 0,
    }];
    let engine = Arc::new(engine);
    let runner = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.stream_run(entries, tx, cancel).await })
    };

    // initial emission is the current hash, then the sync marker
    let initial = next_value(&mut rx).await;
    let json = update_json(&initial);
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");
    assert!(next_value(&mut rx).await.is_sync());

    // a field write produces a delta merging the new field into the hash
    let counters = ctx.registry().connector("COUNTERS_DB")?;
    counters
        .hset(&format!("COUNTERS:{ETH68_OID}"), "test_field", "test_value")
        .await?;

    let delta = next_value(&mut rx).await;
    let json = update_json(&delta);
    assert_eq!(json["test_field"], "test_value");
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");

    // a repeated identical write emits nothing further
    counters
        .hset(&format!("COUNTERS:{ETH68_OID}"), "test_field", "test_value")
        .await?;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(rx.try_get().is_none());

    cancel.cancel();
    timeout(WAIT, runner).await.expect("engine stops").unwrap();
    Ok(())
}

#[tokio::test]
async fn test_stream_field_granularity_scalar() -> Result<()> {
    let (ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    let entries = vec![StreamEntry {
        path: gnmi_path(&["COUNTERS", "Ethernet68", "SAI_PORT_STAT_PFC_7_RX_PKTS"]),
        mode: gnmi::SubscriptionMode::OnChange,
        sample_interval_ns: 0,
    }];
    let engine = Arc::new(engine);
    let runner = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.stream_run(entries, tx, cancel).await })
    };

    // first emission counts the sync even without a change
    assert_eq!(update_string(&next_value(&mut rx).await), "2");
    assert!(next_value(&mut rx).await.is_sync());

    let counters = ctx.registry().connector("COUNTERS_DB")?;
    counters
        .hset(
            &format!("COUNTERS:{ETH68_OID}"),
            "SAI_PORT_STAT_PFC_7_RX_PKTS",
            "3",
        )
        .await?;
    assert_eq!(update_string(&next_value(&mut rx).await), "3");

    cancel.cancel();
    timeout(WAIT, runner).await.expect("engine stops").unwrap();
    Ok(())
}

#[tokio::test]
async fn test_stream_sample_shared_ticker() -> Result<()> {
    let (_ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    // two paths on the same interval share one ticker: each tick emits two
    // updates followed by one sync marker
    let interval_ns = Duration::from_millis(1000).as_nanos() as u64;
    let entries = vec![
        StreamEntry {
            path: gnmi_path(&["COUNTERS", "Ethernet68"]),
            mode: gnmi::SubscriptionMode::Sample,
            sample_interval_ns: interval_ns,
        },
        StreamEntry {
            path: gnmi_path(&["COUNTERS", "Ethernet0"]),
            mode: gnmi::SubscriptionMode::Sample,
            sample_interval_ns: interval_ns,
        },
    ];
    let engine = Arc::new(engine);
    let runner = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.stream_run(entries, tx, cancel).await })
    };

    for round in 0..3 {
        let first = next_value(&mut rx).await;
        assert!(
            matches!(first.kind, ValueKind::Update { .. }),
            "round {round}: expected first update"
        );
        let second = next_value(&mut rx).await;
        assert!(
            matches!(second.kind, ValueKind::Update { .. }),
            "round {round}: expected second update"
        );
        let sync = next_value(&mut rx).await;
        assert!(sync.is_sync(), "round {round}: expected sync after the pair");
    }

    cancel.cancel();
    timeout(WAIT, runner).await.expect("engine stops").unwrap();
    Ok(())
}

#[tokio::test]
async fn test_on_change_unsupported_is_fatal() -> Result<()> {
    let engine = SubscriptionEngine::new(TelemetryContext::memory(), Some(gnmi_prefix("OTHERS")));
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    let entries = vec![StreamEntry {
        path: gnmi_path(&["proc", "uptime"]),
        mode: gnmi::SubscriptionMode::OnChange,
        sample_interval_ns: 0,
    }];
    engine.stream_run(entries, tx, cancel).await;
    assert!(next_value(&mut rx).await.is_fatal());
    Ok(())
}

#[tokio::test]
async fn test_sample_below_minimum_is_fatal() -> Result<()> {
    let (_ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    let entries = vec![StreamEntry {
        path: gnmi_path(&["COUNTERS", "Ethernet68"]),
        mode: gnmi::SubscriptionMode::Sample,
        sample_interval_ns: Duration::from_millis(10).as_nanos() as u64,
    }];
    engine.stream_run(entries, tx, cancel).await;
    assert!(next_value(&mut rx).await.is_fatal());
    Ok(())
}

#[tokio::test]
async fn test_cancellation_drains_queue() -> Result<()> {
    let (_ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    let entries = vec![StreamEntry {
        path: gnmi_path(&["COUNTERS", "Ethernet68"]),
        mode: gnmi::SubscriptionMode::OnChange,
        sample_interval_ns: 0,
    }];
    let engine = Arc::new(engine);
    let runner = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.stream_run(entries, tx, cancel).await })
    };

    // wait for initial + sync, then stop
    assert!(matches!(next_value(&mut rx).await.kind, ValueKind::Update { .. }));
    assert!(next_value(&mut rx).await.is_sync());
    cancel.cancel();

    timeout(WAIT, runner).await.expect("engine stops").unwrap();
    // with all watchers joined and senders dropped, the queue reads closed
    let drained = timeout(WAIT, async {
        while rx.get().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_target_defined_prefers_on_change_for_store_paths() -> Result<()> {
    let (ctx, engine) = fixture_engine().await?;
    let (tx, mut rx) = engine.queue();
    let cancel = CancellationToken::new();

    let entries = vec![StreamEntry {
        path: gnmi_path(&["COUNTERS", "Ethernet68"]),
        mode: gnmi::SubscriptionMode::TargetDefined,
        sample_interval_ns: 0,
    }];
    let engine = Arc::new(engine);
    let runner = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.stream_run(entries, tx, cancel).await })
    };

    assert!(matches!(next_value(&mut rx).await.kind, ValueKind::Update { .. }));
    assert!(next_value(&mut rx).await.is_sync());

    // on-change serving: no further traffic without a mutation
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(rx.try_get().is_none());

    let counters = ctx.registry().connector("COUNTERS_DB")?;
    counters
        .hset(&format!("COUNTERS:{ETH68_OID}"), "x", "1")
        .await?;
    assert!(matches!(next_value(&mut rx).await.kind, ValueKind::Update { .. }));

    cancel.cancel();
    timeout(WAIT, runner).await.expect("engine stops").unwrap();
    Ok(())
}
