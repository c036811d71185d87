mod common;

use std::time::Duration;

use common::{json_of, path, prefix, TestServer};
use sonic_telemetry::proto::gnmi;
use sonic_telemetry::test_utils::ETH68_OID;
use sonic_telemetry::Result;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Code;

const WAIT: Duration = Duration::from_secs(10);

fn subscribe_request(list: gnmi::SubscriptionList) -> gnmi::SubscribeRequest {
    gnmi::SubscribeRequest {
        request: Some(gnmi::subscribe_request::Request::Subscribe(list)),
    }
}

fn poll_request() -> gnmi::SubscribeRequest {
    gnmi::SubscribeRequest {
        request: Some(gnmi::subscribe_request::Request::Poll(gnmi::Poll {})),
    }
}

async fn next_response(
    stream: &mut tonic::codec::Streaming<gnmi::SubscribeResponse>,
) -> gnmi::subscribe_response::Response {
    timeout(WAIT, stream.message())
        .await
        .expect("response within deadline")
        .expect("stream healthy")
        .expect("stream open")
        .response
        .expect("response set")
}

#[tokio::test]
async fn test_capabilities_unimplemented_without_models() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let status = client
        .capabilities(gnmi::CapabilityRequest {})
        .await
        .expect_err("no models");
    assert_eq!(status.code(), Code::Unimplemented);
    Ok(())
}

#[tokio::test]
async fn test_get_wildcard_ports_keyed_by_alias() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let response = client
        .get(gnmi::GetRequest {
            prefix: Some(prefix("COUNTERS_DB")),
            path: vec![path(&["COUNTERS", "Ethernet*"])],
            r#type: gnmi::get_request::DataType::All as i32,
            encoding: gnmi::Encoding::JsonIetf as i32,
            use_models: Vec::new(),
        })
        .await?
        .into_inner();

    assert_eq!(response.notification.len(), 1);
    let update = &response.notification[0].update[0];
    let json = json_of(update.val.as_ref().unwrap());
    let object = json.as_object().unwrap();
    assert!(object.contains_key("Ethernet0/1"));
    assert!(object.contains_key("Ethernet4/1"));
    assert!(object.contains_key("Ethernet68/1"));
    assert_eq!(object["Ethernet68/1"]["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");
    Ok(())
}

#[tokio::test]
async fn test_get_scalar_leaf_through_alias() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let response = client
        .get(gnmi::GetRequest {
            prefix: Some(prefix("COUNTERS_DB")),
            path: vec![path(&[
                "COUNTERS",
                "Ethernet68/1",
                "SAI_PORT_STAT_PFC_7_RX_PKTS",
            ])],
            r#type: 0,
            encoding: gnmi::Encoding::JsonIetf as i32,
            use_models: Vec::new(),
        })
        .await?
        .into_inner();

    let update = &response.notification[0].update[0];
    match &update.val.as_ref().unwrap().value {
        Some(gnmi::typed_value::Value::StringVal(s)) => assert_eq!(s, "2"),
        other => panic!("expected scalar string, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_subscribe_once() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let (req_tx, req_rx) = mpsc::channel(4);
    req_tx
        .send(subscribe_request(gnmi::SubscriptionList {
            prefix: Some(prefix("COUNTERS_DB")),
            subscription: vec![gnmi::Subscription {
                path: Some(path(&["COUNTERS", "Ethernet68"])),
                mode: gnmi::SubscriptionMode::TargetDefined as i32,
                sample_interval: 0,
                suppress_redundant: false,
                heartbeat_interval: 0,
            }],
            mode: gnmi::subscription_list::Mode::Once as i32,
            encoding: gnmi::Encoding::JsonIetf as i32,
            updates_only: false,
        }))
        .await
        .unwrap();

    let mut stream = client
        .subscribe(ReceiverStream::new(req_rx))
        .await?
        .into_inner();

    let gnmi::subscribe_response::Response::Update(notification) =
        next_response(&mut stream).await
    else {
        panic!("expected update first");
    };
    let json = json_of(notification.update[0].val.as_ref().unwrap());
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");

    match next_response(&mut stream).await {
        gnmi::subscribe_response::Response::SyncResponse(true) => {}
        other => panic!("expected sync, got {other:?}"),
    }

    // ONCE closes the stream after the sync
    let end = timeout(WAIT, stream.message()).await.expect("closes");
    assert!(matches!(end, Ok(None)));
    Ok(())
}

#[tokio::test]
async fn test_subscribe_stream_on_change() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let (req_tx, req_rx) = mpsc::channel(4);
    req_tx
        .send(subscribe_request(gnmi::SubscriptionList {
            prefix: Some(prefix("COUNTERS_DB")),
            subscription: vec![gnmi::Subscription {
                path: Some(path(&["COUNTERS", "Ethernet68"])),
                mode: gnmi::SubscriptionMode::OnChange as i32,
                sample_interval: 0,
                suppress_redundant: false,
                heartbeat_interval: 0,
            }],
            mode: gnmi::subscription_list::Mode::Stream as i32,
            encoding: gnmi::Encoding::JsonIetf as i32,
            updates_only: false,
        }))
        .await
        .unwrap();

    let mut stream = client
        .subscribe(ReceiverStream::new(req_rx))
        .await?
        .into_inner();

    // initial value, then sync
    let gnmi::subscribe_response::Response::Update(initial) = next_response(&mut stream).await
    else {
        panic!("expected initial update");
    };
    let json = json_of(initial.update[0].val.as_ref().unwrap());
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");
    assert!(matches!(
        next_response(&mut stream).await,
        gnmi::subscribe_response::Response::SyncResponse(true)
    ));

    // mutate a field; the delta merges it into the port hash
    let counters = server.ctx.registry().connector("COUNTERS_DB")?;
    counters
        .hset(&format!("COUNTERS:{ETH68_OID}"), "test_field", "test_value")
        .await?;

    let gnmi::subscribe_response::Response::Update(delta) = next_response(&mut stream).await
    else {
        panic!("expected delta update");
    };
    let json = json_of(delta.update[0].val.as_ref().unwrap());
    assert_eq!(json["test_field"], "test_value");
    assert_eq!(json["SAI_PORT_STAT_PFC_7_RX_PKTS"], "2");

    // an identical write is de-duplicated
    counters
        .hset(&format!("COUNTERS:{ETH68_OID}"), "test_field", "test_value")
        .await?;
    let silent = timeout(Duration::from_millis(600), stream.message()).await;
    assert!(silent.is_err(), "duplicate write must not produce output");
    Ok(())
}

#[tokio::test]
async fn test_subscribe_poll_mode() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let (req_tx, req_rx) = mpsc::channel(4);
    req_tx
        .send(subscribe_request(gnmi::SubscriptionList {
            prefix: Some(prefix("COUNTERS_DB")),
            subscription: vec![gnmi::Subscription {
                path: Some(path(&["COUNTERS", "Ethernet68"])),
                mode: gnmi::SubscriptionMode::TargetDefined as i32,
                sample_interval: 0,
                suppress_redundant: false,
                heartbeat_interval: 0,
            }],
            mode: gnmi::subscription_list::Mode::Poll as i32,
            encoding: gnmi::Encoding::JsonIetf as i32,
            updates_only: false,
        }))
        .await
        .unwrap();

    let mut stream = client
        .subscribe(ReceiverStream::new(req_rx))
        .await?
        .into_inner();

    // initial read and sync
    assert!(matches!(
        next_response(&mut stream).await,
        gnmi::subscribe_response::Response::Update(_)
    ));
    assert!(matches!(
        next_response(&mut stream).await,
        gnmi::subscribe_response::Response::SyncResponse(true)
    ));

    // each poll trigger re-reads and syncs again
    for _ in 0..2 {
        req_tx.send(poll_request()).await.unwrap();
        assert!(matches!(
            next_response(&mut stream).await,
            gnmi::subscribe_response::Response::Update(_)
        ));
        assert!(matches!(
            next_response(&mut stream).await,
            gnmi::subscribe_response::Response::SyncResponse(true)
        ));
    }
    Ok(())
}

#[tokio::test]
async fn test_subscribe_rejects_non_json_encoding() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let (req_tx, req_rx) = mpsc::channel(4);
    req_tx
        .send(subscribe_request(gnmi::SubscriptionList {
            prefix: Some(prefix("COUNTERS_DB")),
            subscription: vec![gnmi::Subscription {
                path: Some(path(&["COUNTERS", "Ethernet68"])),
                mode: 0,
                sample_interval: 0,
                suppress_redundant: false,
                heartbeat_interval: 0,
            }],
            mode: gnmi::subscription_list::Mode::Stream as i32,
            encoding: gnmi::Encoding::Proto as i32,
            updates_only: false,
        }))
        .await
        .unwrap();

    let result = client.subscribe(ReceiverStream::new(req_rx)).await;
    match result {
        Err(status) => assert_eq!(status.code(), Code::Unimplemented),
        Ok(response) => {
            let mut stream = response.into_inner();
            let status = timeout(WAIT, stream.message())
                .await
                .expect("deadline")
                .expect_err("stream must fail");
            assert_eq!(status.code(), Code::Unimplemented);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_set_write_reconcile_end_to_end() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let store = server.ctx.registry().connector("CONFIG_DB")?;
    store
        .hset("TELEMETRY_CLIENT|Global", "src_ip", "30.57.185.38")
        .await?;

    let response = client
        .set(gnmi::SetRequest {
            prefix: Some(prefix("CONFIG_DB")),
            delete: Vec::new(),
            replace: Vec::new(),
            update: vec![gnmi::Update {
                path: Some(path(&["TELEMETRY_CLIENT", "Global"])),
                val: Some(gnmi::TypedValue {
                    value: Some(gnmi::typed_value::Value::JsonIetfVal(
                        br#"{"retry_interval":"5","encoding":"JSON_IETF"}"#.to_vec(),
                    )),
                }),
                duplicates: 0,
            }],
        })
        .await?
        .into_inner();
    assert_eq!(response.response.len(), 1);

    let hash = store.hgetall("TELEMETRY_CLIENT|Global").await?;
    assert_eq!(hash.len(), 2);
    assert_eq!(hash["retry_interval"], "5");
    assert_eq!(hash["encoding"], "JSON_IETF");
    Ok(())
}

#[tokio::test]
async fn test_subscribe_sample_stream() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.client().await;

    let interval_ns = Duration::from_millis(1000).as_nanos() as u64;
    let (req_tx, req_rx) = mpsc::channel(4);
    req_tx
        .send(subscribe_request(gnmi::SubscriptionList {
            prefix: Some(prefix("COUNTERS_DB")),
            subscription: vec![
                gnmi::Subscription {
                    path: Some(path(&["COUNTERS", "Ethernet68"])),
                    mode: gnmi::SubscriptionMode::Sample as i32,
                    sample_interval: interval_ns,
                    suppress_redundant: false,
                    heartbeat_interval: 0,
                },
                gnmi::Subscription {
                    path: Some(path(&["COUNTERS", "Ethernet0"])),
                    mode: gnmi::SubscriptionMode::Sample as i32,
                    sample_interval: interval_ns,
                    suppress_redundant: false,
                    heartbeat_interval: 0,
                },
            ],
            mode: gnmi::subscription_list::Mode::Stream as i32,
            encoding: gnmi::Encoding::JsonIetf as i32,
            updates_only: false,
        }))
        .await
        .unwrap();

    let mut stream = client
        .subscribe(ReceiverStream::new(req_rx))
        .await?
        .into_inner();

    // two rounds of: two updates then one sync
    for round in 0..2 {
        for slot in 0..2 {
            assert!(
                matches!(
                    next_response(&mut stream).await,
                    gnmi::subscribe_response::Response::Update(_)
                ),
                "round {round} update {slot}"
            );
        }
        assert!(
            matches!(
                next_response(&mut stream).await,
                gnmi::subscribe_response::Response::SyncResponse(true)
            ),
            "round {round} sync"
        );
    }
    Ok(())
}
