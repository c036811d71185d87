//! Shared harness for integration tests: an in-process gNMI server over the
//! memory store adaptor, plus client-side helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use sonic_telemetry::context::TelemetryContext;
use sonic_telemetry::proto::gnmi;
use sonic_telemetry::proto::gnmi::g_nmi_client::GNmiClient;
use sonic_telemetry::proto::gnmi::g_nmi_server::GNmiServer;
use sonic_telemetry::server::{AuthPolicy, TelemetryService};
use sonic_telemetry::test_utils::seed_counters_fixture;
use sonic_telemetry::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

pub struct TestServer {
    pub ctx: Arc<TelemetryContext>,
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Starts a gNMI server on an ephemeral port, seeded with the counters
    /// fixture.
    pub async fn start() -> Result<Self> {
        let ctx = TelemetryContext::memory();
        seed_counters_fixture(ctx.registry()).await?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let service = TelemetryService::new(ctx.clone(), AuthPolicy::open());
        let handle = tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(GNmiServer::new(service))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;
        });

        Ok(Self { ctx, addr, handle })
    }

    pub async fn client(&self) -> GNmiClient<Channel> {
        GNmiClient::connect(format!("http://{}", self.addr))
            .await
            .expect("connect to test server")
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn path(elems: &[&str]) -> gnmi::Path {
    gnmi::Path {
        origin: String::new(),
        elem: elems
            .iter()
            .map(|name| gnmi::PathElem {
                name: name.to_string(),
                key: Default::default(),
            })
            .collect(),
        target: String::new(),
    }
}

pub fn prefix(target: &str) -> gnmi::Path {
    gnmi::Path {
        origin: String::new(),
        elem: Vec::new(),
        target: target.to_string(),
    }
}

pub fn json_of(val: &gnmi::TypedValue) -> serde_json::Value {
    match &val.value {
        Some(gnmi::typed_value::Value::JsonIetfVal(bytes)) => {
            serde_json::from_slice(bytes).expect("json payload")
        }
        other => panic!("expected json value, got {other:?}"),
    }
}
