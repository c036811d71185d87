use std::sync::Arc;

use autometrics::autometrics;
use dashmap::DashMap;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;
use tracing::info;

use crate::codec;
use crate::context::TelemetryContext;
use crate::engine::SubscriptionEngine;
use crate::proto::gnmi;
use crate::proto::gnmi::g_nmi_server::GNmi;
use crate::resolve::Resolver;
use crate::server::check_encoding;
use crate::server::require_target;
use crate::server::AuthPolicy;
use crate::server::ClientSession;
use crate::utils::now_nanos;
use crate::API_SLO;

/// The gNMI service implementation.
pub struct TelemetryService {
    ctx: Arc<TelemetryContext>,
    auth: AuthPolicy,
    clients: Arc<DashMap<String, ClientSession>>,
    models: Vec<gnmi::ModelData>,
}

impl TelemetryService {
    pub fn new(ctx: Arc<TelemetryContext>, auth: AuthPolicy) -> Self {
        Self {
            ctx,
            auth,
            clients: Arc::new(DashMap::new()),
            models: Vec::new(),
        }
    }

    /// Attaches a supported-model list; without one, Capabilities responds
    /// with `unimplemented`.
    pub fn with_models(mut self, models: Vec<gnmi::ModelData>) -> Self {
        self.models = models;
        self
    }

    fn peer_identity<T>(request: &Request<T>) -> Result<String, Status> {
        request
            .remote_addr()
            .map(|addr| addr.to_string())
            .ok_or_else(|| Status::invalid_argument("failed to get peer from ctx"))
    }
}

#[tonic::async_trait]
impl GNmi for TelemetryService {
    #[autometrics(objective = API_SLO)]
    async fn capabilities(
        &self,
        request: Request<gnmi::CapabilityRequest>,
    ) -> Result<Response<gnmi::CapabilityResponse>, Status> {
        self.auth.authenticate(&request)?;
        if self.models.is_empty() {
            return Err(Status::unimplemented("Capabilities() is not implemented"));
        }
        Ok(Response::new(gnmi::CapabilityResponse {
            supported_models: self.models.clone(),
            supported_encodings: vec![
                gnmi::Encoding::Json as i32,
                gnmi::Encoding::JsonIetf as i32,
            ],
            gnmi_version: "0.7.0".to_string(),
        }))
    }

    #[autometrics(objective = API_SLO)]
    async fn get(
        &self,
        request: Request<gnmi::GetRequest>,
    ) -> Result<Response<gnmi::GetResponse>, Status> {
        self.auth.authenticate(&request)?;
        let req = request.into_inner();

        let data_type = gnmi::get_request::DataType::try_from(req.r#type)
            .map_err(|_| Status::unimplemented("unsupported request type"))?;
        if data_type != gnmi::get_request::DataType::All {
            return Err(Status::unimplemented(format!(
                "unsupported request type: {}",
                data_type.as_str_name()
            )));
        }
        check_encoding(req.encoding)?;
        let prefix = require_target(req.prefix.as_ref())?.clone();

        debug!("GetRequest paths: {:?}", req.path);
        let engine = SubscriptionEngine::new(self.ctx.clone(), Some(prefix.clone()));
        let values = engine
            .get(&req.path)
            .await
            .map_err(|e| e.to_status())?;

        let notification = values
            .into_iter()
            .filter_map(|value| match value.kind {
                crate::engine::ValueKind::Update { path, value: val } => {
                    Some(gnmi::Notification {
                        timestamp: value.timestamp,
                        prefix: Some(prefix.clone()),
                        update: vec![gnmi::Update {
                            path: Some(path),
                            val: Some(val),
                            duplicates: 0,
                        }],
                        delete: Vec::new(),
                    })
                }
                _ => None,
            })
            .collect();
        Ok(Response::new(gnmi::GetResponse { notification }))
    }

    #[autometrics(objective = API_SLO)]
    async fn set(
        &self,
        request: Request<gnmi::SetRequest>,
    ) -> Result<Response<gnmi::SetResponse>, Status> {
        self.auth.authenticate(&request)?;
        let req = request.into_inner();
        let prefix = require_target(req.prefix.as_ref())?.clone();
        if prefix.target != "CONFIG_DB" {
            return Err(Status::unimplemented("unsupported request target"));
        }

        let resolver = Resolver::new(self.ctx.clone());
        let mut results = Vec::new();

        for path in &req.delete {
            debug!("Delete path: {:?}", path.elem);
            let (location, shape) = resolver
                .resolve_write(Some(&prefix), path)
                .await
                .map_err(|e| e.to_status())?;
            let value = codec::decode_write_value(&location, None, shape)
                .map_err(|e| e.to_status())?;
            codec::apply_write(&self.ctx, &location, value)
                .await
                .map_err(|e| e.to_status())?;
            results.push(gnmi::UpdateResult {
                path: Some(path.clone()),
                op: gnmi::update_result::Operation::Delete as i32,
            });
        }

        for (updates, op) in [
            (&req.replace, gnmi::update_result::Operation::Replace),
            (&req.update, gnmi::update_result::Operation::Update),
        ] {
            for update in updates.iter() {
                let Some(path) = &update.path else {
                    return Err(Status::invalid_argument("update without a path"));
                };
                debug!("{op:?} path: {:?}", path.elem);
                let (location, shape) = resolver
                    .resolve_write(Some(&prefix), path)
                    .await
                    .map_err(|e| e.to_status())?;
                let value = codec::decode_write_value(&location, update.val.as_ref(), shape)
                    .map_err(|e| e.to_status())?;
                codec::apply_write(&self.ctx, &location, value)
                    .await
                    .map_err(|e| e.to_status())?;
                results.push(gnmi::UpdateResult {
                    path: Some(path.clone()),
                    op: op as i32,
                });
            }
        }

        Ok(Response::new(gnmi::SetResponse {
            prefix: Some(prefix),
            response: results,
            timestamp: now_nanos(),
        }))
    }

    type SubscribeStream = crate::server::SubscribeStream;

    async fn subscribe(
        &self,
        request: Request<Streaming<gnmi::SubscribeRequest>>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        self.auth.authenticate(&request)?;
        let peer = Self::peer_identity(&request)?;
        let mut requests = request.into_inner();

        // The first message must carry the subscription list.
        let first = requests
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("empty subscribe stream"))?;
        let Some(gnmi::subscribe_request::Request::Subscribe(list)) = first.request else {
            return Err(Status::invalid_argument(
                "first subscribe message must carry a subscription list",
            ));
        };
        check_encoding(list.encoding)?;
        require_target(list.prefix.as_ref())?;

        let (session, stream) = ClientSession::start(self.ctx.clone(), list, requests)?;
        let done = session.done_handle();

        // A duplicate peer identity evicts (and closes) its predecessor.
        if let Some(previous) = self.clients.insert(peer.clone(), session) {
            info!("evicting duplicate client {peer}");
            previous.close();
        }
        debug!("client {peer} subscribed");

        // Deregister once the session winds down, unless a newer session
        // already took the slot.
        let clients = self.clients.clone();
        let registered_peer = peer;
        tokio::spawn(async move {
            done.cancelled().await;
            clients.remove_if(&registered_peer, |_, session| session.is_closed());
        });

        Ok(Response::new(stream))
    }
}
