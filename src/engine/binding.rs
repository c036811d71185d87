use std::sync::Arc;
use std::time::Duration;

use crate::codec;
use crate::context::TelemetryContext;
use crate::errors::ResolveError;
use crate::nonstore;
use crate::nonstore::NonStoreSource;
use crate::proto::gnmi;
use crate::resolve::path_tokens;
use crate::resolve::Resolver;
use crate::resolve::TablePath;
use crate::Result;

/// What a request path resolved to: store locations, or a non-store source.
#[derive(Debug, Clone)]
pub enum PathBinding {
    Store { locations: Vec<TablePath> },
    NonStore { source: NonStoreSource },
}

/// The data source's answer to "how can this path be subscribed".
#[derive(Debug, Clone, Copy)]
pub struct SubscribeSupport {
    pub on_change: bool,
    pub min_interval: Duration,
    /// The source's preference when the client leaves the choice open
    pub prefers_on_change: bool,
}

impl PathBinding {
    /// Resolves a request path against the store resolver or the non-store
    /// provider, depending on the target.
    pub async fn resolve(
        resolver: &Resolver,
        prefix: Option<&gnmi::Path>,
        path: &gnmi::Path,
    ) -> Result<Self> {
        let full = crate::resolve::join_path(prefix, path);
        if full.target == crate::store::NON_DB_TARGET {
            let tokens = path_tokens(&full)?;
            let source = nonstore::lookup_source(&tokens)
                .ok_or_else(|| ResolveError::InvalidPath(tokens.join("/")))?;
            return Ok(PathBinding::NonStore { source });
        }
        let locations = resolver.resolve(prefix, path).await?;
        if locations.is_empty() {
            return Err(ResolveError::InvalidPath(format!("{:?}", path.elem)).into());
        }
        Ok(PathBinding::Store { locations })
    }

    /// Subscription capabilities of this binding. Store paths support
    /// on-change and prefer it; non-store sources sample only.
    pub fn subscribe_support(&self, ctx: &TelemetryContext) -> SubscribeSupport {
        match self {
            PathBinding::Store { .. } => SubscribeSupport {
                on_change: true,
                min_interval: ctx.engine().min_sample_interval(),
                prefers_on_change: true,
            },
            PathBinding::NonStore { .. } => SubscribeSupport {
                on_change: false,
                min_interval: ctx.engine().min_sample_interval(),
                prefers_on_change: false,
            },
        }
    }

    /// One-shot read of the bound data.
    pub async fn read(&self, ctx: &Arc<TelemetryContext>) -> Result<gnmi::TypedValue> {
        match self {
            PathBinding::Store { locations } => codec::read_paths(ctx, locations).await,
            PathBinding::NonStore { source } => {
                let payload = ctx.nonstore().read(*source).await?;
                Ok(gnmi::TypedValue {
                    value: Some(gnmi::typed_value::Value::JsonIetfVal(payload)),
                })
            }
        }
    }

    /// Whether every location names exactly one explicit field, which picks
    /// the field-polling on-change watcher over the keyspace watcher.
    pub fn is_field_granularity(&self) -> bool {
        match self {
            PathBinding::Store { locations } => locations
                .iter()
                .all(|tp| tp.fields.single().is_some()),
            PathBinding::NonStore { .. } => false,
        }
    }
}
