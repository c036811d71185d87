//! # sonic-telemetry
//!
//! Model-driven streaming telemetry for a switch operating system.
//!
//! The service exposes a gNMI-style RPC surface (Get, Set, Subscribe,
//! Capabilities) over the switch's key/value stores, and a dial-out
//! publisher that pushes subscription output to configured collectors.
//!
//! ## Features
//! - **Virtual paths**: wildcarded, vendor-aliased counter paths expanded
//!   to concrete store locations
//! - **Streaming**: on-change, periodic-sample and target-defined modes
//!   over a bounded, timestamp-ordered output queue
//! - **Dial-out**: ranked collector groups with retry-interval failover,
//!   reconfigured live from the configuration store
//! - **Pluggable stores**: redis-backed in production, in-memory for tests
//!   and embedding
//!
//! ## Quick Start
//! ```no_run
//! use sonic_telemetry::config::TelemetryConfig;
//! use sonic_telemetry::context::TelemetryContext;
//! use sonic_telemetry::server::TelemetryServer;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> sonic_telemetry::Result<()> {
//!     let config = TelemetryConfig::load()?.validate()?;
//!     let ctx = TelemetryContext::open(&config.store, config.engine.clone()).await?;
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(());
//!     TelemetryServer::new(ctx, config).serve(shutdown_rx).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod dialout;
pub mod engine;
pub mod namemaps;
pub mod nonstore;
pub mod proto;
pub mod resolve;
pub mod server;
pub mod store;

mod errors;

pub use errors::*;
#[doc(hidden)]
pub use store::*;

#[doc(hidden)]
pub mod utils;

//-----------------------------------------------------------
// Test utils
#[doc(hidden)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;

#[doc(hidden)]
pub const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms100, ObjectivePercentile::P99);
