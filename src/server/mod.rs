//! The inbound RPC frontend: Capabilities/Get/Set/Subscribe over gNMI.
//!
//! Stateless apart from the client registry. Each Subscribe call gets its
//! own engine instance and bounded queue; the frontend drains the queue to
//! the wire and converts fatal markers into stream-terminating status codes.

mod auth;
mod service;
mod session;
mod telemetry_server;

pub use auth::*;
pub use service::*;
pub use session::*;
pub use telemetry_server::*;
