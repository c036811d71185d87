//! The dial-out publisher: runs the subscription engine against
//! configuration-driven subscriptions and pushes the output to a ranked
//! list of collectors, failing over on connection loss.

mod collector;
mod config;
mod publisher;

pub use collector::*;
pub use config::*;
pub use publisher::*;
