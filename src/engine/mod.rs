//! The per-subscription engine.
//!
//! Serves the three query modes (one-shot, long-poll, streaming) over a
//! bounded output queue of timestamped values. Streaming fans out into
//! per-path watchers: field pollers, keyspace-notification watchers and
//! shared sample tickers.

mod binding;
mod engine;
mod queue;
mod value;
mod watchers;

pub use binding::*;
pub use engine::*;
pub use queue::*;
pub use value::*;

#[cfg(test)]
mod engine_test;
