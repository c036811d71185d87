//! Name maps: interface, queue, alias and watchdog lookups.
//!
//! Populated on first use from well-known tables. Initialization is
//! idempotent; concurrent first callers block until the first initializer
//! completes, and a failed initialization is not cached, so a later call
//! retries.

mod maps;

pub use maps::*;
