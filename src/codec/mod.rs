//! Value codec: concrete locations to wire values and back.
//!
//! Reads assemble one JSON payload (or a scalar) from a list of locations;
//! writes reconcile a desired hash state against the store with a per-field
//! diff.

mod read;
mod write;

pub use read::*;
pub use write::*;

#[cfg(test)]
mod read_test;
#[cfg(test)]
mod write_test;
