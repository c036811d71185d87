//! The non-store provider: process-local computed values behind the
//! `OTHERS` target. Proc-like readers plus the build version file. Served
//! for one-shot reads and periodic sampling; on-change is not supported.

mod proc_readers;
mod provider;

pub use proc_readers::*;
pub use provider::*;
