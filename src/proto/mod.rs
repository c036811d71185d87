//! Wire types and RPC service plumbing.
//!
//! The gNMI subset this service speaks, plus the dial-out `Publish` service.
//! Kept as committed prost/tonic code in the shape `tonic-build` emits so the
//! build does not depend on a protobuf toolchain.

pub mod gnmi;
pub mod gnmi_dialout;
