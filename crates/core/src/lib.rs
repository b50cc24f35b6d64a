//! hundun-core
//!
//! Core library for persistent-id coverage instrumentation and profile-guided
//! debloating of compiler IR.
//!
//! This crate defines the IR model, the flat-file stores that coordinate
//! independent compiler invocations (id files, profile log, snapshots), the
//! instrumentation and debloat phases, and the run-time coverage slot.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (CLI, compiler plugins, etc.).

pub mod config;
pub mod model;
pub mod runtime;
pub mod services;
pub mod store;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
