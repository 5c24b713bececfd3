//! Process-wide tracing/logging setup shared by the binaries.

pub mod tracing;

pub use self::tracing::{init, LogFormat};
