//! rdfwd: the connection-forwarding engine.
//!
//! See [`engine`] for the `Forwarder` and its submodules. The `rdfwd-host`
//! binary (`src/main.rs`) wires the engine to a demonstration TCP transport
//! and a TOML config file; none of that host plumbing is exposed here.

pub mod engine;

pub use engine::{CommandSink, Forwarder};
