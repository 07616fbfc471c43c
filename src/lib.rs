//! Trace-context propagation for HTTP call chains.
//!
//! Each inbound request gets a trace identity (reused from a trusted caller or freshly
//! generated), a node id encoding its position in the call tree, and response and
//! outbound headers carrying both.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod trace;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use trace::{TraceHandle, TracerContext};
