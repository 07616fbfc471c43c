//! Trace-context protocol.
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → header.rs (traceparent/tracestate grammar, candidate identity)
//!     → origin.rs (trusted vs. untrusted caller)
//!     → generate.rs (fresh trace id, only when untrusted or invalid)
//!     → node.rs (this hop's node id, next hop's node state)
//!     → context.rs (request-scoped TracerContext + TraceHandle)
//! ```
//!
//! # Design Decisions
//! - Nothing in this module fails a request: every fallible step degrades to an
//!   empty context or a freshly generated root trace
//! - The span id is not regenerated per hop; each hop writes its node state into the
//!   first free byte of the inbound span id (8-hop depth ceiling)

pub mod context;
pub mod generate;
pub mod header;
pub mod id;
pub mod node;
pub mod origin;

pub use context::{OutboundHeaders, TraceField, TraceHandle, TracerContext};
pub use generate::TraceGenerator;
pub use header::{TraceParent, TRACEPARENT, TRACESTATE};
pub use id::{IdError, SpanId, TraceFlags, TraceId};
pub use node::{ChildCounter, NodeId, NodeState};
pub use origin::{HostNetwork, OriginClassifier};
