//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Propagation middleware produces:
//!     → logging.rs (structured log events inside the request span)
//!     → metrics.rs (reused vs. generated trace counters)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Trace identity reaches log lines through the request span, not through
//!   per-call arguments
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
