//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (peer address recorded)
//!     → server.rs (Axum setup, routes)
//!     → middleware/trace_context.rs (extract, classify, attach TraceHandle)
//!     → handler (reads TraceHandle, logs inside the request span)
//!     → client.rs (outbound calls carry the next child state)
//!     → trace headers written once on the response
//! ```

pub mod client;
pub mod error;
pub mod middleware;
pub mod response;
pub mod server;

pub use client::{inject_headers, TracedClient};
pub use error::{ApiError, ErrorCode, FieldError, ResponseError};
pub use server::HttpServer;
