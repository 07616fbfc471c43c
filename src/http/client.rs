//! Outbound calls to other internal services.
//!
//! # Responsibilities
//! - Inject `traceparent` / `tracestate` derived from the current request
//! - Forward the request with a bounded timeout
//!
//! # Design Decisions
//! - Each outbound call consumes exactly one child state; injecting twice for the
//!   same call would skip a sibling position
//! - Existing trace headers on the outbound request are replaced, never appended

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, Response},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::trace::{OutboundHeaders, TraceHandle, TRACEPARENT, TRACESTATE};

/// Errors from an outbound call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
}

/// Set the trace headers for one outbound call.
pub fn inject_headers(trace: &TraceHandle, headers: &mut HeaderMap) -> OutboundHeaders {
    let outbound = trace.next();
    if let Ok(value) = HeaderValue::from_str(&outbound.traceparent) {
        headers.insert(TRACEPARENT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&outbound.tracestate) {
        headers.insert(TRACESTATE, value);
    }
    outbound
}

/// HTTP client that propagates trace context on every call.
#[derive(Clone)]
pub struct TracedClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl TracedClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }

    /// Send `req` carrying the next child position of `trace`.
    pub async fn send(
        &self,
        trace: &TraceHandle,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, ClientError> {
        let outbound = inject_headers(trace, req.headers_mut());
        tracing::debug!(
            uri = %req.uri(),
            tracestate = %outbound.tracestate,
            "Forwarding request downstream"
        );

        let response: Response<Incoming> = tokio::time::timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))??;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
