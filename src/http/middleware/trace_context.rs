//! Trace context propagation middleware.
//!
//! Per request:
//! extract → classify → reuse or regenerate → encode node path → attach to request →
//! run handler → write response headers once.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::observability::metrics;
use crate::trace::{header, OriginClassifier, TraceGenerator, TraceHandle, TracerContext};

/// State shared by every invocation of the middleware.
#[derive(Debug, Clone)]
pub struct PropagationState {
    pub classifier: Arc<OriginClassifier>,
    pub generator: TraceGenerator,
}

impl PropagationState {
    pub fn new(classifier: OriginClassifier) -> Self {
        let generator = TraceGenerator::new(classifier.host().map(|host| host.addr));
        Self {
            classifier: Arc::new(classifier),
            generator,
        }
    }
}

pub async fn trace_context_middleware(
    State(state): State<PropagationState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Without a peer address the caller cannot be trusted.
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let internal = peer.is_some_and(|ip| state.classifier.is_internal(ip));

    let inbound = header::extract(req.headers());
    let reused = internal && inbound.is_valid();
    let context = inbound.propagate(internal, &state.generator);
    metrics::record_propagation(internal, reused);

    let handle = TraceHandle::new(context);
    let span = handle.span();
    span.in_scope(|| {
        tracing::debug!(
            peer = ?peer,
            internal,
            reused,
            node_state = %handle.context().state(),
            flags = %handle.context().flags(),
            "Trace context established"
        );
    });

    req.extensions_mut().insert(handle.clone());
    let mut response = next.run(req).instrument(span).await;
    handle.write_response_headers(response.headers_mut());
    response
}

impl<S> FromRequestParts<S> for TraceHandle
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(handle) = parts.extensions.get::<TraceHandle>() {
            return Ok(handle.clone());
        }

        tracing::debug!("No trace context on request, using detached root");
        Ok(TraceHandle::new(TracerContext::detached(&TraceGenerator::anonymous())))
    }
}
