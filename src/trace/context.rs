//! Request-scoped trace context.
//!
//! # Responsibilities
//! - Hold the trace identity of one request (trace id, inbound span, node state, node id)
//! - Decide between reusing inbound context and starting a new root trace
//! - Produce response headers, outbound headers and the log projection
//!
//! # Design Decisions
//! - Created at ingress, owned by one request, dropped when the request completes
//! - Shared with the handler through [`TraceHandle`] (an `Arc`) stored in request extensions
//! - The only mutable part after ingress is the child counter used for outbound calls

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use serde::Serialize;

use crate::trace::generate::TraceGenerator;
use crate::trace::header::{format_traceparent, TraceParent, TRACEPARENT, TRACESTATE};
use crate::trace::id::{SpanId, TraceFlags, TraceId};
use crate::trace::node::{ChildCounter, NodeId, NodeState};

/// Trace identity of a single request.
///
/// An empty context (all-zero trace and span) is the "no trusted context" state.
#[derive(Debug, Default)]
pub struct TracerContext {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
    state: NodeState,
    node_id: NodeId,
    children: ChildCounter,
    internal: bool,
}

/// Sanitized projection attached to log lines.
///
/// `span_id` carries the node id of this hop, not the raw inbound span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceField {
    pub trace_id: String,
    pub span_id: String,
}

/// Header values for one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundHeaders {
    pub traceparent: String,
    pub tracestate: String,
}

impl TracerContext {
    /// Context carrying no identity.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parent(parent: &TraceParent, state: NodeState) -> Self {
        Self {
            trace_id: parent.trace_id,
            span_id: parent.span_id,
            flags: parent.flags,
            state,
            ..Self::default()
        }
    }

    /// Root context for code running outside the propagation middleware.
    pub fn detached(generator: &TraceGenerator) -> Self {
        Self::empty().propagate(false, generator)
    }

    /// Settle the identity of this hop.
    ///
    /// Inbound context is reused only when the caller is internal and the context is
    /// valid. Otherwise it is discarded and a new root trace is generated.
    ///
    /// An external caller's span is dropped along with its trace id, even when valid, so
    /// an external hop always maps to the root node id instead of extending the caller's
    /// path.
    pub fn propagate(mut self, internal: bool, generator: &TraceGenerator) -> Self {
        self.internal = internal;
        if !internal || !self.is_valid() {
            self.trace_id = generator.generate();
            self.span_id = SpanId::INVALID;
            self.flags = TraceFlags::NONE;
            self.state = NodeState::ROOT;
        }
        self.node_id = NodeId::map_span(&self.span_id, self.state);
        self
    }

    /// Valid iff both trace and span ids are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// `traceparent` value for this hop.
    pub fn traceparent(&self) -> String {
        format_traceparent(&self.trace_id, &self.node_id)
    }

    /// `tracestate` value for this hop, only emitted for internal requests.
    pub fn tracestate(&self) -> Option<String> {
        self.internal.then(|| self.state.to_header())
    }

    /// Headers for the next outbound call. Advances the child counter.
    pub fn next(&self) -> OutboundHeaders {
        let child = self.children.next_state();
        OutboundHeaders {
            traceparent: self.traceparent(),
            tracestate: child.to_header(),
        }
    }

    pub fn sanitize(&self) -> TraceField {
        TraceField {
            trace_id: self.trace_id.to_string(),
            span_id: self.node_id.to_string(),
        }
    }
}

struct HandleInner {
    context: TracerContext,
    flushed: AtomicBool,
}

/// Shared, request-scoped handle to a [`TracerContext`].
#[derive(Clone)]
pub struct TraceHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHandle")
            .field("context", &self.inner.context)
            .field("flushed", &self.inner.flushed.load(Ordering::Relaxed))
            .finish()
    }
}

impl TraceHandle {
    pub fn new(context: TracerContext) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                context,
                flushed: AtomicBool::new(false),
            }),
        }
    }

    pub fn context(&self) -> &TracerContext {
        &self.inner.context
    }

    /// Headers for the next outbound call. Call once per outbound request.
    pub fn next(&self) -> OutboundHeaders {
        self.inner.context.next()
    }

    pub fn field(&self) -> TraceField {
        self.inner.context.sanitize()
    }

    /// Span annotating every event of the request with its trace identity.
    pub fn span(&self) -> tracing::Span {
        let ctx = &self.inner.context;
        tracing::info_span!(
            "request",
            trace_id = %ctx.trace_id(),
            span_id = %ctx.node_id(),
            internal = ctx.is_internal(),
        )
    }

    /// Whether response headers have already been written.
    pub fn is_flushed(&self) -> bool {
        self.inner.flushed.load(Ordering::Acquire)
    }

    /// Write `traceparent` (and `tracestate` for internal requests) onto a response.
    ///
    /// Only the first call writes; later calls return `false` and leave `headers` untouched.
    pub fn write_response_headers(&self, headers: &mut HeaderMap) -> bool {
        if self.inner.flushed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let ctx = &self.inner.context;
        if let Ok(value) = HeaderValue::from_str(&ctx.traceparent()) {
            headers.append(TRACEPARENT, value);
        }
        if let Some(state) = ctx.tracestate() {
            if let Ok(value) = HeaderValue::from_str(&state) {
                headers.append(TRACESTATE, value);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";

    fn inbound(span: &str, state: u8) -> TracerContext {
        let parent = TraceParent::parse(&format!("00-{TRACE}-{span}-00")).unwrap();
        TracerContext::from_parent(&parent, NodeState::new(state))
    }

    #[test]
    fn internal_valid_context_is_reused() {
        let ctx = inbound("a1b2c30000000000", 3).propagate(true, &TraceGenerator::anonymous());
        assert_eq!(ctx.trace_id().to_string(), TRACE);
        assert_eq!(ctx.state(), NodeState::new(3));
        assert_eq!(ctx.node_id().to_string(), "a1b2c30300000000");
        assert_eq!(ctx.traceparent(), format!("00-{TRACE}-a1b2c30300000000-00"));
        assert_eq!(ctx.tracestate().as_deref(), Some("node=03"));
    }

    #[test]
    fn reused_context_keeps_inbound_flags() {
        let parent = TraceParent::parse(&format!("00-{TRACE}-a1b2c30000000000-01")).unwrap();
        let ctx = TracerContext::from_parent(&parent, NodeState::ROOT)
            .propagate(true, &TraceGenerator::anonymous());
        assert!(ctx.flags().is_sampled());
        // Outbound headers never advertise sampling.
        assert!(ctx.traceparent().ends_with("-00"));

        let ctx = TracerContext::from_parent(&parent, NodeState::ROOT)
            .propagate(false, &TraceGenerator::anonymous());
        assert_eq!(ctx.flags(), TraceFlags::NONE);
    }

    #[test]
    fn external_context_is_discarded() {
        let ctx = inbound("a1b2c30000000000", 3).propagate(false, &TraceGenerator::anonymous());
        assert!(ctx.trace_id().is_valid());
        assert_ne!(ctx.trace_id().to_string(), TRACE);
        assert_eq!(ctx.state(), NodeState::ROOT);
        assert_eq!(ctx.node_id(), NodeId::ROOT);
        assert_eq!(ctx.tracestate(), None);
    }

    #[test]
    fn invalid_internal_context_gets_new_root() {
        let ctx = TracerContext::empty().propagate(true, &TraceGenerator::anonymous());
        assert!(ctx.trace_id().is_valid());
        assert_eq!(ctx.node_id(), NodeId::ROOT);
        assert_eq!(ctx.tracestate().as_deref(), Some("node=01"));
    }

    #[test]
    fn next_advances_child_state() {
        let ctx = inbound("a1b2c30000000000", 3).propagate(true, &TraceGenerator::anonymous());
        let first = ctx.next();
        let second = ctx.next();
        assert_eq!(first.traceparent, ctx.traceparent());
        assert_eq!(first.tracestate, "node=01");
        assert_eq!(second.tracestate, "node=02");
    }

    #[test]
    fn sanitize_uses_node_id() {
        let ctx = inbound("a1b2c30000000000", 2).propagate(true, &TraceGenerator::anonymous());
        let field = ctx.sanitize();
        assert_eq!(field.trace_id, TRACE);
        assert_eq!(field.span_id, "a1b2c30200000000");
        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            serde_json::json!({ "trace_id": TRACE, "span_id": "a1b2c30200000000" })
        );
    }

    #[test]
    fn detached_context_is_a_root() {
        let ctx = TracerContext::detached(&TraceGenerator::anonymous());
        assert!(ctx.trace_id().is_valid());
        assert!(!ctx.is_internal());
        assert_eq!(ctx.node_id(), NodeId::ROOT);
    }

    #[test]
    fn response_headers_written_once() {
        let ctx = inbound("a1b2c30000000000", 3).propagate(true, &TraceGenerator::anonymous());
        let handle = TraceHandle::new(ctx);
        let mut headers = HeaderMap::new();

        assert!(handle.write_response_headers(&mut headers));
        assert!(!handle.write_response_headers(&mut headers));
        assert!(handle.is_flushed());

        assert_eq!(headers.get_all(TRACEPARENT).iter().count(), 1);
        assert_eq!(headers.get_all(TRACESTATE).iter().count(), 1);
        assert_eq!(headers.get(TRACESTATE).unwrap(), "node=03");
    }

    #[test]
    fn external_response_omits_state() {
        let handle = TraceHandle::new(TracerContext::detached(&TraceGenerator::anonymous()));
        let mut headers = HeaderMap::new();
        handle.write_response_headers(&mut headers);
        assert!(headers.get(TRACEPARENT).is_some());
        assert!(headers.get(TRACESTATE).is_none());
    }
}
