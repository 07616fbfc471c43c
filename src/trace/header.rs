//! `traceparent` / `tracestate` wire format.
//!
//! # Grammar
//! ```text
//! traceparent = version "-" trace-id "-" span-id "-" flags [ "-" suffix ]
//! version     = 2 lowercase hex
//! trace-id    = 32 lowercase hex
//! span-id     = 16 lowercase hex
//! flags       = 2 lowercase hex
//! tracestate  = "node=" 2 lowercase hex [ "-" suffix ]
//! ```
//!
//! # Design Decisions
//! - Versions above `00` are treated as absent, not passed through
//! - Extraction never fails the request; a malformed header yields an empty context
//! - On output the span position carries this hop's node id and flags are always `00`

use axum::http::HeaderMap;
use thiserror::Error;

use crate::trace::context::TracerContext;
use crate::trace::id::{IdError, SpanId, TraceFlags, TraceId, SPAN_ID_HEX_LEN, TRACE_ID_HEX_LEN};
use crate::trace::node::{NodeId, NodeState};

/// Trace parent header name.
pub const TRACEPARENT: &str = "traceparent";

/// Trace state header name.
pub const TRACESTATE: &str = "tracestate";

/// Highest supported version.
pub const MAX_VERSION: u8 = 0;

const VERSION_HEX_LEN: usize = 2;
const FLAGS_HEX_LEN: usize = 2;

/// Reasons a `traceparent` value is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("traceparent does not match version-traceid-spanid-flags")]
    Malformed,

    #[error("unsupported traceparent version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("invalid trace id: {0}")]
    TraceId(IdError),

    #[error("invalid span id: {0}")]
    SpanId(IdError),
}

/// Decoded `traceparent` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub version: u8,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub flags: TraceFlags,
}

impl TraceParent {
    /// Parse and validate a raw `traceparent` value.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let mut parts = value.splitn(5, '-');
        let (Some(version), Some(trace), Some(span), Some(flags)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::Malformed);
        };

        if !is_lower_hex(version, VERSION_HEX_LEN)
            || !is_lower_hex(trace, TRACE_ID_HEX_LEN)
            || !is_lower_hex(span, SPAN_ID_HEX_LEN)
            || !is_lower_hex(flags, FLAGS_HEX_LEN)
        {
            return Err(ParseError::Malformed);
        }

        let version = u8::from_str_radix(version, 16).map_err(|_| ParseError::Malformed)?;
        if version > MAX_VERSION {
            return Err(ParseError::UnsupportedVersion(version));
        }

        let trace_id = TraceId::from_hex(trace).map_err(ParseError::TraceId)?;
        let span_id = SpanId::from_hex(span).map_err(ParseError::SpanId)?;
        let flags = u8::from_str_radix(flags, 16).map_err(|_| ParseError::Malformed)?;

        Ok(Self {
            version,
            trace_id,
            span_id,
            flags: TraceFlags::new(flags),
        })
    }
}

fn is_lower_hex(token: &str, len: usize) -> bool {
    token.len() == len && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Format an outbound `traceparent` value.
pub fn format_traceparent(trace_id: &TraceId, node_id: &NodeId) -> String {
    format!("{MAX_VERSION:02x}-{trace_id}-{node_id}-{}", TraceFlags::NONE)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Extract the trace context carried by inbound headers.
///
/// Returns [`TracerContext::empty`] when `traceparent` is absent or malformed. An absent or
/// malformed `tracestate` defaults the node state to `01`.
pub fn extract(headers: &HeaderMap) -> TracerContext {
    let raw_parent = header_str(headers, TRACEPARENT);
    if raw_parent.is_empty() {
        return TracerContext::empty();
    }

    let parent = match TraceParent::parse(raw_parent) {
        Ok(parent) => parent,
        Err(e) => {
            tracing::debug!(traceparent = %raw_parent, error = %e, "Discarding inbound trace context");
            return TracerContext::empty();
        }
    };

    let state = NodeState::parse_header(header_str(headers, TRACESTATE)).unwrap_or_default();
    TracerContext::from_parent(&parent, state)
}
