//! Node-path encoding.
//!
//! # Responsibilities
//! - Compute this hop's node id from the inbound span id and node state
//! - Produce the node state handed to each child on outbound calls
//!
//! # Design Decisions
//! - Hop identity is threaded through the 8 span bytes: each hop writes its node state
//!   into the first zero byte, so the byte array is an implicit tree path and the header
//!   size stays constant
//! - Depth ceiling is 8 hops. A span with no free slot maps to the root sentinel, so
//!   distinct deep paths collapse onto the same node id
//! - Node state `00` is never handed out: a zero written into a slot would leave it free

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Serialize, Serializer};

use crate::trace::id::SpanId;

const STATE_PREFIX: &str = "node=";

/// Position token of a node among its parent's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeState(u8);

impl NodeState {
    /// State of a root request.
    pub const ROOT: Self = Self(0x01);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Parse a `tracestate` value of the form `node=XX[-suffix]`.
    ///
    /// `XX` must be exactly two lowercase hex characters.
    pub fn parse_header(value: &str) -> Option<Self> {
        let rest = value.strip_prefix(STATE_PREFIX)?;
        let token = rest.get(..2)?;
        let tail = &rest[2..];
        if !(tail.is_empty() || tail.starts_with('-')) {
            return None;
        }
        if !token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }
        u8::from_str_radix(token, 16).ok().map(Self)
    }

    /// Render as a `tracestate` value.
    pub fn to_header(&self) -> String {
        format!("{STATE_PREFIX}{:02x}", self.0)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::ROOT
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// Derived 8-byte path encoding of this hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; 8]);

impl NodeId {
    /// Sentinel for root requests and for spans whose path is full.
    pub const ROOT: Self = Self([0x01, 0, 0, 0, 0, 0, 0, 0]);

    /// Map the request position into the call tree.
    pub fn map_span(span: &SpanId, state: NodeState) -> Self {
        if !span.is_valid() {
            return Self::ROOT;
        }

        match free_slot(span) {
            Some(index) => {
                let mut bytes = *span.as_bytes();
                bytes[index] = state.value();
                Self(bytes)
            }
            None => {
                tracing::debug!(span_id = %span, "span path is full, using root node id");
                Self::ROOT
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::ROOT
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Index of the first zero byte in the span, if any.
pub fn free_slot(span: &SpanId) -> Option<usize> {
    span.as_bytes().iter().position(|&b| b == 0x00)
}

/// Per-context counter of outbound calls.
///
/// Each call to [`ChildCounter::next_state`] hands out the next child's node state:
/// `01`, `02`, ... `ff`, then wraps back to `01`.
#[derive(Debug, Default)]
pub struct ChildCounter(AtomicU8);

impl ChildCounter {
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn next_state(&self) -> NodeState {
        let previous = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(if n == u8::MAX { 1 } else { n + 1 })
            })
            .unwrap_or_default();
        NodeState(if previous == u8::MAX { 1 } else { previous + 1 })
    }

    /// Number of children handed out so far (modulo wrap).
    pub fn current(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}
