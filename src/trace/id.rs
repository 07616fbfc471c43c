//! Fixed-width trace and span identifiers.
//!
//! # Responsibilities
//! - Decode 32/16 character hex strings into 16/8 byte identifiers
//! - Encode identifiers back to lowercase, fixed-width hex
//! - Reject the all-zero value, which marks an unset identifier

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Hex length of a trace id.
pub const TRACE_ID_HEX_LEN: usize = 32;

/// Hex length of a span id.
pub const SPAN_ID_HEX_LEN: usize = 16;

/// Errors raised while decoding an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must be {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex value")]
    InvalidHex,

    #[error("invalid trace ID")]
    InvalidTraceId,

    #[error("invalid span ID")]
    InvalidSpanId,
}

fn decode_fixed<const N: usize>(hex_str: &str) -> Result<[u8; N], IdError> {
    if hex_str.len() != N * 2 {
        return Err(IdError::InvalidLength {
            expected: N * 2,
            actual: hex_str.len(),
        });
    }

    let mut bytes = [0u8; N];
    hex::decode_to_slice(hex_str, &mut bytes).map_err(|_| IdError::InvalidHex)?;
    Ok(bytes)
}

/// 16-byte identifier shared by every hop of one call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// The unset trace id.
    pub const INVALID: Self = Self([0; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Decode a 32 character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, IdError> {
        let id = Self(decode_fixed::<16>(hex_str)?);
        if !id.is_valid() {
            return Err(IdError::InvalidTraceId);
        }
        Ok(id)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 16]
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TraceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 8-byte identifier received from the caller.
///
/// Never regenerated per hop: it is the raw material the node-path encoder writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// The unset span id.
    pub const INVALID: Self = Self([0; 8]);

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Decode a 16 character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, IdError> {
        let id = Self(decode_fixed::<8>(hex_str)?);
        if !id.is_valid() {
            return Err(IdError::InvalidSpanId);
        }
        Ok(id)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 8]
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SpanId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Trace flags. Carried opaquely; no sampling decision is made here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const NONE: Self = Self(0x00);
    pub const SAMPLED: Self = Self(0x01);

    pub const fn new(flags: u8) -> Self {
        Self(flags)
    }

    pub fn is_sampled(&self) -> bool {
        self.0 & Self::SAMPLED.0 != 0
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}
