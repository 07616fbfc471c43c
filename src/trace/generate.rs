//! Trace id synthesis for requests without trusted context.
//!
//! A generated trace id is 32 hex characters laid out as:
//!
//! ```text
//! FFFFFFFF TTTTTTTTTTTTT 0 RRRRRRRRRR
//! │        │             │ └ 5 random bytes
//! │        │             └ separator digit
//! │        └ milliseconds since the epoch, 13 decimal digits, zero-padded
//! └ host IPv4 fingerprint (or 4 random bytes)
//! ```
//!
//! The timestamp is padded and wrapped at 10^13 so the layout always totals 32 characters.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::trace::id::TraceId;

const TIMESTAMP_DIGITS: usize = 13;
const TIMESTAMP_MODULUS: u128 = 10_u128.pow(TIMESTAMP_DIGITS as u32);
const SEPARATOR: char = '0';
const RANDOM_SUFFIX_BYTES: usize = 5;

/// Builds fresh trace ids for the boundary hop.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceGenerator {
    fingerprint: Option<IpAddr>,
}

impl TraceGenerator {
    /// Generator fingerprinting ids with the given host address.
    pub fn new(fingerprint: Option<IpAddr>) -> Self {
        Self { fingerprint }
    }

    /// Generator using a random fingerprint.
    pub fn anonymous() -> Self {
        Self { fingerprint: None }
    }

    pub fn generate(&self) -> TraceId {
        self.generate_at(SystemTime::now())
    }

    pub fn generate_at(&self, now: SystemTime) -> TraceId {
        let millis = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            % TIMESTAMP_MODULUS;

        let mut suffix = [0u8; RANDOM_SUFFIX_BYTES];
        rand::thread_rng().fill_bytes(&mut suffix);

        let raw = format!(
            "{}{:0width$}{}{}",
            self.fingerprint_hex(),
            millis,
            SEPARATOR,
            hex::encode(suffix),
            width = TIMESTAMP_DIGITS,
        );

        TraceId::from_hex(&raw).unwrap_or_else(|e| {
            tracing::warn!(raw = %raw, error = %e, "Generated trace id did not decode, using random id");
            random_trace_id()
        })
    }

    fn fingerprint_hex(&self) -> String {
        match self.fingerprint {
            Some(addr) => ip_to_hex(addr),
            None => {
                let mut bytes = [0u8; 4];
                rand::thread_rng().fill_bytes(&mut bytes);
                hex::encode(bytes)
            }
        }
    }
}

/// Last four octets of the address as 8 hex characters.
pub fn ip_to_hex(addr: IpAddr) -> String {
    let octets = match addr {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => {
            let o = v6.octets();
            [o[12], o[13], o[14], o[15]]
        }
    };
    hex::encode(octets)
}

fn random_trace_id() -> TraceId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] |= 0x01;
    TraceId::from_bytes(bytes)
}
