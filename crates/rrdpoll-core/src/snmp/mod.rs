//! SNMP v1/v2c wire types and codec
//!
//! This module provides the protocol-level pieces of the engine: typed
//! values, PDU encode/decode over BER, and the value comparison used by
//! table-query predicates.
//!
//! - [`values`] - SNMP value types
//! - [`ber`] - ASN.1 BER primitives over fixed-size packets
//! - [`pdu`] - PDU envelope encode/decode
//! - [`matches`] - query predicate value comparison

use std::fmt;

pub mod ber;
pub mod matches;
pub mod pdu;
pub mod values;

pub use matches::value_matches;
pub use pdu::{Pdu, VarBind};
pub use values::SnmpValue;

/// Maximum encoded packet size, send and receive
pub const MAX_PACKET: usize = 0x1000;

/// Maximum variable bindings per outgoing PDU
pub const MAX_BINDINGS: usize = 32;

/// Default SNMP agent port
pub const DEFAULT_PORT: u16 = 161;

/// SNMP protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnmpVersion {
    /// SNMPv1
    V1,
    /// SNMPv2c (community-based)
    V2c,
}

impl SnmpVersion {
    /// Wire representation (version field of the message header)
    #[must_use]
    pub const fn wire(self) -> i64 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
        }
    }

    /// Decode the wire version field
    #[must_use]
    pub const fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            _ => None,
        }
    }
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "1"),
            Self::V2c => write!(f, "2c"),
        }
    }
}

/// PDU type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduType {
    /// GetRequest
    Get,
    /// GetNextRequest
    GetNext,
    /// GetResponse
    Response,
    /// SetRequest
    Set,
}

impl PduType {
    /// BER tag for this PDU type
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Get => 0xA0,
            Self::GetNext => 0xA1,
            Self::Response => 0xA2,
            Self::Set => 0xA3,
        }
    }

    /// Decode a BER PDU tag
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::Get),
            0xA1 => Some(Self::GetNext),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::Set),
            _ => None,
        }
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::GetNext => write!(f, "get-next"),
            Self::Response => write!(f, "response"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Completion code delivered to request owners
///
/// `NoError` carries a value; everything else means the binding failed for
/// this cycle. `Timeout` is the local code for retry exhaustion, cancel at
/// cycle boundaries and refused enqueues; the rest mirror the SNMP
/// error-status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpCode {
    /// Successful response
    NoError,
    /// Response would not fit (agent side)
    TooBig,
    /// No such name / walked past the table
    NoSuchName,
    /// Bad value in a set request
    BadValue,
    /// Variable is read-only
    ReadOnly,
    /// General agent error
    GenErr,
    /// Local failure: retries exhausted, cancelled cycle or refused send
    Timeout,
    /// Any other error-status value
    Other(i64),
}

impl SnmpCode {
    /// Decode an error-status field
    #[must_use]
    pub const fn from_wire(value: i64) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            other => Self::Other(other),
        }
    }

    /// Wire representation for the error-status field
    #[must_use]
    pub const fn wire(self) -> i64 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::Timeout => -1,
            Self::Other(v) => v,
        }
    }

    /// Whether this code reports a failure
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::NoError)
    }
}

impl fmt::Display for SnmpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "no error"),
            Self::TooBig => write!(f, "response too big"),
            Self::NoSuchName => write!(f, "no such name"),
            Self::BadValue => write!(f, "bad value"),
            Self::ReadOnly => write!(f, "read only"),
            Self::GenErr => write!(f, "general error"),
            Self::Timeout => write!(f, "timed out"),
            Self::Other(v) => write!(f, "snmp error {v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_wire_round_trip() {
        assert_eq!(SnmpVersion::from_wire(SnmpVersion::V1.wire()), Some(SnmpVersion::V1));
        assert_eq!(SnmpVersion::from_wire(SnmpVersion::V2c.wire()), Some(SnmpVersion::V2c));
        assert_eq!(SnmpVersion::from_wire(3), None);
    }

    #[test]
    fn test_pdu_type_tags() {
        assert_eq!(PduType::Get.tag(), 0xA0);
        assert_eq!(PduType::from_tag(0xA2), Some(PduType::Response));
        assert_eq!(PduType::from_tag(0xA5), None);
    }

    #[test]
    fn test_code_classification() {
        assert!(!SnmpCode::NoError.is_error());
        assert!(SnmpCode::NoSuchName.is_error());
        assert!(SnmpCode::Timeout.is_error());
        assert_eq!(SnmpCode::from_wire(2), SnmpCode::NoSuchName);
        assert_eq!(SnmpCode::from_wire(17), SnmpCode::Other(17));
    }
}
