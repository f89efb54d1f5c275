//! SNMP value types and conversions

use crate::oid::Oid;
use std::fmt;

/// A typed SNMP value as carried in a variable binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    /// Null value (also used for request bindings)
    Null,
    /// Integer32
    Integer(i64),
    /// Octet string (raw bytes, often printable)
    OctetString(Vec<u8>),
    /// Object identifier
    Oid(Oid),
    /// IPv4 address
    IpAddress([u8; 4]),
    /// Counter (32-bit, wrapping)
    Counter32(u32),
    /// Gauge (32-bit)
    Gauge32(u32),
    /// Time ticks (hundredths of seconds)
    TimeTicks(u32),
    /// Opaque data
    Opaque(Vec<u8>),
    /// Counter (64-bit, wrapping)
    Counter64(u64),
    /// No such object (v2c exception)
    NoSuchObject,
    /// No such instance (v2c exception)
    NoSuchInstance,
    /// End of MIB view (v2c exception)
    EndOfMibView,
}

impl SnmpValue {
    /// Whether the value is a v2c exception marker
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// The numeric reading of the value, when it has one
    ///
    /// Only the syntaxes the collector records as samples convert; strings,
    /// OIDs and addresses do not.
    #[must_use]
    pub fn as_sample(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => Some(i64::from(*v)),
            #[allow(clippy::cast_possible_wrap)]
            Self::Counter64(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Short syntax name for log messages
    #[must_use]
    pub const fn syntax_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::OctetString(_) => "octet-string",
            Self::Oid(_) => "oid",
            Self::IpAddress(_) => "ip-address",
            Self::Counter32(_) => "counter32",
            Self::Gauge32(_) => "gauge32",
            Self::TimeTicks(_) => "timeticks",
            Self::Opaque(_) => "opaque",
            Self::Counter64(_) => "counter64",
            Self::NoSuchObject => "no-such-object",
            Self::NoSuchInstance => "no-such-instance",
            Self::EndOfMibView => "end-of-mib-view",
        }
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => {
                    for b in bytes {
                        write!(f, "{b:02x}")?;
                    }
                    Ok(())
                }
            },
            Self::Oid(oid) => write!(f, "{oid}"),
            Self::IpAddress(octets) => write!(
                f,
                "{}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            ),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => write!(f, "{v}"),
            Self::Opaque(bytes) => write!(f, "opaque({} bytes)", bytes.len()),
            Self::Counter64(v) => write!(f, "{v}"),
            Self::NoSuchObject => write!(f, "noSuchObject"),
            Self::NoSuchInstance => write!(f, "noSuchInstance"),
            Self::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SnmpValue::Integer(42).to_string(), "42");
        assert_eq!(
            SnmpValue::OctetString(b"eth0".to_vec()).to_string(),
            "eth0"
        );
        assert_eq!(SnmpValue::IpAddress([192, 0, 2, 1]).to_string(), "192.0.2.1");
        assert_eq!(SnmpValue::Counter64(10_000_000_000).to_string(), "10000000000");
        assert_eq!(SnmpValue::Null.to_string(), "null");
        assert_eq!(SnmpValue::NoSuchObject.to_string(), "noSuchObject");
    }

    #[test]
    fn test_exception_markers() {
        assert!(SnmpValue::NoSuchInstance.is_exception());
        assert!(SnmpValue::EndOfMibView.is_exception());
        assert!(!SnmpValue::Null.is_exception());
        assert!(!SnmpValue::Integer(0).is_exception());
    }

    #[test]
    fn test_as_sample() {
        assert_eq!(SnmpValue::Integer(-3).as_sample(), Some(-3));
        assert_eq!(SnmpValue::Counter32(7).as_sample(), Some(7));
        assert_eq!(SnmpValue::TimeTicks(123_456).as_sample(), Some(123_456));
        assert_eq!(SnmpValue::Counter64(9).as_sample(), Some(9));
        assert_eq!(SnmpValue::OctetString(b"x".to_vec()).as_sample(), None);
        assert_eq!(SnmpValue::Null.as_sample(), None);
    }
}
