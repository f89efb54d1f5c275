//! Query predicate value comparison
//!
//! Decides whether a table cell matches the configured query text. Numeric
//! texts accept the C-style bases (`0x` hex, leading-zero octal, decimal),
//! matching what the configuration has always allowed.

use crate::oid;
use crate::snmp::SnmpValue;
use std::net::Ipv4Addr;

fn parse_c_u64(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse::<u64>().ok()
    }
}

fn parse_c_i64(text: &str) -> Option<i64> {
    if let Some(rest) = text.strip_prefix('-') {
        parse_c_u64(rest)
            .and_then(|v| i64::try_from(v).ok())
            .map(|v| -v)
    } else {
        parse_c_u64(text).and_then(|v| i64::try_from(v).ok())
    }
}

/// Whether an SNMP value matches the query text
///
/// Null and the v2c exception markers match only the empty string; numeric
/// syntaxes match numerically; strings match byte-wise; OID texts are
/// name-resolved before comparing. Anything else never matches.
#[must_use]
pub fn value_matches(value: &SnmpValue, text: &str) -> bool {
    match value {
        SnmpValue::Null
        | SnmpValue::NoSuchObject
        | SnmpValue::NoSuchInstance
        | SnmpValue::EndOfMibView => text.is_empty(),

        SnmpValue::Integer(v) => parse_c_i64(text) == Some(*v),

        SnmpValue::OctetString(bytes) => bytes.as_slice() == text.as_bytes(),

        SnmpValue::Oid(value_oid) => match oid::resolve(text) {
            Ok(parsed) => parsed == *value_oid,
            Err(_) => false,
        },

        SnmpValue::IpAddress(octets) => match text.parse::<Ipv4Addr>() {
            Ok(addr) => addr.octets() == *octets,
            Err(_) => false,
        },

        SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
            match parse_c_u64(text) {
                Some(parsed) => parsed <= u64::from(u32::MAX) && parsed == u64::from(*v),
                None => false,
            }
        }

        SnmpValue::Counter64(v) => parse_c_u64(text) == Some(*v),

        SnmpValue::Opaque(_) => false,
    }
}
