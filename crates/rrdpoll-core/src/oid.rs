//! Object identifier type and name resolution
//!
//! OIDs are bounded sequences of unsigned sub-identifiers. Textual forms
//! accepted here are dotted numerics (`1.3.6.1.2.1.1.3.0`, optional leading
//! dot) and a built-in table of common MIB-II names (`sysUpTime.0`,
//! `ifInOctets`, ...). Full MIB compilation is out of scope.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of sub-identifiers in an OID
pub const MAX_OID_LEN: usize = 128;

/// An SNMP object identifier
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Oid {
    subs: Vec<u32>,
}

impl Oid {
    /// Create an OID from sub-identifiers, enforcing the length bound
    pub fn new(subs: Vec<u32>) -> Result<Self> {
        if subs.len() > MAX_OID_LEN {
            return Err(Error::config(format!(
                "oid too long: {} sub-identifiers (max {MAX_OID_LEN})",
                subs.len()
            )));
        }
        Ok(Self { subs })
    }

    /// Create an OID from a slice of sub-identifiers
    pub fn from_slice(subs: &[u32]) -> Result<Self> {
        Self::new(subs.to_vec())
    }

    /// Parse a dotted numeric OID, with or without a leading dot
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.strip_prefix('.').unwrap_or(text);
        if trimmed.is_empty() {
            return Err(Error::config("empty oid"));
        }

        let mut subs = Vec::new();
        for part in trimmed.split('.') {
            let sub = part
                .parse::<u32>()
                .map_err(|_| Error::config(format!("invalid oid component '{part}' in '{text}'")))?;
            subs.push(sub);
        }
        Self::new(subs)
    }

    /// Number of sub-identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Whether the OID has no sub-identifiers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// The sub-identifiers
    #[must_use]
    pub fn subs(&self) -> &[u32] {
        &self.subs
    }

    /// The last sub-identifier, if any
    #[must_use]
    pub fn last_sub(&self) -> Option<u32> {
        self.subs.last().copied()
    }

    /// A new OID with one sub-identifier appended
    pub fn child(&self, sub: u32) -> Result<Self> {
        let mut subs = self.subs.clone();
        subs.push(sub);
        Self::new(subs)
    }

    /// Whether `self` is a strict or equal prefix of `other`
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.subs.len() >= self.subs.len() && other.subs[..self.subs.len()] == self.subs[..]
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for sub in &self.subs {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{sub}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Built-in MIB-II names understood by [`resolve`]
///
/// Table entries cover the system and interfaces groups commonly used for
/// collection; anything else must be written numerically.
const WELL_KNOWN: &[(&str, &[u32])] = &[
    ("sysDescr", &[1, 3, 6, 1, 2, 1, 1, 1]),
    ("sysObjectID", &[1, 3, 6, 1, 2, 1, 1, 2]),
    ("sysUpTime", &[1, 3, 6, 1, 2, 1, 1, 3]),
    ("sysContact", &[1, 3, 6, 1, 2, 1, 1, 4]),
    ("sysName", &[1, 3, 6, 1, 2, 1, 1, 5]),
    ("sysLocation", &[1, 3, 6, 1, 2, 1, 1, 6]),
    ("sysServices", &[1, 3, 6, 1, 2, 1, 1, 7]),
    ("ifNumber", &[1, 3, 6, 1, 2, 1, 2, 1]),
    ("ifTable", &[1, 3, 6, 1, 2, 1, 2, 2]),
    ("ifEntry", &[1, 3, 6, 1, 2, 1, 2, 2, 1]),
    ("ifIndex", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 1]),
    ("ifDescr", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2]),
    ("ifType", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 3]),
    ("ifMtu", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 4]),
    ("ifSpeed", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 5]),
    ("ifPhysAddress", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 6]),
    ("ifAdminStatus", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 7]),
    ("ifOperStatus", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 8]),
    ("ifLastChange", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 9]),
    ("ifInOctets", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 10]),
    ("ifInUcastPkts", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 11]),
    ("ifInDiscards", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 13]),
    ("ifInErrors", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 14]),
    ("ifOutOctets", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 16]),
    ("ifOutUcastPkts", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 17]),
    ("ifOutDiscards", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 19]),
    ("ifOutErrors", &[1, 3, 6, 1, 2, 1, 2, 2, 1, 20]),
    ("ipForwarding", &[1, 3, 6, 1, 2, 1, 4, 1]),
    ("ipInReceives", &[1, 3, 6, 1, 2, 1, 4, 3]),
    ("tcpActiveOpens", &[1, 3, 6, 1, 2, 1, 6, 5]),
    ("tcpCurrEstab", &[1, 3, 6, 1, 2, 1, 6, 9]),
    ("udpInDatagrams", &[1, 3, 6, 1, 2, 1, 7, 1]),
    ("udpOutDatagrams", &[1, 3, 6, 1, 2, 1, 7, 4]),
];

/// Resolve an OID name to its numeric form
///
/// Accepts dotted numerics and well-known names with an optional numeric
/// suffix (`sysUpTime.0`, `ifDescr.2`).
pub fn resolve(text: &str) -> Result<Oid> {
    let trimmed = text.strip_prefix('.').unwrap_or(text);
    if trimmed.is_empty() {
        return Err(Error::config("empty oid"));
    }

    // All-numeric is the common case
    if trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.')
    {
        return Oid::parse(trimmed);
    }

    let (name, suffix) = match trimmed.find('.') {
        Some(pos) => (&trimmed[..pos], Some(&trimmed[pos + 1..])),
        None => (trimmed, None),
    };

    let base = WELL_KNOWN
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, subs)| *subs)
        .ok_or_else(|| Error::config(format!("unknown oid name: {name}")))?;

    let mut subs = base.to_vec();
    if let Some(suffix) = suffix {
        for part in suffix.split('.') {
            let sub = part.parse::<u32>().map_err(|_| {
                Error::config(format!("invalid oid suffix '{suffix}' on name '{name}'"))
            })?;
            subs.push(sub);
        }
    }
    Oid::new(subs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric() {
        let oid = Oid::parse("1.3.6.1.2.1.1.3.0").unwrap();
        assert_eq!(oid.subs(), &[1, 3, 6, 1, 2, 1, 1, 3, 0]);
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.3.0");

        let dotted = Oid::parse(".1.3.6.1").unwrap();
        assert_eq!(dotted.subs(), &[1, 3, 6, 1]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Oid::parse("").is_err());
        assert!(Oid::parse("1.3.x.1").is_err());
        assert!(Oid::parse("1..3").is_err());
    }

    #[test]
    fn test_length_bound() {
        let subs = vec![1u32; MAX_OID_LEN + 1];
        assert!(Oid::new(subs).is_err());
        assert!(Oid::new(vec![1u32; MAX_OID_LEN]).is_ok());
    }

    #[test]
    fn test_prefix_and_child() {
        let table = Oid::parse("1.3.6.1.2.1.2.2.1.2").unwrap();
        let row = table.child(7).unwrap();
        assert!(table.is_prefix_of(&row));
        assert!(table.is_prefix_of(&table));
        assert!(!row.is_prefix_of(&table));
        assert_eq!(row.last_sub(), Some(7));
        assert_eq!(row.len(), table.len() + 1);
    }

    #[test]
    fn test_resolve_names() {
        assert_eq!(
            resolve("sysUpTime.0").unwrap(),
            Oid::parse("1.3.6.1.2.1.1.3.0").unwrap()
        );
        assert_eq!(
            resolve("ifInOctets").unwrap(),
            Oid::parse("1.3.6.1.2.1.2.2.1.10").unwrap()
        );
        assert_eq!(
            resolve("1.3.6.1.2.1.1.5.0").unwrap(),
            Oid::parse("1.3.6.1.2.1.1.5.0").unwrap()
        );
        assert!(resolve("noSuchName").is_err());
        assert!(resolve("ifDescr.x").is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = Oid::parse("1.3.6.1.2.1.2.2.1.2.1").unwrap();
        let b = Oid::parse("1.3.6.1.2.1.2.2.1.2.2").unwrap();
        let c = Oid::parse("1.3.6.1.2.1.2.2.1.3").unwrap();
        assert!(a < b);
        assert!(b < c);
    }
}
