//! Source URI parsing
//!
//! `snmp://community@host[:port]/oid[?query-oid[=match]]`
//!
//! Schemes pick the protocol version (`snmp` is v1, `snmp2` and `snmp2c`
//! are v2c). The host component may carry up to 16 comma-separated
//! alternate hostnames; the OID path and the optional table-query
//! predicate accept numeric OIDs or the built-in symbolic names.

use crate::error::{Error, Result};
use crate::poll::MAX_ALTERNATES;
use crate::snmp::{DEFAULT_PORT, SnmpVersion};

/// A parsed `<field>.source` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUri {
    /// Protocol version from the scheme
    pub version: SnmpVersion,
    /// Community string; defaults to `public`
    pub community: String,
    /// Hostnames in failover order
    pub hostnames: Vec<String>,
    /// Agent port; defaults to 161
    pub port: u16,
    /// The field OID text (resolved later)
    pub oid_text: String,
    /// Optional table query: column OID text and match text
    ///
    /// A missing match text (`?oid` with no `=`) matches any row.
    pub query: Option<(String, Option<String>)>,
}

fn valid_hostname(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
}

/// Split an optional `:port` suffix off a host entry
///
/// Only a single colon followed by digits counts; anything else (such as a
/// bare IPv6 literal) is treated as part of the hostname.
fn split_port(entry: &str) -> Result<(&str, Option<u16>)> {
    let colons = entry.matches(':').count();
    if colons != 1 {
        return Ok((entry, None));
    }
    let Some((host, port_text)) = entry.rsplit_once(':') else {
        return Ok((entry, None));
    };
    if port_text.is_empty() || !port_text.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::config(format!("invalid port in snmp uri: {entry}")));
    }
    let port = port_text
        .parse::<u16>()
        .map_err(|_| Error::config(format!("invalid port in snmp uri: {entry}")))?;
    Ok((host, Some(port)))
}

/// Parse a source URI
pub fn parse_source_uri(uri: &str) -> Result<SourceUri> {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return Err(Error::config(format!("invalid snmp uri: {uri}")));
    };

    let version = match scheme.to_ascii_lowercase().as_str() {
        "snmp" => SnmpVersion::V1,
        "snmp2" | "snmp2c" => SnmpVersion::V2c,
        other => {
            return Err(Error::config(format!(
                "unsupported scheme in snmp uri: {other}"
            )));
        }
    };

    let Some((authority, path)) = rest.split_once('/') else {
        return Err(Error::config(format!("no oid specified in snmp uri: {uri}")));
    };

    let (community, hosts_part) = match authority.split_once('@') {
        Some((user, hosts)) if !user.is_empty() => (user.to_string(), hosts),
        Some((_, hosts)) => ("public".to_string(), hosts),
        None => ("public".to_string(), authority),
    };

    let mut hostnames = Vec::new();
    let mut port = DEFAULT_PORT;
    for entry in hosts_part.split(',') {
        let (host, entry_port) = split_port(entry.trim())?;
        if !valid_hostname(host) {
            return Err(Error::config(format!(
                "invalid host in snmp uri: '{entry}'"
            )));
        }
        if let Some(entry_port) = entry_port {
            port = entry_port;
        }
        hostnames.push(host.to_string());
    }
    if hostnames.is_empty() {
        return Err(Error::config(format!("no host specified in snmp uri: {uri}")));
    }
    if hostnames.len() > MAX_ALTERNATES {
        return Err(Error::config(format!(
            "too many alternate hosts in snmp uri ({} > {MAX_ALTERNATES})",
            hostnames.len()
        )));
    }

    let (oid_text, query) = match path.split_once('?') {
        Some((oid_text, query_text)) => {
            let query = match query_text.split_once('=') {
                Some((query_oid, match_text)) => {
                    (query_oid.to_string(), Some(match_text.to_string()))
                }
                None => (query_text.to_string(), None),
            };
            if query.0.is_empty() {
                return Err(Error::config(format!(
                    "empty query oid in snmp uri: {uri}"
                )));
            }
            (oid_text, Some(query))
        }
        None => (path, None),
    };
    if oid_text.is_empty() {
        return Err(Error::config(format!("no oid specified in snmp uri: {uri}")));
    }

    Ok(SourceUri {
        version,
        community,
        hostnames,
        port,
        oid_text: oid_text.to_string(),
        query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_uri() {
        let parsed = parse_source_uri("snmp2c://public@router1/1.3.6.1.2.1.1.3.0").unwrap();
        assert_eq!(parsed.version, SnmpVersion::V2c);
        assert_eq!(parsed.community, "public");
        assert_eq!(parsed.hostnames, vec!["router1".to_string()]);
        assert_eq!(parsed.port, 161);
        assert_eq!(parsed.oid_text, "1.3.6.1.2.1.1.3.0");
        assert!(parsed.query.is_none());
    }

    #[test]
    fn test_scheme_versions() {
        assert_eq!(
            parse_source_uri("snmp://c@h/1.3").unwrap().version,
            SnmpVersion::V1
        );
        assert_eq!(
            parse_source_uri("snmp2://c@h/1.3").unwrap().version,
            SnmpVersion::V2c
        );
        assert_eq!(
            parse_source_uri("SNMP2C://c@h/1.3").unwrap().version,
            SnmpVersion::V2c
        );
        assert!(parse_source_uri("http://c@h/1.3").is_err());
        assert!(parse_source_uri("not a uri").is_err());
    }

    #[test]
    fn test_defaults_without_community() {
        let parsed = parse_source_uri("snmp://192.0.2.1/sysUpTime.0").unwrap();
        assert_eq!(parsed.community, "public");
        assert_eq!(parsed.hostnames, vec!["192.0.2.1".to_string()]);
    }

    #[test]
    fn test_port_and_alternates() {
        let parsed =
            parse_source_uri("snmp2c://private@a.example,b.example:1161/1.3.6.1.2.1.1.3.0")
                .unwrap();
        assert_eq!(parsed.community, "private");
        assert_eq!(
            parsed.hostnames,
            vec!["a.example".to_string(), "b.example".to_string()]
        );
        assert_eq!(parsed.port, 1161);
    }

    #[test]
    fn test_too_many_alternates() {
        let hosts: Vec<String> = (0..17).map(|i| format!("h{i}")).collect();
        let uri = format!("snmp://c@{}/1.3", hosts.join(","));
        assert!(parse_source_uri(&uri).is_err());
    }

    #[test]
    fn test_table_query_forms() {
        let parsed = parse_source_uri(
            "snmp2c://public@sw1/1.3.6.1.2.1.2.2.1.10?1.3.6.1.2.1.2.2.1.2=eth0",
        )
        .unwrap();
        assert_eq!(
            parsed.query,
            Some(("1.3.6.1.2.1.2.2.1.2".to_string(), Some("eth0".to_string())))
        );

        // No '=': match any row
        let parsed =
            parse_source_uri("snmp2c://public@sw1/ifInOctets?ifDescr").unwrap();
        assert_eq!(parsed.query, Some(("ifDescr".to_string(), None)));

        // '=' with empty text: match the empty string
        let parsed =
            parse_source_uri("snmp2c://public@sw1/ifInOctets?ifDescr=").unwrap();
        assert_eq!(
            parsed.query,
            Some(("ifDescr".to_string(), Some(String::new())))
        );
    }

    #[test]
    fn test_missing_pieces_rejected() {
        assert!(parse_source_uri("snmp://community@/1.3").is_err());
        assert!(parse_source_uri("snmp://host").is_err());
        assert!(parse_source_uri("snmp://host/").is_err());
        assert!(parse_source_uri("snmp://h/1.3?").is_err());
        assert!(parse_source_uri("snmp://h:notaport/1.3").is_err());
    }
}
