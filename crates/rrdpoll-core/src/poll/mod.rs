//! Poll groups and items
//!
//! A poll group owns the items sampled together on one cadence and the
//! persistence targets their values feed. Items reference hosts indirectly
//! through their hostname list; the engine's host table deduplicates the
//! actual endpoints.

use crate::engine::CompositeId;
use crate::oid::Oid;
use crate::snmp::{DEFAULT_PORT, SnmpVersion};
use std::fmt;
use std::path::PathBuf;

pub mod query;
pub mod scheduler;

/// Upper bound on alternate hostnames per item
pub const MAX_ALTERNATES: usize = 16;

/// A recorded sample value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    /// No value this cycle; persisted as the RRD `U` sentinel
    Unset,
    /// Integer sample
    Integer(i64),
    /// Floating point sample
    Float(f64),
}

impl SampleValue {
    /// Whether a value was recorded
    #[must_use]
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "U"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.4}"),
        }
    }
}

/// Table-lookup declaration on an item
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// The table column walked to find the row
    pub oid: Oid,
    /// The cell text a row must match; `None` matches any row
    pub match_text: Option<String>,
}

/// Progress of the table lookup within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryState {
    /// No lookup in progress
    #[default]
    Idle,
    /// Walking the match column with GetNext
    Searching,
    /// Fast path: re-checking the remembered row index
    Pairing,
    /// Row confirmed, reading the value column
    Valuing,
}

/// One configured datapoint
#[derive(Debug)]
pub struct PollItem {
    /// Field name, also the RRD data source name
    pub field: String,
    /// Label written to raw files instead of the field name
    pub reference: Option<String>,

    /// Alternate hostnames, tried round-robin on failure
    pub hostnames: Vec<String>,
    /// Index of the hostname used next cycle
    pub hostindex: usize,
    /// Agent UDP port
    pub port: u16,
    /// Community string
    pub community: String,
    /// Protocol version
    pub version: SnmpVersion,

    /// The value column OID
    pub field_oid: Oid,
    /// Table lookup, when this item is indirect
    pub query: Option<QuerySpec>,

    /// Current cycle's value
    pub value: SampleValue,
    /// In-flight value read
    pub field_request: Option<CompositeId>,
    /// In-flight table-query step
    pub query_request: Option<CompositeId>,
    /// Lookup progress
    pub query_state: QueryState,
    /// Last row of the match column that matched, across cycles
    pub query_last: Option<Oid>,
    /// The match succeeded this cycle
    pub query_matched: bool,

    /// When this cycle's request went out (engine ms)
    pub last_request: u64,
    /// When the value (or its absence) was established (engine ms)
    pub last_polled: u64,
}

impl PollItem {
    /// Create an item; hostname lists are clamped to [`MAX_ALTERNATES`]
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        hostnames: Vec<String>,
        community: impl Into<String>,
        version: SnmpVersion,
        field_oid: Oid,
    ) -> Self {
        let mut hostnames = hostnames;
        hostnames.truncate(MAX_ALTERNATES);
        Self {
            field: field.into(),
            reference: None,
            hostnames,
            hostindex: 0,
            port: DEFAULT_PORT,
            community: community.into(),
            version,
            field_oid,
            query: None,
            value: SampleValue::Unset,
            field_request: None,
            query_request: None,
            query_state: QueryState::Idle,
            query_last: None,
            query_matched: false,
            last_request: 0,
            last_polled: 0,
        }
    }

    /// The hostname this cycle's requests go to
    #[must_use]
    pub fn current_hostname(&self) -> &str {
        &self.hostnames[self.hostindex % self.hostnames.len()]
    }

    /// Whether this item performs a table lookup
    #[must_use]
    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    /// Whether any request is outstanding for this item
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        self.field_request.is_some() || self.query_request.is_some()
    }

    /// The label persisted to raw files
    #[must_use]
    pub fn label(&self) -> &str {
        self.reference.as_deref().unwrap_or(&self.field)
    }
}

/// A scheduled set of items sharing one interval and persistence targets
#[derive(Debug)]
pub struct PollGroup {
    /// Lookup key: `"<timeout>-<interval>:<rrd-path>"`
    pub key: String,
    /// Cycle period
    pub interval_ms: u64,
    /// Per-cycle timeout
    pub timeout_ms: u64,

    /// RRD files updated at cycle termination
    pub rrd_paths: Vec<PathBuf>,
    /// Raw-file path templates (strftime patterns)
    pub raw_paths: Vec<String>,

    /// The items polled each cycle
    pub items: Vec<PollItem>,

    /// A cycle has started and not yet terminated
    pub polling: bool,
    /// When the running cycle started (engine ms)
    pub last_request: u64,
    /// When the last cycle terminated (engine ms)
    pub last_polled: u64,
}

impl PollGroup {
    /// Create a group; the key ties together interval, timeout and target
    #[must_use]
    pub fn new(interval_ms: u64, timeout_ms: u64, rrd_paths: Vec<PathBuf>) -> Self {
        let key = format!(
            "{}-{}:{}",
            timeout_ms / 1000,
            interval_ms / 1000,
            rrd_paths
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        Self {
            key,
            interval_ms,
            timeout_ms,
            rrd_paths,
            raw_paths: Vec::new(),
            items: Vec::new(),
            polling: false,
            last_request: 0,
            last_polled: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(hostnames: &[&str]) -> PollItem {
        PollItem::new(
            "octets_in",
            hostnames.iter().map(ToString::to_string).collect(),
            "public",
            SnmpVersion::V2c,
            Oid::parse("1.3.6.1.2.1.2.2.1.10.2").unwrap(),
        )
    }

    #[test]
    fn test_sample_value_display() {
        assert_eq!(SampleValue::Unset.to_string(), "U");
        assert_eq!(SampleValue::Integer(-5).to_string(), "-5");
        assert_eq!(SampleValue::Float(2.5).to_string(), "2.5000");
    }

    #[test]
    fn test_item_hostname_rotation_fields() {
        let mut it = item(&["a.example", "b.example"]);
        assert_eq!(it.current_hostname(), "a.example");
        it.hostindex = 1;
        assert_eq!(it.current_hostname(), "b.example");
    }

    #[test]
    fn test_alternate_limit() {
        let names: Vec<String> = (0..20).map(|i| format!("h{i}.example")).collect();
        let it = PollItem::new(
            "f",
            names,
            "public",
            SnmpVersion::V1,
            Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(),
        );
        assert_eq!(it.hostnames.len(), MAX_ALTERNATES);
    }

    #[test]
    fn test_group_key_format() {
        let group = PollGroup::new(10_000, 5_000, vec![PathBuf::from("/var/rrd/router1.rrd")]);
        assert_eq!(group.key, "5-10:/var/rrd/router1.rrd");
    }

    #[test]
    fn test_item_label_prefers_reference() {
        let mut it = item(&["a.example"]);
        assert_eq!(it.label(), "octets_in");
        it.reference = Some("uplink".to_string());
        assert_eq!(it.label(), "uplink");
    }
}
