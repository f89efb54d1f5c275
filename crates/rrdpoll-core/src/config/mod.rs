//! Configuration directory loading
//!
//! Every regular file in the configuration directory describes one set of
//! polled fields: a `[general]` section naming the persistence targets and
//! a `[poll]` section with the cadence and one `<field>.source` URI per
//! datapoint. Files sharing the same interval, timeout and RRD target are
//! merged into one poll group.
//!
//! All configuration problems are fatal here, before the daemon starts
//! polling; the engine never sees a half-built data model.

use crate::error::{Error, Result};
use crate::oid;
use crate::poll::{PollGroup, PollItem, QuerySpec};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

mod parser;
pub mod uri;

pub use uri::{SourceUri, parse_source_uri};

/// Characters allowed in field names
const FIELD_VALID: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_-0123456789.";

/// Directory loading options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Where default RRD files live (`<rrd-dir>/<conf-name>.rrd`)
    pub rrd_dir: PathBuf,
    /// Timeout for poll groups that do not set one, seconds
    pub default_timeout_secs: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            rrd_dir: PathBuf::from("/var/lib/rrdpoll"),
            default_timeout_secs: 5,
        }
    }
}

/// Load every configuration file in a directory into poll groups
pub fn load_dir(dir: &Path, options: &LoadOptions) -> Result<Vec<PollGroup>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            Error::config_with_source(
                format!("couldn't list config directory: {}", dir.display()),
                e,
            )
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let mut groups: Vec<PollGroup> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();

    for path in files {
        load_file(&path, options, &mut groups, &mut group_index)?;
    }

    if groups.is_empty() {
        return Err(Error::config(format!(
            "no usable config files found in config directory: {}",
            dir.display()
        )));
    }
    Ok(groups)
}

fn load_file(
    path: &Path,
    options: &LoadOptions,
    groups: &mut Vec<PollGroup>,
    group_index: &mut HashMap<String, usize>,
) -> Result<()> {
    let filename = path.display().to_string();
    let confname = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("poll")
        .to_string();
    let entries = parser::parse_file(path)?;

    let mut rrd_paths: Vec<PathBuf> = Vec::new();
    let mut raw_paths: Vec<String> = Vec::new();
    let mut interval_secs: Option<u64> = None;
    let mut timeout_secs: Option<u64> = None;
    let mut sources: Vec<(String, String, usize)> = Vec::new();
    let mut references: HashMap<String, String> = HashMap::new();

    for entry in entries {
        match entry.section.as_str() {
            "general" => match entry.name.as_str() {
                "rrd" => rrd_paths.push(PathBuf::from(entry.value)),
                "raw" => raw_paths.push(entry.value),
                // Other [general] options belong to tooling, not the poller
                _ => {}
            },
            "poll" => match entry.name.as_str() {
                "interval" => {
                    if interval_secs.is_some() {
                        return Err(Error::config(format!(
                            "{filename}: interval specified twice"
                        )));
                    }
                    interval_secs = Some(parse_positive(&filename, "interval", &entry.value)?);
                }
                "timeout" => {
                    if timeout_secs.is_some() {
                        return Err(Error::config(format!(
                            "{filename}: timeout specified twice"
                        )));
                    }
                    timeout_secs = Some(parse_positive(&filename, "timeout", &entry.value)?);
                }
                name => {
                    let Some((field, suffix)) = name.split_once('.') else {
                        // Unknown plain options are ignored
                        continue;
                    };
                    if field.is_empty() || field.chars().any(|c| !FIELD_VALID.contains(c)) {
                        return Err(Error::config(format!(
                            "{filename}:{}: field name must only contain characters, digits, underscore and dash: {field}",
                            entry.line
                        )));
                    }
                    match suffix {
                        "source" => sources.push((field.to_string(), entry.value, entry.line)),
                        "reference" => {
                            references.insert(field.to_string(), entry.value);
                        }
                        _ => {}
                    }
                }
            },
            _ => {}
        }
    }

    if sources.is_empty() {
        debug!(file = %filename, "config file declares nothing to poll");
        return Ok(());
    }

    let Some(interval_secs) = interval_secs else {
        return Err(Error::config(format!("{filename}: no interval specified")));
    };
    let timeout_secs = timeout_secs.unwrap_or(options.default_timeout_secs);

    if rrd_paths.is_empty() {
        rrd_paths.push(options.rrd_dir.join(format!("{confname}.rrd")));
    }

    // Files with identical cadence and targets share one poll group
    let key = format!(
        "{}-{}:{}",
        timeout_secs,
        interval_secs,
        rrd_paths[0].display()
    );
    let group_idx = match group_index.get(&key) {
        Some(&idx) => idx,
        None => {
            let mut group = PollGroup::new(interval_secs * 1000, timeout_secs * 1000, rrd_paths);
            group.key = key.clone();
            groups.push(group);
            group_index.insert(key, groups.len() - 1);
            groups.len() - 1
        }
    };
    let group = &mut groups[group_idx];
    for raw in raw_paths {
        if !group.raw_paths.contains(&raw) {
            group.raw_paths.push(raw);
        }
    }

    for (field, uri_text, line) in sources {
        let item = build_item(&filename, line, &field, &uri_text, references.get(&field))?;
        debug!(file = %filename, field = %item.field, oid = %item.field_oid, "parsed poll item");
        group.items.push(item);
    }

    Ok(())
}

fn build_item(
    filename: &str,
    line: usize,
    field: &str,
    uri_text: &str,
    reference: Option<&String>,
) -> Result<PollItem> {
    let source = parse_source_uri(uri_text)
        .map_err(|e| Error::config(format!("{filename}:{line}: {e}")))?;

    let field_oid = oid::resolve(&source.oid_text)
        .map_err(|e| Error::config(format!("{filename}:{line}: invalid oid: {e}")))?;
    if field_oid.is_empty() || field_oid.len() >= crate::oid::MAX_OID_LEN {
        return Err(Error::config(format!(
            "{filename}:{line}: oid out of range: {}",
            source.oid_text
        )));
    }

    let mut item = PollItem::new(
        field,
        source.hostnames,
        source.community,
        source.version,
        field_oid,
    );
    item.port = source.port;
    item.reference = reference.cloned();

    if let Some((query_text, match_text)) = source.query {
        let query_oid = oid::resolve(&query_text)
            .map_err(|e| Error::config(format!("{filename}:{line}: invalid query oid: {e}")))?;
        if query_oid.is_empty() || query_oid.len() >= crate::oid::MAX_OID_LEN {
            return Err(Error::config(format!(
                "{filename}:{line}: query oid out of range: {query_text}"
            )));
        }
        item.query = Some(QuerySpec {
            oid: query_oid,
            match_text,
        });
    }

    Ok(item)
}

fn parse_positive(filename: &str, name: &str, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(Error::config(format!(
            "{filename}: {name} must be a number (seconds) greater than zero: {value}"
        ))),
    }
}
