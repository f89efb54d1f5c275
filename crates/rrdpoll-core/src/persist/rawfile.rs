//! Raw tabular sample files
//!
//! Append-only files of `<epoch-secs>\t<label>\t<value>` lines, one per
//! item per cycle. The configured path is a strftime-style template
//! expanded with each item's sample time, so daily files come for free
//! (`/var/log/samples-%Y%m%d.raw`).

use crate::poll::{PollGroup, PollItem, SampleValue};
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeZone};
use std::fs::OpenOptions;
use std::io::Write;
use tracing::{debug, warn};

/// Expand a raw-file path template for a sample time
///
/// A template with an invalid `%` pattern is used verbatim.
#[must_use]
pub fn expand_path(template: &str, sample_secs: i64) -> String {
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        warn!(template, "invalid pattern in raw file path");
        return template.to_string();
    }
    match Local.timestamp_opt(sample_secs, 0).single() {
        Some(stamp) => stamp.format_with_items(items.into_iter()).to_string(),
        None => template.to_string(),
    }
}

/// One formatted sample line
#[must_use]
pub fn sample_line(item: &PollItem, sample_secs: i64) -> String {
    match item.value {
        SampleValue::Integer(v) => format!("{sample_secs}\t{}\t{v}\n", item.label()),
        SampleValue::Float(v) => format!("{sample_secs}\t{}\t{v:.4}\n", item.label()),
        SampleValue::Unset => format!("{sample_secs}\t{}\t\n", item.label()),
    }
}

/// Append every item's sample to every configured raw file
pub fn append_raw_samples(group: &PollGroup) {
    for template in &group.raw_paths {
        for item in &group.items {
            let sample_secs = (item.last_polled / 1000) as i64;
            let path = expand_path(template, sample_secs);
            debug!(raw = %path, field = %item.field, "updating raw file");

            let file = OpenOptions::new().create(true).append(true).open(&path);
            let mut file = match file {
                Ok(file) => file,
                Err(e) => {
                    warn!(raw = %path, error = %e, "couldn't open raw file");
                    break; // next template
                }
            };
            if let Err(e) = file.write_all(sample_line(item, sample_secs).as_bytes()) {
                warn!(raw = %path, error = %e, "couldn't append raw sample");
                break;
            }
        }
    }
}
