//! INI-style configuration file parsing
//!
//! Lines are `name = value` (or `name: value`) under `[section]` headers.
//! A line starting with whitespace continues the previous value, joined by
//! a single space. Full-line `#` comments and blank lines are skipped.

use crate::error::{Error, Result};
use std::path::Path;

/// One parsed `name = value` under its section
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigEntry {
    pub section: String,
    pub name: String,
    pub value: String,
    /// 1-based line of the name for error reporting
    pub line: usize,
}

/// Parse a configuration file from disk
pub(crate) fn parse_file(path: &Path) -> Result<Vec<ConfigEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::io(
            path.display().to_string(),
            "couldn't read config file",
            e,
        )
    })?;
    parse_str(&text, &path.display().to_string())
}

/// Parse configuration text
pub(crate) fn parse_str(text: &str, filename: &str) -> Result<Vec<ConfigEntry>> {
    let mut entries = Vec::new();
    let mut section: Option<String> = None;
    let mut pending: Option<ConfigEntry> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim();

        // Leading whitespace continues the previous value
        let continuation = line.starts_with([' ', '\t']) && !trimmed.is_empty();
        if continuation {
            match pending.as_mut() {
                Some(entry) => {
                    entry.value.push(' ');
                    entry.value.push_str(trimmed);
                    continue;
                }
                None => {
                    return Err(Error::config(format!(
                        "{filename}:{line_no}: invalid continuation in config: {trimmed}"
                    )));
                }
            }
        }

        if let Some(entry) = pending.take() {
            entries.push(entry);
        }

        if trimmed.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let Some(end) = header.find(']') else {
                return Err(Error::config(format!(
                    "{filename}:{line_no}: invalid config header: {line}"
                )));
            };
            let name = header[..end].trim();
            if name.is_empty() {
                return Err(Error::config(format!(
                    "{filename}:{line_no}: invalid config header: {line}"
                )));
            }
            section = Some(name.to_string());
            continue;
        }

        let Some(split) = line.find([':', '=']) else {
            return Err(Error::config(format!(
                "{filename}:{line_no}: invalid config line: {line}"
            )));
        };
        let name = line[..split].trim();
        let value = line[split + 1..].trim();
        if name.is_empty() {
            return Err(Error::config(format!(
                "{filename}:{line_no}: invalid config line: {line}"
            )));
        }
        let Some(section) = section.clone() else {
            return Err(Error::config(format!(
                "{filename}:{line_no}: option outside of any section: {line}"
            )));
        };

        pending = Some(ConfigEntry {
            section,
            name: name.to_string(),
            value: value.to_string(),
            line: line_no,
        });
    }

    if let Some(entry) = pending.take() {
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_sections_and_values() {
        let text = "\
[general]
rrd = /var/rrd/router.rrd

[poll]
interval: 10
octets_in.source = snmp2c://public@router1/1.3.6.1.2.1.2.2.1.10.2
";
        let entries = parse_str(text, "router").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].section, "general");
        assert_eq!(entries[0].name, "rrd");
        assert_eq!(entries[0].value, "/var/rrd/router.rrd");
        assert_eq!(entries[1].section, "poll");
        assert_eq!(entries[1].name, "interval");
        assert_eq!(entries[1].value, "10");
        assert_eq!(entries[2].name, "octets_in.source");
    }

    #[test]
    fn test_continuation_lines_join_with_space() {
        let text = "\
[poll]
interval = 10
descr.source = snmp://public@host/
    1.3.6.1.2.1.1.1.0
";
        let entries = parse_str(text, "t").unwrap();
        assert_eq!(
            entries[1].value,
            "snmp://public@host/ 1.3.6.1.2.1.1.1.0"
        );
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let text = "\
# a comment
[poll]

# another
interval = 30
";
        let entries = parse_str(text, "t").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "interval");
    }

    #[test]
    fn test_errors() {
        assert!(parse_str("    dangling continuation\n", "t").is_err());
        assert!(parse_str("[broken\n", "t").is_err());
        assert!(parse_str("[poll]\nno separator here\n", "t").is_err());
        assert!(parse_str("name = value\n", "t").is_err());
        assert!(parse_str("[poll]\n= empty name\n", "t").is_err());
    }

    #[test]
    fn test_crlf_tolerated() {
        let text = "[poll]\r\ninterval = 10\r\n";
        let entries = parse_str(text, "t").unwrap();
        assert_eq!(entries[0].value, "10");
    }
}
