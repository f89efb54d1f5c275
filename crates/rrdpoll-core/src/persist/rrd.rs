//! RRD updates via the rrdtool binary
//!
//! One `rrdtool update <file> <secs>:<v1>:<v2>...` invocation per file per
//! cycle, values in item declaration order, unset values as the `U`
//! sentinel.

use crate::poll::PollGroup;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Format the update argument for a group
#[must_use]
pub fn update_argument(group: &PollGroup) -> String {
    let mut arg = (group.last_polled / 1000).to_string();
    for item in &group.items {
        arg.push(':');
        arg.push_str(&item.value.to_string());
    }
    arg
}

/// Update every RRD file attached to the group
pub fn update_rrd_files(group: &PollGroup) {
    if group.rrd_paths.is_empty() {
        return;
    }
    let argument = update_argument(group);

    for path in &group.rrd_paths {
        debug!(rrd = %path.display(), %argument, "updating rrd");
        let status = Command::new("rrdtool")
            .arg("update")
            .arg(path)
            .arg(&argument)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                warn!(rrd = %path.display(), %status, "rrdtool update failed");
            }
            Err(e) => {
                warn!(rrd = %path.display(), error = %e, "couldn't run rrdtool");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::Oid;
    use crate::poll::{PollGroup, PollItem, SampleValue};
    use crate::snmp::SnmpVersion;
    use std::path::PathBuf;

    #[test]
    fn test_update_argument_layout() {
        let mut group = PollGroup::new(10_000, 5_000, vec![PathBuf::from("/tmp/x.rrd")]);
        group.last_polled = 1_700_000_123_456;

        let mut a = PollItem::new(
            "in",
            vec!["h".to_string()],
            "public",
            SnmpVersion::V2c,
            Oid::parse("1.3.6.1.2.1.2.2.1.10.1").unwrap(),
        );
        a.value = SampleValue::Integer(42);
        let mut b = PollItem::new(
            "out",
            vec!["h".to_string()],
            "public",
            SnmpVersion::V2c,
            Oid::parse("1.3.6.1.2.1.2.2.1.16.1").unwrap(),
        );
        b.value = SampleValue::Unset;
        group.items.push(a);
        group.items.push(b);

        assert_eq!(update_argument(&group), "1700000123:42:U");
    }
}
