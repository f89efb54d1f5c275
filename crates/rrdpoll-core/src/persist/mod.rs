//! Sample persistence
//!
//! At cycle termination the engine hands the whole poll group to a
//! [`Persist`] implementation, synchronously on the loop task. The stock
//! implementation updates RRD files via the `rrdtool` binary and appends
//! tab-separated lines to raw files; failures are logged and never disturb
//! polling.

use crate::poll::PollGroup;

pub mod rawfile;
pub mod rrd;

pub use rawfile::append_raw_samples;
pub use rrd::update_rrd_files;

/// Receives each poll group's samples at cycle termination
pub trait Persist: Send {
    /// Record the group's current values
    ///
    /// Called on the event-loop task; implementations should not block
    /// longer than a file append or a short-lived subprocess.
    fn persist(&mut self, group: &PollGroup);
}

/// Discards every sample; used by the probe tools and in tests
pub struct NullPersist;

impl Persist for NullPersist {
    fn persist(&mut self, _group: &PollGroup) {}
}

/// The daemon's persistence: RRD updates plus raw-file appends
pub struct FilePersist;

impl Persist for FilePersist {
    fn persist(&mut self, group: &PollGroup) {
        if group.items.is_empty() {
            return;
        }
        update_rrd_files(group);
        append_raw_samples(group);
    }
}

/// Snapshot of one persisted cycle, for tests and tooling
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    /// The group key
    pub key: String,
    /// Group completion stamp (engine ms)
    pub last_polled: u64,
    /// Field name, value and per-item completion stamp
    pub samples: Vec<(String, crate::poll::SampleValue, u64)>,
}

/// Records every persisted cycle into a shared vector
#[derive(Clone, Default)]
pub struct RecordingPersist {
    records: std::sync::Arc<std::sync::Mutex<Vec<CycleRecord>>>,
}

impl RecordingPersist {
    /// A fresh recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted so far
    #[must_use]
    pub fn records(&self) -> Vec<CycleRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Persist for RecordingPersist {
    fn persist(&mut self, group: &PollGroup) {
        let record = CycleRecord {
            key: group.key.clone(),
            last_polled: group.last_polled,
            samples: group
                .items
                .iter()
                .map(|item| (item.field.clone(), item.value, item.last_polled))
                .collect(),
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
