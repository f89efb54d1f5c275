//! Timer wheel and engine clock
//!
//! The engine's event loop owns a single [`Timers`] wheel holding both
//! repeating and one-shot entries, keyed by a caller-defined kind. Firing is
//! explicit: the loop calls [`Timers::fire_due`] before every wait and
//! sleeps until [`Timers::next_deadline`].
//!
//! A repeating entry whose next deadline has already passed when it is
//! rearmed is clamped to `now`; accumulated lateness is dropped rather than
//! replayed as a burst.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Handle to a scheduled timer
pub type TimerId = u64;

struct Entry<K> {
    at: u64,
    seq: u64,
    period: Option<u64>,
    id: TimerId,
    kind: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, soonest entry must win
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Wall-clock timer wheel in milliseconds
pub struct Timers<K> {
    heap: BinaryHeap<Entry<K>>,
    cancelled: HashSet<TimerId>,
    next_id: TimerId,
    next_seq: u64,
}

impl<K: Clone> Timers<K> {
    /// An empty wheel
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 1,
            next_seq: 0,
        }
    }

    fn push(&mut self, at: u64, period: Option<u64>, kind: K) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            at,
            seq,
            period,
            id,
            kind,
        });
        id
    }

    /// Arm a repeating timer; first fire one period from `now`
    pub fn repeating(&mut self, now: u64, period_ms: u64, kind: K) -> TimerId {
        debug_assert!(period_ms > 0);
        self.push(now + period_ms, Some(period_ms), kind)
    }

    /// Arm a one-shot timer
    pub fn one_shot(&mut self, now: u64, delay_ms: u64, kind: K) -> TimerId {
        self.push(now + delay_ms, None, kind)
    }

    /// Cancel a timer; firing an already-fired one-shot id is a no-op
    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
    }

    /// The soonest pending deadline, pruning cancelled entries
    pub fn next_deadline(&mut self) -> Option<u64> {
        while let Some(top) = self.heap.peek() {
            if !self.cancelled.contains(&top.id) {
                return Some(top.at);
            }
            if let Some(entry) = self.heap.pop() {
                self.cancelled.remove(&entry.id);
            }
        }
        None
    }

    /// Collect every entry due at `now`, rearming repeating ones
    ///
    /// Each due entry fires exactly once per call; a repeating entry whose
    /// rearmed deadline has already passed is clamped to `now` and will fire
    /// again on the next call.
    pub fn fire_due(&mut self, now: u64) -> Vec<K> {
        let mut fired = Vec::new();
        let mut rearm = Vec::new();

        while self.heap.peek().is_some_and(|top| top.at <= now) {
            let Some(entry) = self.heap.pop() else {
                break;
            };
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            fired.push(entry.kind.clone());
            if let Some(period) = entry.period {
                let mut at = entry.at + period;
                if at <= now {
                    at = now;
                }
                rearm.push(Entry {
                    at,
                    seq: self.next_seq,
                    period: entry.period,
                    id: entry.id,
                    kind: entry.kind,
                });
                self.next_seq += 1;
            }
        }

        for entry in rearm {
            self.heap.push(entry);
        }
        fired
    }

    /// Number of live entries (cancelled-but-unpruned entries included)
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the wheel holds no entries at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<K: Clone> Default for Timers<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic engine clock with a wall-clock epoch base
///
/// `now_ms` values are milliseconds since the Unix epoch, advanced by a
/// monotonic clock captured at creation, so they never step backwards and
/// stay comparable to wall time for persistence.
#[derive(Debug, Clone)]
pub struct Clock {
    start: tokio::time::Instant,
    base_ms: u64,
}

impl Clock {
    /// Capture the epoch base now
    #[must_use]
    pub fn new() -> Self {
        let base_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        Self {
            start: tokio::time::Instant::now(),
            base_ms,
        }
    }

    /// Current engine time in milliseconds
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.base_ms + self.start.elapsed().as_millis() as u64
    }

    /// The instant corresponding to an engine millisecond stamp
    ///
    /// Stamps already in the past map to "immediately".
    #[must_use]
    pub fn instant_at(&self, at_ms: u64) -> tokio::time::Instant {
        let offset = at_ms.saturating_sub(self.base_ms);
        self.start + Duration::from_millis(offset)
    }

    /// Convert an engine stamp to wall time
    #[must_use]
    pub fn wall_time(at_ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(at_ms)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
