//! Per-group poll cycles
//!
//! Each group's repeating timer drives one cycle: force-complete whatever
//! the previous cycle left outstanding, issue this cycle's requests, flush
//! the batch. Cycle termination (all items quiescent, or the next tick's
//! force) hands the collected values to the persistence layer exactly once.

use crate::engine::requests::Owner;
use crate::engine::{Engine, Target, TimerKind};
use crate::poll::{PollItem, QueryState, SampleValue};
use crate::snmp::{PduType, SnmpCode, SnmpValue, VarBind};
use tracing::{debug, info, warn};

impl Engine {
    /// First, jittered fire of a poll group: arm the repeating tick and run
    /// the first cycle immediately
    pub(crate) fn start_poll_group(&mut self, poll_idx: usize, now: u64) {
        let Some(poll) = self.polls.get(poll_idx) else {
            return;
        };
        info!(poll = %poll.key, interval_ms = poll.interval_ms, "starting poll group");
        self.timers
            .repeating(now, poll.interval_ms, TimerKind::PollTick(poll_idx));
        self.poll_tick(poll_idx, now);
    }

    /// One scheduled cycle
    pub(crate) fn poll_tick(&mut self, poll_idx: usize, now: u64) {
        self.force_poll(poll_idx, now, "timed out");

        let Some(poll) = self.polls.get_mut(poll_idx) else {
            return;
        };
        poll.last_request = now;
        poll.polling = true;
        let n_items = poll.items.len();

        for item_idx in 0..n_items {
            self.polls[poll_idx].items[item_idx].last_request = now;
            if self.polls[poll_idx].items[item_idx].has_query() {
                self.start_query(poll_idx, item_idx);
            } else {
                self.start_field(poll_idx, item_idx);
            }
        }

        self.flush_all(now);
        // Covers the degenerate case of every request being refused
        self.finish_poll_if_done(poll_idx, now);
    }

    /// Force-complete the previous cycle when items are still outstanding
    ///
    /// Cancelled items count as failures: their value is unset, their host
    /// rotation advances, and the group persists with its completion time
    /// recorded halfway between the request and now.
    pub(crate) fn force_poll(&mut self, poll_idx: usize, now: u64, reason: &str) {
        let Some(poll) = self.polls.get(poll_idx) else {
            return;
        };
        let n_items = poll.items.len();
        let mut forced = false;

        for item_idx in 0..n_items {
            let (field_request, query_request) = {
                let item = &self.polls[poll_idx].items[item_idx];
                (item.field_request, item.query_request)
            };
            if field_request.is_none() && query_request.is_none() {
                continue;
            }
            forced = true;

            if let Some(composite) = field_request {
                self.cancel(composite);
            }
            if let Some(composite) = query_request {
                self.cancel(composite);
            }

            let item = &mut self.polls[poll_idx].items[item_idx];
            debug!(field = %item.field, reason, "value for field dropped");
            item.field_request = None;
            item.query_request = None;
            item.value = SampleValue::Unset;
            self.advance_item_host(poll_idx, item_idx);
        }

        if !forced {
            return;
        }

        let poll = &mut self.polls[poll_idx];
        // The failure is noted halfway between the request and now
        let midpoint = poll.last_request + now.saturating_sub(poll.last_request) / 2;
        for item in &mut poll.items {
            if item.has_query() && !item.query_matched {
                item.value = SampleValue::Unset;
            }
            item.query_state = QueryState::Idle;
            if item.last_polled < item.last_request {
                item.last_polled = midpoint;
            }
        }
        poll.last_polled = midpoint;

        self.persist.persist(&self.polls[poll_idx]);
        self.polls[poll_idx].polling = false;
    }

    /// Terminate the cycle once every item is quiescent
    pub(crate) fn finish_poll_if_done(&mut self, poll_idx: usize, now: u64) {
        let Some(poll) = self.polls.get(poll_idx) else {
            return;
        };
        if !poll.polling || poll.items.iter().any(PollItem::is_outstanding) {
            return;
        }

        let poll = &mut self.polls[poll_idx];
        poll.last_polled = now;
        for item in &mut poll.items {
            if item.has_query() && !item.query_matched {
                item.value = SampleValue::Unset;
            }
            item.query_state = QueryState::Idle;
        }
        debug!(poll = %poll.key, "poll cycle complete");

        self.persist.persist(&self.polls[poll_idx]);
        self.polls[poll_idx].polling = false;
    }

    /// Request parameters for an item's next packet
    pub(crate) fn item_target(&self, poll_idx: usize, item_idx: usize, pdu_type: PduType) -> Target {
        let poll = &self.polls[poll_idx];
        let item = &poll.items[item_idx];
        Target {
            hostname: item.current_hostname().to_string(),
            port: item.port,
            community: item.community.clone(),
            version: item.version,
            interval_ms: poll.interval_ms,
            timeout_ms: poll.timeout_ms,
            pdu_type,
        }
    }

    /// Issue the plain value read for a direct item
    pub(crate) fn start_field(&mut self, poll_idx: usize, item_idx: usize) {
        debug_assert!(self.polls[poll_idx].items[item_idx].field_request.is_none());
        let target = self.item_target(poll_idx, item_idx, PduType::Get);
        let oid = self.polls[poll_idx].items[item_idx].field_oid.clone();

        let item = &mut self.polls[poll_idx].items[item_idx];
        item.value = SampleValue::Unset;
        let owner = Owner::Field {
            poll: poll_idx,
            item: item_idx,
        };
        let composite = self.submit(&target, oid, owner);
        self.polls[poll_idx].items[item_idx].field_request = composite;
    }

    /// Advance the item's hostname rotation after a failure
    pub(crate) fn advance_item_host(&mut self, poll_idx: usize, item_idx: usize) {
        let item = &mut self.polls[poll_idx].items[item_idx];
        let n = item.hostnames.len();
        if n < 2 {
            return;
        }
        let next = (item.hostindex + 1) % n;
        debug!(
            field = %item.field,
            hostname = %item.hostnames[next],
            "request failed, trying alternate host"
        );
        item.hostindex = next;
    }

    /// Completion of a field read (direct items and the Valuing step of
    /// table lookups)
    pub(crate) fn on_field_response(
        &mut self,
        poll_idx: usize,
        item_idx: usize,
        composite: crate::engine::CompositeId,
        code: SnmpCode,
        reply: Option<&VarBind>,
    ) {
        let now = self.clock.now_ms();
        {
            let Some(item) = self
                .polls
                .get_mut(poll_idx)
                .and_then(|poll| poll.items.get_mut(item_idx))
            else {
                return;
            };
            if item.field_request != Some(composite) {
                return;
            }
            item.field_request = None;
            item.last_polled = now;

            if code.is_error() {
                item.value = SampleValue::Unset;
            } else if let Some(reply) = reply {
                match &reply.value {
                    SnmpValue::Null => {
                        item.value = SampleValue::Unset;
                    }
                    SnmpValue::Integer(_)
                    | SnmpValue::Counter32(_)
                    | SnmpValue::Gauge32(_)
                    | SnmpValue::TimeTicks(_)
                    | SnmpValue::Counter64(_) => {
                        // as_sample covers exactly these syntaxes
                        if let Some(sample) = reply.value.as_sample() {
                            item.value = SampleValue::Integer(sample);
                            debug!(field = %item.field, value = sample, "got value for field");
                        }
                    }
                    SnmpValue::OctetString(_) | SnmpValue::Oid(_) | SnmpValue::IpAddress(_) => {
                        warn!(field = %item.field, syntax = reply.value.syntax_name(),
                              "snmp server returned non numeric value for field");
                    }
                    SnmpValue::NoSuchObject
                    | SnmpValue::NoSuchInstance
                    | SnmpValue::EndOfMibView => {
                        warn!(field = %item.field, "field not available on snmp server");
                    }
                    SnmpValue::Opaque(_) => {
                        warn!(field = %item.field,
                              "snmp server returned invalid or unsupported value for field");
                    }
                }
            }
        }

        if code.is_error() {
            self.advance_item_host(poll_idx, item_idx);
        }
        self.finish_poll_if_done(poll_idx, now);
    }
}
