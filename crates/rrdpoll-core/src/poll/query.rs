//! Table-lookup state machine
//!
//! Items declared as table queries find their row at poll time: walk the
//! match column with GetNext until a cell matches the configured text,
//! then read the value column at the same row index. The matching row is
//! remembered across cycles; subsequent cycles re-check it with a paired
//! Get (match and value columns in one packet) and only fall back to the
//! walk when the row moved.

use crate::engine::requests::Owner;
use crate::engine::{CompositeId, Engine};
use crate::oid::Oid;
use crate::poll::{QueryState, SampleValue};
use crate::snmp::{PduType, SnmpCode, value_matches, VarBind};
use tracing::{debug, warn};

impl Engine {
    /// Enter the state machine at cycle start
    pub(crate) fn start_query(&mut self, poll_idx: usize, item_idx: usize) {
        let (query_last, query_oid) = {
            let item = &mut self.polls[poll_idx].items[item_idx];
            debug_assert!(item.query_request.is_none() && item.field_request.is_none());
            item.value = SampleValue::Unset;
            item.query_matched = false;
            let Some(query) = &item.query else {
                return;
            };
            (item.query_last.clone(), query.oid.clone())
        };

        match query_last {
            // No remembered row: brute-force search from the column root
            None => self.query_search_from(poll_idx, item_idx, query_oid),
            // Fast path: re-check the remembered row while already reading
            // its value
            Some(last) => self.query_pair(poll_idx, item_idx, &last),
        }
    }

    /// Issue the next GetNext of a search walk
    pub(crate) fn query_search_from(&mut self, poll_idx: usize, item_idx: usize, from: Oid) {
        let target = self.item_target(poll_idx, item_idx, PduType::GetNext);
        let owner = Owner::Query {
            poll: poll_idx,
            item: item_idx,
        };
        let composite = self.submit(&target, from, owner);

        let item = &mut self.polls[poll_idx].items[item_idx];
        item.query_state = QueryState::Searching;
        item.query_request = composite;
    }

    /// Issue the paired match + value reads against a remembered row
    fn query_pair(&mut self, poll_idx: usize, item_idx: usize, last: &Oid) {
        let Some(row) = last.last_sub() else {
            // Remembered state is unusable; search from scratch
            let query_oid = match &self.polls[poll_idx].items[item_idx].query {
                Some(query) => query.oid.clone(),
                None => return,
            };
            self.query_search_from(poll_idx, item_idx, query_oid);
            return;
        };

        let (match_oid, value_oid) = {
            let item = &self.polls[poll_idx].items[item_idx];
            let Some(query) = &item.query else {
                return;
            };
            (query.oid.child(row), item.field_oid.child(row))
        };
        let (Ok(match_oid), Ok(value_oid)) = (match_oid, value_oid) else {
            warn!("table row index does not fit the configured oids");
            return;
        };

        // Both are Get requests against one host; the engine batches them
        // into a single packet
        let target = self.item_target(poll_idx, item_idx, PduType::Get);
        let query_owner = Owner::Query {
            poll: poll_idx,
            item: item_idx,
        };
        let field_owner = Owner::Field {
            poll: poll_idx,
            item: item_idx,
        };
        let query_composite = self.submit(&target, match_oid, query_owner);
        let field_composite = self.submit(&target, value_oid, field_owner);

        let item = &mut self.polls[poll_idx].items[item_idx];
        item.query_state = QueryState::Pairing;
        item.query_request = query_composite;
        item.field_request = field_composite;
    }

    /// Completion of a table-query step
    pub(crate) fn on_query_response(
        &mut self,
        poll_idx: usize,
        item_idx: usize,
        composite: CompositeId,
        code: SnmpCode,
        reply: Option<&VarBind>,
    ) {
        let state = {
            let Some(item) = self
                .polls
                .get_mut(poll_idx)
                .and_then(|poll| poll.items.get_mut(item_idx))
            else {
                return;
            };
            if item.query_request != Some(composite) {
                return;
            }
            item.query_request = None;
            item.query_state
        };

        match state {
            QueryState::Searching => self.query_search_step(poll_idx, item_idx, code, reply),
            QueryState::Pairing => self.query_pair_step(poll_idx, item_idx, code, reply),
            QueryState::Idle | QueryState::Valuing => {
                debug_assert!(false, "query response in state {state:?}");
            }
        }
    }

    /// One GetNext answer of the search walk
    fn query_search_step(
        &mut self,
        poll_idx: usize,
        item_idx: usize,
        code: SnmpCode,
        reply: Option<&VarBind>,
    ) {
        let now = self.clock.now_ms();

        if code.is_error() {
            // NoSuchName here means the agent ran out of objects
            self.query_give_up(poll_idx, item_idx, code, now);
            return;
        }
        let Some(reply) = reply else {
            return;
        };

        let (query_oid, match_text) = {
            let item = &self.polls[poll_idx].items[item_idx];
            let Some(query) = &item.query else {
                return;
            };
            (query.oid.clone(), query.match_text.clone())
        };

        // Exception syntaxes and walking off the single-index table both
        // classify as "no such name"
        let past_table = reply.value.is_exception()
            || reply.oid.len() != query_oid.len() + 1
            || !query_oid.is_prefix_of(&reply.oid);
        if past_table {
            self.query_give_up(poll_idx, item_idx, SnmpCode::NoSuchName, now);
            return;
        }

        let matched = match &match_text {
            Some(text) => value_matches(&reply.value, text),
            // A null predicate takes the first row in the table
            None => true,
        };

        if matched {
            debug!(
                row = %reply.oid,
                value = %reply.value,
                "table row matched query value"
            );
            let item = &mut self.polls[poll_idx].items[item_idx];
            item.query_last = Some(reply.oid.clone());
            item.query_matched = true;
            item.query_state = QueryState::Valuing;
            self.query_value_row(poll_idx, item_idx, &reply.oid.clone());
        } else {
            // Keep walking from where the agent left us
            self.query_search_from(poll_idx, item_idx, reply.oid.clone());
        }
    }

    /// Read the value column at a freshly matched row
    fn query_value_row(&mut self, poll_idx: usize, item_idx: usize, row_oid: &Oid) {
        let Some(row) = row_oid.last_sub() else {
            return;
        };
        let value_oid = match self.polls[poll_idx].items[item_idx].field_oid.child(row) {
            Ok(oid) => oid,
            Err(_) => {
                warn!("table row index does not fit the configured value oid");
                return;
            }
        };

        let target = self.item_target(poll_idx, item_idx, PduType::Get);
        let owner = Owner::Field {
            poll: poll_idx,
            item: item_idx,
        };
        let composite = self.submit(&target, value_oid, owner);
        self.polls[poll_idx].items[item_idx].field_request = composite;
    }

    /// The match half of a paired fast-path read
    fn query_pair_step(
        &mut self,
        poll_idx: usize,
        item_idx: usize,
        code: SnmpCode,
        reply: Option<&VarBind>,
    ) {
        let now = self.clock.now_ms();

        // Anything but success or a missing row fails the whole item
        if code.is_error() && code != SnmpCode::NoSuchName {
            self.query_cancel_field(poll_idx, item_idx);
            self.query_give_up(poll_idx, item_idx, code, now);
            return;
        }

        let still_matches = if code.is_error() {
            false
        } else {
            let item = &self.polls[poll_idx].items[item_idx];
            match (&item.query, reply) {
                (Some(query), Some(reply)) if !reply.value.is_exception() => {
                    match &query.match_text {
                        Some(text) => value_matches(&reply.value, text),
                        None => true,
                    }
                }
                _ => false,
            }
        };

        if still_matches {
            // The in-flight value read completes the cycle
            let item = &mut self.polls[poll_idx].items[item_idx];
            item.query_matched = true;
            item.query_state = QueryState::Valuing;
            self.finish_poll_if_done(poll_idx, now);
            return;
        }

        // The row moved; drop the speculative value read and walk again
        debug!("remembered table index did not match, searching from the table root");
        self.query_cancel_field(poll_idx, item_idx);
        let query_oid = {
            let item = &mut self.polls[poll_idx].items[item_idx];
            item.query_last = None;
            item.value = SampleValue::Unset;
            match &item.query {
                Some(query) => query.oid.clone(),
                None => return,
            }
        };
        self.query_search_from(poll_idx, item_idx, query_oid);
    }

    /// Cancel the speculative value read of a paired fast path
    fn query_cancel_field(&mut self, poll_idx: usize, item_idx: usize) {
        let composite = self.polls[poll_idx].items[item_idx].field_request.take();
        if let Some(composite) = composite {
            self.cancel(composite);
        }
    }

    /// The lookup failed for this cycle
    fn query_give_up(&mut self, poll_idx: usize, item_idx: usize, code: SnmpCode, now: u64) {
        {
            let item = &mut self.polls[poll_idx].items[item_idx];
            if code == SnmpCode::NoSuchName {
                warn!(
                    field = %item.field,
                    wanted = item.query.as_ref().and_then(|q| q.match_text.as_deref()).unwrap_or(""),
                    "couldn't find a matching table row"
                );
                item.query_last = None;
            }
            item.value = SampleValue::Unset;
            item.query_state = QueryState::Idle;
            item.last_polled = now;
        }
        if code.is_error() {
            self.advance_item_host(poll_idx, item_idx);
        }
        self.finish_poll_if_done(poll_idx, now);
    }
}
