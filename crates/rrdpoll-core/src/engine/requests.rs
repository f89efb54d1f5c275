//! Request engine: batching, retry, response demultiplexing
//!
//! Requests live in exactly one of two tables keyed by their 24-bit snmp
//! id: `preparing` while bindings are still being added, `processing` once
//! they are on the wire. A host has at most one preparing request; `Get`
//! requests batch up to [`MAX_BINDINGS`] bindings, everything else carries
//! exactly one and flushes immediately.
//!
//! Every demultiplexing loop tolerates an owner cancelling its own request
//! from inside the dispatch: the request is re-fetched by id after each
//! owner fires and iteration stops once it is gone.

use crate::engine::{Engine, Target, TimerKind};
use crate::oid::Oid;
use crate::snmp::{MAX_BINDINGS, Pdu, PduType, SnmpCode, VarBind};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Where the snmp-id counter wraps back to 1
const SNMP_ID_WRAP: u32 = 0xFF_FFFF;

/// Externally visible request handle packing `(snmp_id << 8) | slot`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompositeId(u32);

impl CompositeId {
    pub(crate) fn new(snmp_id: u32, slot: usize) -> Self {
        debug_assert!(snmp_id > 0 && snmp_id <= SNMP_ID_WRAP);
        debug_assert!(slot < MAX_BINDINGS);
        Self((snmp_id << 8) | (slot as u32 & 0xFF))
    }

    /// The 24-bit SNMP request id
    #[must_use]
    pub fn snmp_id(self) -> u32 {
        self.0 >> 8
    }

    /// The callback slot within the request
    #[must_use]
    pub fn slot(self) -> usize {
        (self.0 & 0xFF) as usize
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/{}", self.snmp_id(), self.slot())
    }
}

/// Who gets told when a binding completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    /// A plain field read for a poll item
    Field { poll: usize, item: usize },
    /// A table-query step for a poll item
    Query { poll: usize, item: usize },
    /// The one-shot recorder of the sync wrapper
    Sync,
}

/// An SNMP request being assembled or in flight
pub(crate) struct Request {
    /// Owning host (index into the host slab)
    pub host: usize,
    /// The packet, including request id, community and bindings
    pub pdu: Pdu,
    /// One owner slot per binding; `None` after completion or cancel
    pub owners: Vec<Option<Owner>>,

    pub num_sent: u32,
    /// Next transmission time; `None` once the retry budget is spent
    pub next_send: Option<u64>,
    pub last_sent: u64,
    pub retry_interval: u64,
    pub when_timeout: u64,
}

impl Request {
    fn live_owners(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }
}

/// The two engine tables plus allocator state
pub(crate) struct RequestTables {
    pub preparing: HashMap<u32, Request>,
    pub processing: HashMap<u32, Request>,
    next_id: u32,
    /// A zero-delay flush is already armed
    pub flush_pending: bool,
}

impl RequestTables {
    pub(crate) fn new() -> Self {
        Self {
            preparing: HashMap::new(),
            processing: HashMap::new(),
            next_id: 1,
            flush_pending: false,
        }
    }

    /// Allocate the next snmp id, skipping ids still alive in either table
    pub(crate) fn alloc_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = if self.next_id >= SNMP_ID_WRAP {
                1
            } else {
                self.next_id + 1
            };
            if !self.preparing.contains_key(&id) && !self.processing.contains_key(&id) {
                return id;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&mut self, id: u32) {
        self.next_id = id;
    }
}

impl Engine {
    /// Enqueue one binding against a target, batching where possible
    ///
    /// Returns the composite handle, or `None` when the engine refused the
    /// request (unusable host).
    pub(crate) fn submit(&mut self, target: &Target, oid: Oid, owner: Owner) -> Option<CompositeId> {
        let now = self.clock.now_ms();
        let host_idx = self.host_instance(target, now)?;
        let id = self.prep_instance(host_idx, target, now);

        let Some(req) = self.requests.preparing.get_mut(&id) else {
            return None;
        };
        debug_assert!(req.pdu.bindings.len() < MAX_BINDINGS);

        let slot = req.pdu.bindings.len();
        req.pdu.bindings.push(VarBind::request(oid));
        req.owners.push(Some(owner));
        let composite = CompositeId::new(id, slot);

        if target.pdu_type == PduType::Get {
            // Batch further bindings until the loop goes idle
            if !self.requests.flush_pending {
                self.timers.one_shot(now, 0, TimerKind::FlushBatch);
                self.requests.flush_pending = true;
            }
        } else {
            // Anything but Get carries exactly one binding
            debug_assert_eq!(req.owners.len(), 1);
            self.flush_request(id, now);
        }

        Some(composite)
    }

    /// Find or create the preparing request for a host
    ///
    /// An existing request is reused while the PDU type matches and there
    /// is binding room; otherwise it is flushed and a fresh one created.
    fn prep_instance(&mut self, host_idx: usize, target: &Target, now: u64) -> u32 {
        if let Some(existing) = self.hosts.slab[host_idx].prepared {
            if let Some(req) = self.requests.preparing.get(&existing) {
                if req.pdu.pdu_type == target.pdu_type && req.pdu.bindings.len() < MAX_BINDINGS {
                    return existing;
                }
            }
            self.flush_request(existing, now);
        }

        let id = self.requests.alloc_id();
        let host = &self.hosts.slab[host_idx];
        let pdu = Pdu::request(host.version, host.community.clone(), target.pdu_type, id);

        // Tight polls retry faster
        let retry_interval = if target.interval_ms <= 2000 { 200 } else { 600 };

        let request = Request {
            host: host_idx,
            pdu,
            owners: Vec::new(),
            num_sent: 0,
            next_send: None,
            last_sent: 0,
            retry_interval,
            // The timeout covers the last retry, not the first send
            when_timeout: now + retry_interval * u64::from(self.options.retries) + target.timeout_ms,
        };

        self.requests.preparing.insert(id, request);
        self.hosts.slab[host_idx].prepared = Some(id);

        debug!(
            request = id,
            community = %self.hosts.slab[host_idx].community,
            hostname = %self.hosts.slab[host_idx].hostname,
            "preparing request"
        );
        id
    }

    /// Move a preparing request onto the wire schedule
    pub(crate) fn flush_request(&mut self, id: u32, now: u64) {
        let Some(mut request) = self.requests.preparing.remove(&id) else {
            return;
        };
        let host = &mut self.hosts.slab[request.host];
        debug_assert_eq!(host.prepared, Some(id));
        host.prepared = None;

        request.next_send = Some(now);
        self.requests.processing.insert(id, request);
    }

    /// Flush everything being prepared, then walk the wire schedule
    pub(crate) fn flush_all(&mut self, now: u64) {
        let ids: Vec<u32> = self.requests.preparing.keys().copied().collect();
        for id in ids {
            self.flush_request(id, now);
        }
        self.process_all(now);
    }

    /// The 5 Hz resend scan: time out and retransmit in-flight requests
    pub(crate) fn process_all(&mut self, now: u64) {
        let ids: Vec<u32> = self.requests.processing.keys().copied().collect();
        for id in ids {
            let Some(request) = self.requests.processing.get(&id) else {
                // Released by an earlier failure's callback
                continue;
            };
            if now >= request.when_timeout {
                self.fail_request(id, SnmpCode::Timeout);
                continue;
            }
            if request.next_send.is_some_and(|at| now >= at) {
                self.send_request(id, now);
            }
        }
    }

    /// Transmit one in-flight request and update its retry schedule
    ///
    /// An unresolved host counts as a send towards the retry budget; the
    /// skip is logged once per request.
    pub(crate) fn send_request(&mut self, id: u32, now: u64) {
        let retries = self.options.retries;
        let Some(request) = self.requests.processing.get_mut(&id) else {
            return;
        };

        request.num_sent += 1;
        request.next_send = if request.num_sent <= retries {
            Some(now + request.retry_interval)
        } else {
            None
        };
        request.last_sent = now;

        let host = &self.hosts.slab[request.host];
        let hostname = host.hostname.clone();
        if !host.is_resolved {
            if request.num_sent <= 1 {
                debug!(hostname = %hostname, "skipping snmp request: host not resolved");
            }
            return;
        }
        let Some(dest) = host.address else {
            return;
        };

        let packet = match request.pdu.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(request = id, error = %e, "couldn't encode snmp packet");
                return;
            }
        };

        match self.transport.send(&packet, dest) {
            Ok(()) => {
                debug!(request = id, hostname = %hostname, "sent request");
            }
            Err(e) => {
                warn!(request = id, error = %e, "couldn't send snmp packet");
            }
        }
    }

    /// A decoded response datagram
    pub(crate) fn on_response(&mut self, pdu: Pdu, from: SocketAddr) {
        let id = pdu.request_id;
        let (req_version, req_type) = match self.requests.processing.get(&id) {
            Some(request) => (request.pdu.version, request.pdu.pdu_type),
            None => {
                debug!(%from, request = id, "received extra, cancelled or delayed packet");
                return;
            }
        };

        if pdu.version != req_version {
            warn!(%from, request = id, "wrong version snmp packet");
        }

        let code = SnmpCode::from_wire(pdu.error_status);
        if code.is_error() {
            debug!(%from, request = id, error = %code, "failure response");
            self.fail_request(id, code);
        } else if req_type == PduType::Get {
            debug!(%from, request = id, "response");
            self.demux_get(id, &pdu);
        } else {
            debug!(%from, request = id, "response");
            self.demux_single(id, &pdu);
        }
    }

    /// Per-binding demux for `Get` responses
    ///
    /// Each requested binding finds its reply by OID; unmatched bindings
    /// keep their owner and hold the request alive for further retries.
    fn demux_get(&mut self, id: u32, pdu: &Pdu) {
        let nslots = match self.requests.processing.get(&id) {
            Some(request) => request.owners.len(),
            None => return,
        };

        for slot in 0..nslots {
            let fired = {
                let Some(request) = self.requests.processing.get_mut(&id) else {
                    return;
                };
                let Some(owner_slot) = request.owners.get_mut(slot) else {
                    break;
                };
                if owner_slot.is_none() {
                    continue;
                }
                let wanted = &request.pdu.bindings[slot].oid;
                match pdu.bindings.iter().find(|b| &b.oid == wanted) {
                    Some(reply) => {
                        let reply = reply.clone();
                        owner_slot.take().map(|owner| (owner, reply))
                    }
                    // No match in the reply: leave the owner in place
                    None => None,
                }
            };

            if let Some((owner, reply)) = fired {
                self.dispatch(owner, CompositeId::new(id, slot), SnmpCode::NoError, Some(&reply));
                if !self.requests.processing.contains_key(&id) {
                    // The owner cancelled the request during dispatch
                    return;
                }
            }
        }

        let complete = self
            .requests
            .processing
            .get(&id)
            .is_some_and(|request| request.live_owners() == 0);
        if complete {
            debug!(request = id, "request complete");
            self.requests.processing.remove(&id);
        }
    }

    /// Single-binding demux for non-`Get` responses
    fn demux_single(&mut self, id: u32, pdu: &Pdu) {
        if pdu.bindings.is_empty() {
            warn!(request = id, "response carries no values");
            return;
        }
        if pdu.bindings.len() > 1 {
            warn!(request = id, "response carries extra values");
        }

        let fired = {
            let Some(request) = self.requests.processing.get_mut(&id) else {
                return;
            };
            debug_assert_eq!(request.owners.len(), 1);
            request.owners.first_mut().and_then(Option::take)
        };

        if let Some(owner) = fired {
            let reply = pdu.bindings[0].clone();
            self.dispatch(owner, CompositeId::new(id, 0), SnmpCode::NoError, Some(&reply));
            if !self.requests.processing.contains_key(&id) {
                return;
            }
        }

        debug!(request = id, "request complete");
        self.requests.processing.remove(&id);
    }

    /// Fail every live owner of an in-flight request, then release it
    pub(crate) fn fail_request(&mut self, id: u32, code: SnmpCode) {
        debug_assert!(code.is_error());
        let nslots = match self.requests.processing.get(&id) {
            Some(request) => {
                debug!(request = id, hostname = %self.hosts.slab[request.host].hostname,
                       error = %code, "failed request");
                request.owners.len()
            }
            None => return,
        };

        for slot in 0..nslots {
            let fired = {
                let Some(request) = self.requests.processing.get_mut(&id) else {
                    return;
                };
                request.owners.get_mut(slot).and_then(Option::take)
            };
            if let Some(owner) = fired {
                self.dispatch(owner, CompositeId::new(id, slot), code, None);
                if !self.requests.processing.contains_key(&id) {
                    return;
                }
            }
        }

        self.requests.processing.remove(&id);
    }

    /// Cancel one composite handle
    ///
    /// Clears the owner slot; the request itself is released only once no
    /// owner remains. Cancelling an unknown or already-cancelled handle is
    /// a no-op.
    pub fn cancel(&mut self, composite: CompositeId) {
        let id = composite.snmp_id();
        let slot = composite.slot();

        let in_processing = self.requests.processing.contains_key(&id);
        let table = if in_processing {
            &mut self.requests.processing
        } else {
            &mut self.requests.preparing
        };
        let Some(request) = table.get_mut(&id) else {
            return;
        };

        if let Some(owner_slot) = request.owners.get_mut(slot) {
            *owner_slot = None;
        }
        if request.live_owners() > 0 {
            return;
        }

        let host_idx = request.host;
        debug!(
            request = id,
            during = if in_processing { "processing" } else { "prep" },
            "cancelling request"
        );
        table.remove(&id);

        let host = &mut self.hosts.slab[host_idx];
        if host.prepared == Some(id) {
            host.prepared = None;
        }
    }

    /// Hand a completion to its owner
    pub(crate) fn dispatch(
        &mut self,
        owner: Owner,
        composite: CompositeId,
        code: SnmpCode,
        reply: Option<&VarBind>,
    ) {
        match owner {
            Owner::Field { poll, item } => self.on_field_response(poll, item, composite, code, reply),
            Owner::Query { poll, item } => self.on_query_response(poll, item, composite, code, reply),
            Owner::Sync => self.on_sync_response(composite, code, reply),
        }
    }
}
