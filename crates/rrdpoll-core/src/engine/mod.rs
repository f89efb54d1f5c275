//! The asynchronous SNMP request engine
//!
//! One [`Engine`] value owns every piece of polling state: the host table,
//! the request tables, the poll groups, the UDP sockets, the timer wheel
//! and the resolver handle. All of it is touched only from the single task
//! driving [`Engine::run`]; owner callbacks are dispatched inline and run
//! to completion, so no two callbacks ever overlap.
//!
//! - [`hosts`] - host table and resolution policy
//! - [`requests`] - request tables, batching, retry and demux
//! - [`transport`] - UDP sockets and packet dispatch
//! - [`sync`] - blocking-style wrapper for one-shot probes

use crate::error::Result;
use crate::mainloop::{Clock, Timers};
use crate::persist::Persist;
use crate::poll::PollGroup;
use crate::resolver::{Resolved, Resolver};
use crate::snmp::{Pdu, PduType, SnmpVersion};
use rand::Rng;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) mod hosts;
pub(crate) mod requests;
pub mod sync;
pub(crate) mod transport;

pub use requests::CompositeId;
pub use sync::SyncRequest;

use hosts::HostTable;
use requests::RequestTables;
use transport::{Family, Transport};

/// How often the resend scan walks the in-flight table
const RESEND_PERIOD_MS: u64 = 200;
/// How often the host table is scanned for due resolves
const RESOLVE_SCAN_PERIOD_MS: u64 = 1000;

/// Engine construction options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// SNMP packet retries per request
    pub retries: u32,
    /// Local addresses to bind, one socket each
    pub bind: Vec<IpAddr>,
    /// Spread each poll group's first fire inside its own interval
    ///
    /// On by default so restarts do not align every cycle; tests turn it
    /// off for deterministic timing.
    pub startup_jitter: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            bind: Transport::default_bind_addrs(),
            startup_jitter: true,
        }
    }
}

impl EngineOptions {
    /// Options for tests: loopback only, no startup jitter
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            retries: 3,
            bind: vec![IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)],
            startup_jitter: false,
        }
    }
}

/// Identifies a request destination and its scheduling parameters
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub hostname: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub pdu_type: PduType,
}

/// Timer kinds dispatched by the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// 5 Hz walk of the processing table
    Resend,
    /// 1 Hz host resolve scan
    ResolveScan,
    /// Zero-delay batching flush
    FlushBatch,
    /// Jittered first fire of a poll group
    PollStart(usize),
    /// Repeating cycle tick of a poll group
    PollTick(usize),
}

enum LoopEvent {
    TimerDue,
    Datagram(Family),
    Resolved(Resolved),
    Stop,
}

/// Cloneable handle that stops a running engine from outside the loop
#[derive(Clone)]
pub struct StopHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl StopHandle {
    /// Request a cooperative stop
    pub fn stop(&self) {
        let _ = self.tx.send(());
    }
}

/// The polling engine
pub struct Engine {
    pub(crate) options: EngineOptions,
    pub(crate) clock: Clock,
    pub(crate) timers: Timers<TimerKind>,
    pub(crate) stopped: bool,

    pub(crate) transport: Transport,
    pub(crate) hosts: HostTable,
    pub(crate) requests: RequestTables,
    pub(crate) polls: Vec<PollGroup>,
    pub(crate) persist: Box<dyn Persist>,

    pub(crate) resolver: Option<Resolver>,
    pub(crate) resolve_rx: mpsc::UnboundedReceiver<Resolved>,

    stop_tx: mpsc::UnboundedSender<()>,
    stop_rx: mpsc::UnboundedReceiver<()>,

    pub(crate) sync_result: Option<(crate::snmp::SnmpCode, Option<crate::snmp::VarBind>)>,
}

impl Engine {
    /// Bind sockets, spawn the resolver and arm the standing timers
    ///
    /// Poll groups get their first fire jittered inside their own interval
    /// so shared startup does not align every cycle.
    pub async fn new(
        options: EngineOptions,
        polls: Vec<PollGroup>,
        persist: Box<dyn Persist>,
    ) -> Result<Self> {
        let transport = Transport::bind(&options.bind).await?;
        let (resolver, resolve_rx) = Resolver::spawn()?;
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();

        let clock = Clock::new();
        let now = clock.now_ms();
        let mut timers = Timers::new();
        timers.repeating(now, RESEND_PERIOD_MS, TimerKind::Resend);
        timers.repeating(now, RESOLVE_SCAN_PERIOD_MS, TimerKind::ResolveScan);

        let mut rng = rand::thread_rng();
        for (idx, poll) in polls.iter().enumerate() {
            let jitter = if options.startup_jitter {
                rng.gen_range(0..poll.interval_ms.max(1))
            } else {
                0
            };
            debug!(poll = %poll.key, jitter_ms = jitter, "scheduling poll group");
            timers.one_shot(now, jitter, TimerKind::PollStart(idx));
        }

        Ok(Self {
            options,
            clock,
            timers,
            stopped: true,
            transport,
            hosts: HostTable::new(),
            requests: RequestTables::new(),
            polls,
            persist,
            resolver: Some(resolver),
            resolve_rx,
            stop_tx,
            stop_rx,
            sync_result: None,
        })
    }

    /// A handle that can stop the loop from another task
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Whether the loop is currently stopped
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// Request a cooperative stop; observed between callback dispatches
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Current engine time in milliseconds since the Unix epoch
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Run the event loop until [`Engine::stop`] is called
    ///
    /// Due timers are serviced before socket readiness within each
    /// iteration.
    pub async fn run(&mut self) -> Result<()> {
        self.stopped = false;
        while !self.stopped {
            let now = self.clock.now_ms();
            for kind in self.timers.fire_due(now) {
                self.dispatch_timer(kind, now);
                if self.stopped {
                    break;
                }
            }
            if self.stopped {
                break;
            }

            let deadline = self.timers.next_deadline().map(|at| self.clock.instant_at(at));
            match self.next_event(deadline).await {
                LoopEvent::TimerDue => {}
                LoopEvent::Datagram(family) => self.drain_datagrams(family),
                LoopEvent::Resolved(done) => self.on_resolved(done),
                LoopEvent::Stop => self.stop(),
            }
        }
        Ok(())
    }

    async fn next_event(&mut self, deadline: Option<tokio::time::Instant>) -> LoopEvent {
        async fn sleep_until(deadline: Option<tokio::time::Instant>) {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        }

        tokio::select! {
            biased;
            () = sleep_until(deadline) => LoopEvent::TimerDue,
            Some(()) = self.stop_rx.recv() => LoopEvent::Stop,
            Some(done) = self.resolve_rx.recv() => LoopEvent::Resolved(done),
            readable = self.transport.readable() => match readable {
                Ok(family) => LoopEvent::Datagram(family),
                Err(e) => {
                    warn!(error = %e, "error waiting on snmp sockets");
                    LoopEvent::TimerDue
                }
            },
        }
    }

    fn dispatch_timer(&mut self, kind: TimerKind, now: u64) {
        match kind {
            TimerKind::Resend => self.process_all(now),
            TimerKind::ResolveScan => self.scan_resolves(now),
            TimerKind::FlushBatch => {
                self.requests.flush_pending = false;
                self.flush_all(now);
            }
            TimerKind::PollStart(idx) => self.start_poll_group(idx, now),
            TimerKind::PollTick(idx) => self.poll_tick(idx, now),
        }
    }

    fn drain_datagrams(&mut self, family: Family) {
        loop {
            let (len, from) = match self.transport.try_recv(family) {
                Ok(Some(datagram)) => datagram,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error receiving snmp packet from network");
                    break;
                }
            };
            let pdu = match Pdu::decode(&self.transport.recv_buf()[..len]) {
                Ok(pdu) => pdu,
                Err(e) => {
                    warn!(%from, error = %e, "invalid snmp packet received");
                    continue;
                }
            };
            self.on_response(pdu, from);
        }
    }

    /// Graceful teardown: cancel in-flight requests, close the sockets and
    /// join the resolver worker
    pub fn shutdown(mut self) {
        let in_flight = self.requests.processing.len() + self.requests.preparing.len();
        if in_flight > 0 {
            info!(in_flight, "discarding in-flight requests at shutdown");
        }
        self.requests.preparing.clear();
        self.requests.processing.clear();

        if let Some(resolver) = self.resolver.take() {
            resolver.shutdown();
        }
        // Sockets close with the transport drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::NullPersist;

    #[tokio::test]
    async fn test_engine_starts_stopped_and_stops_via_handle() {
        let mut engine = Engine::new(
            EngineOptions::for_tests(),
            Vec::new(),
            Box::new(NullPersist),
        )
        .await
        .unwrap();
        assert!(engine.stopped());

        let handle = engine.stop_handle();
        handle.stop();
        // The queued stop message ends the loop on its first wait
        engine.run().await.unwrap();
        assert!(engine.stopped());

        engine.shutdown();
    }

    #[tokio::test]
    async fn test_standing_timers_are_armed() {
        let mut engine = Engine::new(
            EngineOptions::for_tests(),
            Vec::new(),
            Box::new(NullPersist),
        )
        .await
        .unwrap();
        // Resend and resolve-scan wheels exist even with no poll groups
        assert!(engine.timers.next_deadline().is_some());
    }
}
