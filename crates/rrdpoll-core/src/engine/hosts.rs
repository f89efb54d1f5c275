//! Host table and address resolution policy
//!
//! Hosts are shared by every item that names the same
//! (hostname, port, community, version) tuple. Literal addresses resolve
//! immediately; DNS names go through the background resolver on a derived
//! interval, and expire after three missed refreshes.

use crate::engine::{Engine, Target};
use crate::resolver::Resolved;
use crate::snmp::SnmpVersion;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

/// Identity of a host entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct HostKey {
    pub hostname: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,
}

/// One polled agent endpoint
pub(crate) struct Host {
    pub hostname: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,

    /// Resolved destination, when known
    pub address: Option<SocketAddr>,
    pub is_resolved: bool,
    pub is_resolving: bool,
    pub must_resolve: bool,

    /// Resolve bookkeeping, engine milliseconds (0 = never)
    pub resolve_interval: u64,
    pub last_resolve_try: u64,
    pub last_resolved: u64,

    /// The single request currently being assembled for this host
    pub prepared: Option<u32>,
}

/// All hosts, keyed for sharing and indexed for stable references
#[derive(Default)]
pub(crate) struct HostTable {
    pub by_key: HashMap<HostKey, usize>,
    pub slab: Vec<Host>,
}

impl HostTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Engine {
    /// Find or create the host entry for a request target
    pub(crate) fn host_instance(&mut self, target: &Target, now: u64) -> Option<usize> {
        if target.hostname.is_empty() {
            warn!("ignoring request with empty hostname");
            return None;
        }

        let key = HostKey {
            hostname: target.hostname.clone(),
            port: target.port,
            community: target.community.clone(),
            version: target.version,
        };

        if let Some(&idx) = self.hosts.by_key.get(&key) {
            self.update_resolve_interval(idx, target.interval_ms);
            return Some(idx);
        }

        // A literal address never needs the resolver
        let (address, must_resolve) = match target.hostname.parse::<IpAddr>() {
            Ok(ip) => (Some(SocketAddr::new(ip, target.port)), false),
            Err(_) => (None, true),
        };

        let idx = self.hosts.slab.len();
        self.hosts.slab.push(Host {
            hostname: target.hostname.clone(),
            port: target.port,
            community: target.community.clone(),
            version: target.version,
            address,
            is_resolved: !must_resolve,
            is_resolving: false,
            must_resolve,
            resolve_interval: 0,
            last_resolve_try: 0,
            last_resolved: 0,
            prepared: None,
        });
        self.hosts.by_key.insert(key, idx);

        self.update_resolve_interval(idx, target.interval_ms);

        // Start resolving right away instead of waiting for the scan
        if must_resolve {
            self.resolve_host(idx, now);
        }

        Some(idx)
    }

    /// Derive the resolve interval from a poll interval using this host
    ///
    /// Under three minutes resolve once per minute, between 3 and 10 minutes
    /// once per cycle, above that three times per cycle. Hosts shared by
    /// several poll groups keep the smallest result.
    pub(crate) fn update_resolve_interval(&mut self, idx: usize, interval_ms: u64) {
        let host = &mut self.hosts.slab[idx];
        if !host.must_resolve {
            return;
        }

        let derived = if interval_ms <= 180_000 {
            60_000
        } else if interval_ms <= 600_000 {
            interval_ms
        } else {
            interval_ms / 3
        };

        if host.resolve_interval == 0 || host.resolve_interval > derived {
            host.resolve_interval = derived;
            debug!(
                hostname = %host.hostname,
                every_secs = derived / 1000,
                "host resolve interval set"
            );
        }
    }

    /// Enqueue a resolver job for a host, once
    ///
    /// `is_resolving` stays set until the completion arrives, so the 1 Hz
    /// scan never stacks a second job on a slow resolver.
    pub(crate) fn resolve_host(&mut self, idx: usize, now: u64) {
        let host = &mut self.hosts.slab[idx];
        if host.is_resolving {
            return;
        }
        host.last_resolve_try = now;
        host.is_resolving = true;

        let hostname = host.hostname.clone();
        let port = host.port;
        if let Some(resolver) = &self.resolver {
            if let Err(e) = resolver.queue(idx as u64, &hostname, port) {
                warn!(hostname = %hostname, error = %e, "couldn't queue resolve");
                self.hosts.slab[idx].is_resolving = false;
            }
        } else {
            self.hosts.slab[idx].is_resolving = false;
        }
    }

    /// 1 Hz scan: refresh due hosts, expire stale addresses
    pub(crate) fn scan_resolves(&mut self, now: u64) {
        for idx in 0..self.hosts.slab.len() {
            let host = &self.hosts.slab[idx];
            if !host.must_resolve {
                continue;
            }
            debug_assert!(host.resolve_interval > 0);

            if !host.is_resolving
                && now.saturating_sub(host.last_resolve_try) >= host.resolve_interval
            {
                self.resolve_host(idx, now);
            }

            let host = &mut self.hosts.slab[idx];
            if host.is_resolved
                && now.saturating_sub(host.last_resolved) > host.resolve_interval * 3
            {
                debug!(hostname = %host.hostname, "host address expired and was not re-resolved");
                host.is_resolved = false;
            }
        }
    }

    /// Completion from the resolver worker
    pub(crate) fn on_resolved(&mut self, done: Resolved) {
        let idx = done.token as usize;
        let Some(host) = self.hosts.slab.get_mut(idx) else {
            return;
        };
        host.is_resolving = false;

        match done.result {
            Ok(addr) => {
                host.address = Some(addr);
                host.last_resolved = self.clock.now_ms();
                host.is_resolved = true;
                debug!(hostname = %host.hostname, address = %addr, "resolved host");
            }
            Err(e) => {
                warn!(hostname = %host.hostname, error = %e, "couldn't resolve host name");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineOptions};
    use crate::persist::NullPersist;
    use crate::snmp::PduType;

    async fn test_engine() -> Engine {
        Engine::new(
            EngineOptions::for_tests(),
            Vec::new(),
            Box::new(NullPersist),
        )
        .await
        .unwrap()
    }

    fn target(hostname: &str, interval_ms: u64) -> Target {
        Target {
            hostname: hostname.to_string(),
            port: 161,
            community: "public".to_string(),
            version: SnmpVersion::V2c,
            interval_ms,
            timeout_ms: 2000,
            pdu_type: PduType::Get,
        }
    }

    #[tokio::test]
    async fn test_literal_address_is_resolved_immediately() {
        let mut engine = test_engine().await;
        let idx = engine.host_instance(&target("192.0.2.9", 10_000), 1).unwrap();
        let host = &engine.hosts.slab[idx];
        assert!(host.is_resolved);
        assert!(!host.must_resolve);
        assert_eq!(
            host.address,
            Some("192.0.2.9:161".parse().unwrap())
        );
        // Literal hosts never pick up a resolve interval
        assert_eq!(host.resolve_interval, 0);
    }

    #[tokio::test]
    async fn test_host_shared_by_identity_tuple() {
        let mut engine = test_engine().await;
        let a = engine.host_instance(&target("192.0.2.9", 10_000), 1).unwrap();
        let b = engine.host_instance(&target("192.0.2.9", 10_000), 1).unwrap();
        assert_eq!(a, b);

        let mut other = target("192.0.2.9", 10_000);
        other.community = "private".to_string();
        let c = engine.host_instance(&other, 1).unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_resolve_interval_derivation() {
        let mut engine = test_engine().await;

        let idx = engine
            .host_instance(&target("router1.example", 60_000), 1)
            .unwrap();
        assert_eq!(engine.hosts.slab[idx].resolve_interval, 60_000);

        // Between 3 and 10 minutes: once per cycle
        engine.update_resolve_interval(idx, 300_000);
        // Smaller previous value wins
        assert_eq!(engine.hosts.slab[idx].resolve_interval, 60_000);

        let idx2 = engine
            .host_instance(&target("router2.example", 300_000), 1)
            .unwrap();
        assert_eq!(engine.hosts.slab[idx2].resolve_interval, 300_000);

        let idx3 = engine
            .host_instance(&target("router3.example", 1_200_000), 1)
            .unwrap();
        assert_eq!(engine.hosts.slab[idx3].resolve_interval, 400_000);
    }

    #[tokio::test]
    async fn test_single_outstanding_resolve_guard() {
        let mut engine = test_engine().await;
        let idx = engine
            .host_instance(&target("router1.example", 60_000), 5)
            .unwrap();
        assert!(engine.hosts.slab[idx].is_resolving);
        let first_try = engine.hosts.slab[idx].last_resolve_try;

        // A scan long after the interval must not queue a second job while
        // one is outstanding
        engine.scan_resolves(first_try + 600_000);
        assert_eq!(engine.hosts.slab[idx].last_resolve_try, first_try);

        // Once the completion lands the scan may try again
        engine.on_resolved(Resolved {
            token: idx as u64,
            hostname: "router1.example".to_string(),
            result: Err(crate::Error::resolve("router1.example", "test failure")),
        });
        assert!(!engine.hosts.slab[idx].is_resolving);
        engine.scan_resolves(first_try + 600_000);
        assert!(engine.hosts.slab[idx].is_resolving);
    }

    #[tokio::test]
    async fn test_address_expiry_after_three_intervals() {
        let mut engine = test_engine().await;
        let idx = engine
            .host_instance(&target("router1.example", 60_000), 5)
            .unwrap();

        engine.on_resolved(Resolved {
            token: idx as u64,
            hostname: "router1.example".to_string(),
            result: Ok("192.0.2.1:161".parse().unwrap()),
        });
        assert!(engine.hosts.slab[idx].is_resolved);

        let resolved_at = engine.hosts.slab[idx].last_resolved;
        engine.hosts.slab[idx].is_resolving = true; // keep the scan from re-queueing
        engine.scan_resolves(resolved_at + 3 * 60_000);
        assert!(engine.hosts.slab[idx].is_resolved);
        engine.scan_resolves(resolved_at + 3 * 60_000 + 1);
        assert!(!engine.hosts.slab[idx].is_resolved);
    }
}
