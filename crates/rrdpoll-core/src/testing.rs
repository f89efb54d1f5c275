//! Testing utilities
//!
//! An in-process SNMP agent speaking the real wire format on a loopback
//! UDP socket, with a scripted value table and failure knobs. Lets the
//! engine tests exercise full request/response cycles without real
//! devices.

use crate::oid::Oid;
use crate::snmp::{Pdu, PduType, SnmpValue, SnmpVersion, VarBind};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Scripted behaviour of a [`StubAgent`]
#[derive(Debug, Clone, Default)]
pub struct StubBehavior {
    /// Delay before each reply
    pub delay: Option<Duration>,
    /// Never reply at all
    pub silent: bool,
    /// Drop this many requests before starting to reply
    pub drop_first: usize,
    /// Reply to everything with this error-status
    pub error_status: Option<i64>,
}

/// Shared, mutable OID table of a stub agent
pub type StubValues = Arc<Mutex<BTreeMap<Oid, SnmpValue>>>;

/// A loopback SNMP agent for tests
pub struct StubAgent {
    addr: SocketAddr,
    values: StubValues,
    seen: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl StubAgent {
    /// Start an agent on an ephemeral loopback port
    pub async fn start(values: BTreeMap<Oid, SnmpValue>, behavior: StubBehavior) -> Self {
        Self::start_at(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            values,
            behavior,
        )
        .await
    }

    /// Start an agent bound to a specific address
    ///
    /// # Panics
    /// Panics when the address cannot be bound; tests want that loud.
    pub async fn start_at(
        bind: SocketAddr,
        values: BTreeMap<Oid, SnmpValue>,
        behavior: StubBehavior,
    ) -> Self {
        let socket = UdpSocket::bind(bind).await.expect("bind stub agent");
        let addr = socket.local_addr().expect("stub agent local addr");
        let values = Arc::new(Mutex::new(values));
        let seen = Arc::new(AtomicUsize::new(0));

        let task_values = Arc::clone(&values);
        let task_seen = Arc::clone(&seen);
        let task = tokio::spawn(async move {
            serve(socket, task_values, task_seen, behavior).await;
        });

        Self {
            addr,
            values,
            seen,
            task,
        }
    }

    /// The agent's address
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The agent's port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// How many requests have been received (including dropped ones)
    #[must_use]
    pub fn requests_seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }

    /// Handle on the value table, for mid-test edits
    #[must_use]
    pub fn values(&self) -> StubValues {
        Arc::clone(&self.values)
    }
}

impl Drop for StubAgent {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: UdpSocket,
    values: StubValues,
    seen: Arc<AtomicUsize>,
    behavior: StubBehavior,
) {
    let mut buf = vec![0u8; crate::snmp::MAX_PACKET];
    let mut dropped = 0usize;

    loop {
        let Ok((len, from)) = socket.recv_from(&mut buf).await else {
            return;
        };
        seen.fetch_add(1, Ordering::SeqCst);

        if behavior.silent {
            continue;
        }
        if dropped < behavior.drop_first {
            dropped += 1;
            continue;
        }

        let Ok(request) = Pdu::decode(&buf[..len]) else {
            continue;
        };
        let reply = {
            let table = values.lock().expect("stub agent table");
            build_reply(&request, &table, behavior.error_status)
        };
        let Ok(packet) = reply.encode() else {
            continue;
        };

        if let Some(delay) = behavior.delay {
            tokio::time::sleep(delay).await;
        }
        let _ = socket.send_to(&packet, from).await;
    }
}

fn build_reply(
    request: &Pdu,
    table: &BTreeMap<Oid, SnmpValue>,
    forced_error: Option<i64>,
) -> Pdu {
    let mut reply = request.response_to();

    if let Some(status) = forced_error {
        reply.error_status = status;
        reply.error_index = 1;
        reply.bindings = request.bindings.clone();
        return reply;
    }

    match request.pdu_type {
        PduType::GetNext => {
            for binding in &request.bindings {
                let next = table
                    .range((
                        std::ops::Bound::Excluded(binding.oid.clone()),
                        std::ops::Bound::Unbounded,
                    ))
                    .next();
                match next {
                    Some((oid, value)) => reply.bindings.push(VarBind {
                        oid: oid.clone(),
                        value: value.clone(),
                    }),
                    None => match request.version {
                        SnmpVersion::V1 => {
                            reply.error_status = 2; // noSuchName
                            reply.error_index = 1;
                            reply.bindings = request.bindings.clone();
                            return reply;
                        }
                        SnmpVersion::V2c => reply.bindings.push(VarBind {
                            oid: binding.oid.clone(),
                            value: SnmpValue::EndOfMibView,
                        }),
                    },
                }
            }
        }
        _ => {
            for (index, binding) in request.bindings.iter().enumerate() {
                match table.get(&binding.oid) {
                    Some(value) => reply.bindings.push(VarBind {
                        oid: binding.oid.clone(),
                        value: value.clone(),
                    }),
                    None => match request.version {
                        SnmpVersion::V1 => {
                            reply.error_status = 2; // noSuchName
                            reply.error_index = (index + 1) as i64;
                            reply.bindings = request.bindings.clone();
                            return reply;
                        }
                        SnmpVersion::V2c => reply.bindings.push(VarBind {
                            oid: binding.oid.clone(),
                            value: SnmpValue::NoSuchInstance,
                        }),
                    },
                }
            }
        }
    }
    reply
}

/// Convenience builder for stub tables
#[must_use]
pub fn table(entries: &[(&str, SnmpValue)]) -> BTreeMap<Oid, SnmpValue> {
    entries
        .iter()
        .map(|(oid, value)| (Oid::parse(oid).expect("stub oid"), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_answers_get() {
        let agent = StubAgent::start(
            table(&[("1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(42))]),
            StubBehavior::default(),
        )
        .await;

        let mut request = Pdu::request(SnmpVersion::V2c, "public", PduType::Get, 7);
        request
            .bindings
            .push(VarBind::request(Oid::parse("1.3.6.1.2.1.1.3.0").unwrap()));

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(&request.encode().unwrap(), agent.addr())
            .await
            .unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        let reply = Pdu::decode(&buf[..len]).unwrap();
        assert_eq!(reply.pdu_type, PduType::Response);
        assert_eq!(reply.request_id, 7);
        assert_eq!(reply.bindings[0].value, SnmpValue::TimeTicks(42));
        assert_eq!(agent.requests_seen(), 1);
    }

    #[tokio::test]
    async fn test_stub_getnext_walk_order() {
        let agent = StubAgent::start(
            table(&[
                ("1.3.6.1.2.1.2.2.1.2.1", SnmpValue::OctetString(b"lo".to_vec())),
                ("1.3.6.1.2.1.2.2.1.2.2", SnmpValue::OctetString(b"eth0".to_vec())),
            ]),
            StubBehavior::default(),
        )
        .await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut request = Pdu::request(SnmpVersion::V2c, "public", PduType::GetNext, 9);
        request
            .bindings
            .push(VarBind::request(Oid::parse("1.3.6.1.2.1.2.2.1.2").unwrap()));
        socket
            .send_to(&request.encode().unwrap(), agent.addr())
            .await
            .unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        let reply = Pdu::decode(&buf[..len]).unwrap();
        assert_eq!(
            reply.bindings[0].oid,
            Oid::parse("1.3.6.1.2.1.2.2.1.2.1").unwrap()
        );

        // Walking past the last row ends the view
        let mut request = Pdu::request(SnmpVersion::V2c, "public", PduType::GetNext, 10);
        request
            .bindings
            .push(VarBind::request(Oid::parse("1.3.6.1.2.1.2.2.1.2.2").unwrap()));
        socket
            .send_to(&request.encode().unwrap(), agent.addr())
            .await
            .unwrap();
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        let reply = Pdu::decode(&buf[..len]).unwrap();
        assert_eq!(reply.bindings[0].value, SnmpValue::EndOfMibView);
    }
}
