//! UDP transport for the request engine
//!
//! One nonblocking socket per address family, bound to ephemeral local
//! ports. Sends pick the socket matching the destination family; receives
//! drain into a single packet-sized scratch buffer under the loop's
//! one-datagram-at-a-time discipline.

use crate::error::{Error, Result};
use crate::snmp::MAX_PACKET;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Address family of a bound socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    V4,
    V6,
}

pub(crate) struct Transport {
    sock4: Option<UdpSocket>,
    sock6: Option<UdpSocket>,
    buf: Box<[u8; MAX_PACKET]>,
}

impl Transport {
    /// Bind one socket per requested local address
    ///
    /// An IPv6 bind failure is tolerated (hosts without v6); having no
    /// socket at all is fatal.
    pub(crate) async fn bind(addrs: &[IpAddr]) -> Result<Self> {
        let mut sock4 = None;
        let mut sock6 = None;

        for addr in addrs {
            match addr {
                IpAddr::V4(ip) => {
                    let socket = UdpSocket::bind((IpAddr::V4(*ip), 0))
                        .await
                        .map_err(|e| Error::transport_with_source("couldn't open snmp socket", e))?;
                    debug!(local = %socket.local_addr().map(|a| a.to_string()).unwrap_or_default(),
                           "bound snmp socket");
                    sock4 = Some(socket);
                }
                IpAddr::V6(ip) => match UdpSocket::bind((IpAddr::V6(*ip), 0)).await {
                    Ok(socket) => {
                        debug!(local = %socket.local_addr().map(|a| a.to_string()).unwrap_or_default(),
                               "bound snmp socket");
                        sock6 = Some(socket);
                    }
                    Err(e) => {
                        warn!(error = %e, "couldn't bind ipv6 snmp socket, continuing without");
                    }
                },
            }
        }

        if sock4.is_none() && sock6.is_none() {
            return Err(Error::transport("no snmp sockets could be bound"));
        }

        Ok(Self {
            sock4,
            sock6,
            buf: Box::new([0u8; MAX_PACKET]),
        })
    }

    /// Default local addresses: the v4 and v6 wildcards
    #[must_use]
    pub(crate) fn default_bind_addrs() -> Vec<IpAddr> {
        vec![
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        ]
    }

    /// Send a packet via the socket matching the destination family
    pub(crate) fn send(&self, packet: &[u8], dest: SocketAddr) -> Result<()> {
        let socket = match dest {
            SocketAddr::V4(_) => self.sock4.as_ref(),
            SocketAddr::V6(_) => self.sock6.as_ref(),
        };
        let Some(socket) = socket else {
            return Err(Error::transport(format!(
                "no local socket for address family of {dest}"
            )));
        };
        socket
            .try_send_to(packet, dest)
            .map_err(|e| Error::transport_with_source(format!("couldn't send snmp packet to {dest}"), e))?;
        Ok(())
    }

    /// Wait until any bound socket is readable
    pub(crate) async fn readable(&self) -> io::Result<Family> {
        let wait4 = async {
            match &self.sock4 {
                Some(socket) => socket.readable().await.map(|()| Family::V4),
                None => std::future::pending().await,
            }
        };
        let wait6 = async {
            match &self.sock6 {
                Some(socket) => socket.readable().await.map(|()| Family::V6),
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            result = wait4 => result,
            result = wait6 => result,
        }
    }

    /// Nonblocking receive into the scratch buffer
    ///
    /// Returns `None` once the socket is drained.
    pub(crate) fn try_recv(&mut self, family: Family) -> io::Result<Option<(usize, SocketAddr)>> {
        let socket = match family {
            Family::V4 => self.sock4.as_ref(),
            Family::V6 => self.sock6.as_ref(),
        };
        let Some(socket) = socket else {
            return Ok(None);
        };
        match socket.try_recv_from(&mut self.buf[..]) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The scratch buffer holding the last received datagram
    #[must_use]
    pub(crate) fn recv_buf(&self) -> &[u8] {
        &self.buf[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_loopback_send() {
        let transport = Transport::bind(&[IpAddr::V4(Ipv4Addr::LOCALHOST)])
            .await
            .unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = peer.local_addr().unwrap();

        transport.send(b"ping", dest).unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
    }

    #[tokio::test]
    async fn test_send_without_family_socket_fails() {
        let transport = Transport::bind(&[IpAddr::V4(Ipv4Addr::LOCALHOST)])
            .await
            .unwrap();
        let dest: SocketAddr = "[::1]:161".parse().unwrap();
        assert!(transport.send(b"ping", dest).is_err());
    }

    #[tokio::test]
    async fn test_readable_and_drain() {
        let mut transport = Transport::bind(&[IpAddr::V4(Ipv4Addr::LOCALHOST)])
            .await
            .unwrap();
        let local = match &transport.sock4 {
            Some(s) => s.local_addr().unwrap(),
            None => unreachable!(),
        };

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"one", local).await.unwrap();
        peer.send_to(b"two", local).await.unwrap();

        let mut seen = 0;
        while seen < 2 {
            let family = transport.readable().await.unwrap();
            assert_eq!(family, Family::V4);
            while let Some((len, _)) = transport.try_recv(family).unwrap() {
                assert_eq!(len, 3);
                seen += 1;
            }
        }
    }
}
