//! UDP Network Transport Implementation
//!
//! Binds the two sockets an IMC node needs: a unicast socket on the first
//! free port of the IMC range (or a static port) and a multicast socket on
//! the first free discovery port, joined to the IMC group.

use super::{DatagramSink, MAX_DATAGRAM_SIZE};
use crate::{Result, TransportError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// UDP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Local interface to bind to
    pub bind_ip: Ipv4Addr,
    /// Bind exactly this port instead of scanning
    pub static_port: Option<u16>,
    /// Ports tried in order when no static port is set
    pub port_range: RangeInclusive<u16>,
    /// Buffer size for reading
    pub buffer_size: usize,
    /// Multicast settings
    pub multicast: Option<MulticastConfig>,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED,
            static_port: None,
            port_range: super::IMC_PORT_RANGE,
            buffer_size: MAX_DATAGRAM_SIZE,
            multicast: None,
        }
    }
}

impl UdpConfig {
    /// IMC unicast socket, also used to send announces to the group
    ///
    /// Multicast loopback stays on so nodes sharing a host hear each other.
    pub fn imc(static_port: Option<u16>) -> Self {
        Self {
            static_port,
            multicast: Some(MulticastConfig {
                join: false,
                loopback: true,
                ttl: 10,
                ..MulticastConfig::default()
            }),
            ..Self::default()
        }
    }

    /// Discovery socket joined to the IMC multicast group
    pub fn discovery() -> Self {
        Self {
            port_range: super::IMC_MULTICAST_PORTS,
            multicast: Some(MulticastConfig::default()),
            ..Self::default()
        }
    }

    fn candidate_ports(&self) -> Vec<u16> {
        match self.static_port {
            Some(port) => vec![port],
            None => self.port_range.clone().collect(),
        }
    }
}

/// Multicast configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastConfig {
    /// Multicast group address
    pub group: Ipv4Addr,
    /// Interface for multicast
    pub interface: Ipv4Addr,
    /// TTL for multicast packets (keep below 32 for the local network)
    pub ttl: u32,
    /// Receive our own multicast traffic
    pub loopback: bool,
    /// Join the group (false for a socket that only sends to it)
    pub join: bool,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: super::IMC_MULTICAST_GROUP,
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 5,
            loopback: false,
            join: true,
        }
    }
}

/// A bound UDP socket
#[derive(Debug, Clone)]
pub struct UdpEndpoint {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    buffer_size: usize,
}

impl UdpEndpoint {
    /// Bind to the static port, or to the first free port of the range
    pub async fn bind(config: UdpConfig) -> Result<Self> {
        let candidates = config.candidate_ports();
        let mut socket = None;
        for port in &candidates {
            match UdpSocket::bind(SocketAddrV4::new(config.bind_ip, *port)).await {
                Ok(s) => {
                    socket = Some(s);
                    break;
                }
                Err(e) => debug!(port, error = %e, "UDP port unavailable"),
            }
        }

        let socket = socket.ok_or_else(|| {
            TransportError::bind(
                format!("no free UDP port on {}", config.bind_ip),
                candidates.clone(),
            )
        })?;

        if let Some(ref multicast) = config.multicast {
            if multicast.join {
                socket
                    .join_multicast_v4(multicast.group, multicast.interface)
                    .map_err(|e| {
                        TransportError::network_with_source(
                            format!("Failed to join multicast group {}", multicast.group),
                            e,
                        )
                    })?;
            }
            socket.set_multicast_ttl_v4(multicast.ttl).map_err(|e| {
                TransportError::network_with_source(
                    format!("Failed to set multicast TTL to {}", multicast.ttl),
                    e,
                )
            })?;
            socket
                .set_multicast_loop_v4(multicast.loopback)
                .map_err(|e| TransportError::network_with_source("Failed to set multicast loop", e))?;
        }

        let local_addr = socket.local_addr()?;
        info!(%local_addr, multicast = config.multicast.as_ref().map_or(false, |m| m.join), "UDP endpoint bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            buffer_size: config.buffer_size,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Wait for the next datagram
    pub async fn recv_from(&self) -> Result<(Bytes, SocketAddr)> {
        let mut buffer = vec![0u8; self.buffer_size];
        let (len, sender) = self
            .socket
            .recv_from(&mut buffer)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to receive UDP packet", e))?;
        buffer.truncate(len);
        Ok((Bytes::from(buffer), sender))
    }

    /// Sending half sharing this socket
    pub fn sink(&self) -> UdpSink {
        UdpSink {
            socket: Arc::clone(&self.socket),
        }
    }
}

/// Non-blocking sender over a shared UDP socket
#[derive(Debug, Clone)]
pub struct UdpSink {
    socket: Arc<UdpSocket>,
}

impl DatagramSink for UdpSink {
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::send(
                format!("datagram of {} bytes exceeds {}", datagram.len(), MAX_DATAGRAM_SIZE),
                addr,
                None,
            ));
        }

        let sent = self
            .socket
            .try_send_to(datagram, addr)
            .map_err(|e| TransportError::send("Failed to send UDP packet", addr, Some(e)))?;
        debug!(%addr, bytes = sent, "Sent UDP packet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(port_range: RangeInclusive<u16>) -> UdpConfig {
        UdpConfig {
            bind_ip: Ipv4Addr::LOCALHOST,
            port_range,
            ..UdpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_port_scan_skips_taken_port() {
        let first = UdpEndpoint::bind(loopback(0..=0)).await.unwrap();
        let taken = first.port();

        let mut config = loopback(taken..=taken);
        config.static_port = None;
        let err = UdpEndpoint::bind(config).await.unwrap_err();
        assert!(matches!(err, TransportError::Bind { ref attempted, .. } if attempted == &vec![taken]));
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let a = UdpEndpoint::bind(loopback(0..=0)).await.unwrap();
        let b = UdpEndpoint::bind(loopback(0..=0)).await.unwrap();

        a.sink().send_to(b"\x54\xFE", b.local_addr()).unwrap();
        let (data, sender) = b.recv_from().await.unwrap();
        assert_eq!(&data[..], b"\x54\xFE");
        assert_eq!(sender, a.local_addr());
    }
}
