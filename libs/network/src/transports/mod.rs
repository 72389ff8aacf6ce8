//! Datagram Transport Layer
//!
//! The runtime needs two things from a transport: "deliver these bytes to
//! host:port" ([`DatagramSink`]) and "tell me when a datagram arrives"
//! ([`UdpEndpoint::recv_from`]). Sending is synchronous and non-blocking so it
//! can be called from inside a handler without a suspension point.

use crate::Result;
use std::net::SocketAddr;

pub mod memory;
pub mod udp;

pub use memory::{DiscardSink, MemorySink};
pub use udp::{MulticastConfig, UdpConfig, UdpEndpoint, UdpSink};

/// Well-known IMC multicast group
pub const IMC_MULTICAST_GROUP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(224, 0, 75, 69);

/// Candidate multicast ports for discovery traffic
pub const IMC_MULTICAST_PORTS: std::ops::RangeInclusive<u16> = 30100..=30104;

/// Port range scanned for the IMC unicast socket
pub const IMC_PORT_RANGE: std::ops::RangeInclusive<u16> = 6001..=6029;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Outbound half of a datagram transport
pub trait DatagramSink: Send + Sync {
    /// Hand one datagram to the transport without waiting
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> Result<()>;
}

impl<T: DatagramSink + ?Sized> DatagramSink for std::sync::Arc<T> {
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        (**self).send_to(datagram, addr)
    }
}
