//! Network Infrastructure
//!
//! Peer discovery, address resolution and outbound routing for IMC nodes,
//! plus the UDP endpoint they communicate through.
//!
//! - [`discovery`]: node registry fed by Announce/Heartbeat/EntityList
//! - [`routing`]: resolve → stamp → pick endpoint → encode → send
//! - [`transports`]: UDP sockets and the [`DatagramSink`] seam

pub mod discovery;
pub mod error;
pub mod routing;
pub mod transports;

pub use discovery::{
    Node, NodeEvent, NodeId, NodeKey, NodeRegistry, ResolveError, ServiceEndpoint, IMC_UDP_SCHEME,
};
pub use error::{Result, RouteError, TransportError};
pub use routing::{LocalIdentity, OutboundRouter, StaticSelector, Subnet, SubnetSource};
pub use transports::{
    DatagramSink, DiscardSink, MemorySink, UdpConfig, UdpEndpoint, UdpSink, IMC_MULTICAST_GROUP,
    IMC_MULTICAST_PORTS, IMC_PORT_RANGE,
};
