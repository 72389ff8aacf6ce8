//! Outbound Routing
//!
//! Turns "send this message to that peer" into datagrams:
//!
//! 1. resolve the peer through the [`NodeRegistry`]
//! 2. stamp source address/entity, timestamp and destination
//! 3. pick an `imc+udp` endpoint inside one of the local subnets, or fall back
//!    to loopback on the advertised ports (same-host peers without an
//!    external interface)
//! 4. encode once and hand the frame to the [`DatagramSink`]
//!
//! Every routed message is also mirrored to the static destinations for its
//! type.

use crate::discovery::{Node, NodeId, NodeRegistry, IMC_UDP_SCHEME};
use crate::error::RouteError;
use crate::transports::DatagramSink;
use codec::{Message, MessageCodec};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tracing::{debug, warn};

pub mod static_routes;
pub mod subnet;

pub use static_routes::{StaticRoutes, StaticSelector};
pub use subnet::{local_interfaces, local_subnets, Interface, Subnet};

/// Where the router learns the local subnets from
#[derive(Debug, Clone)]
pub enum SubnetSource {
    /// Query the interfaces on every routing decision
    System,
    /// A fixed set
    Fixed(Vec<Subnet>),
}

/// Identity stamped on every outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIdentity {
    pub address: u16,
    pub entity: u8,
}

pub struct OutboundRouter {
    identity: LocalIdentity,
    codec: Arc<dyn MessageCodec>,
    sink: Arc<dyn DatagramSink>,
    subnets: SubnetSource,
    static_routes: StaticRoutes,
}

impl std::fmt::Debug for OutboundRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundRouter")
            .field("identity", &self.identity)
            .field("subnets", &self.subnets)
            .field("static_routes", &self.static_routes)
            .finish()
    }
}

impl OutboundRouter {
    pub fn new(
        identity: LocalIdentity,
        codec: Arc<dyn MessageCodec>,
        sink: Arc<dyn DatagramSink>,
    ) -> Self {
        Self {
            identity,
            codec,
            sink,
            subnets: SubnetSource::System,
            static_routes: StaticRoutes::new(),
        }
    }

    pub fn with_subnets(mut self, subnets: SubnetSource) -> Self {
        self.subnets = subnets;
        self
    }

    pub fn identity(&self) -> LocalIdentity {
        self.identity
    }

    pub fn codec(&self) -> &Arc<dyn MessageCodec> {
        &self.codec
    }

    /// Replace the sink (e.g. once the IMC socket is bound)
    pub fn set_sink(&mut self, sink: Arc<dyn DatagramSink>) {
        self.sink = sink;
    }

    pub fn static_routes_mut(&mut self) -> &mut StaticRoutes {
        &mut self.static_routes
    }

    fn local_subnets(&self) -> Vec<Subnet> {
        match &self.subnets {
            SubnetSource::Fixed(subnets) => subnets.clone(),
            SubnetSource::System => local_subnets().unwrap_or_else(|error| {
                warn!(%error, "Unable to read local subnets, using loopback only");
                Vec::new()
            }),
        }
    }

    /// Pick the destinations for a node
    ///
    /// The first advertised endpoint inside a local subnet wins. With no match,
    /// every distinct advertised port is tried on loopback.
    pub fn route(&self, node: &Node) -> Result<Vec<SocketAddr>, RouteError> {
        let endpoints = node.endpoints(IMC_UDP_SCHEME);
        let no_route = || RouteError::NoRoute {
            node: node.key.clone(),
            scheme: IMC_UDP_SCHEME.to_string(),
        };
        if endpoints.is_empty() {
            return Err(no_route());
        }

        let subnets = self.local_subnets();
        let in_subnet = endpoints.iter().find_map(|ep| match ep.socket_addr()? {
            SocketAddr::V4(addr) if subnets.iter().any(|s| s.contains(*addr.ip())) => {
                Some(SocketAddr::V4(addr))
            }
            _ => None,
        });
        if let Some(addr) = in_subnet {
            return Ok(vec![addr]);
        }

        let mut fallback: Vec<SocketAddr> = Vec::new();
        for port in endpoints.iter().filter_map(|ep| ep.port) {
            let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
            if !fallback.contains(&addr) {
                fallback.push(addr);
            }
        }
        if fallback.is_empty() {
            return Err(no_route());
        }
        debug!(node = %node.key, ?fallback, "No endpoint in a local subnet, using loopback");
        Ok(fallback)
    }

    fn stamp(&self, msg: &mut Message, set_timestamp: bool) {
        msg.header.src = self.identity.address;
        msg.header.src_ent = self.identity.entity;
        if set_timestamp {
            msg.set_timestamp_now();
        }
    }

    /// Send `msg` to the node named by `id`, and mirror it to static routes
    ///
    /// The message is stamped in place, once the node resolves, so the caller
    /// can record exactly what went out. Returns the unicast destinations used.
    pub fn send(
        &self,
        registry: &NodeRegistry,
        id: impl Into<NodeId>,
        msg: &mut Message,
        set_timestamp: bool,
    ) -> Result<Vec<SocketAddr>, RouteError> {
        let node = registry.resolve(id)?;
        self.stamp(msg, set_timestamp);
        msg.header.dst = node.address();

        let destinations = self.route(node)?;
        let frame = self.codec.encode(msg)?;
        for addr in &destinations {
            self.sink.send_to(&frame, *addr)?;
        }

        self.send_static(msg, false)?;
        Ok(destinations)
    }

    /// Send `msg` to the static destinations for its type
    ///
    /// The destination address is left as set by the caller.
    pub fn send_static(&self, msg: &mut Message, set_timestamp: bool) -> Result<usize, RouteError> {
        self.stamp(msg, set_timestamp);
        let mut destinations = self.static_routes.destinations(msg.type_id()).peekable();
        if destinations.peek().is_none() {
            return Ok(0);
        }

        let frame = self.codec.encode(msg)?;
        let mut sent = 0;
        for addr in destinations {
            self.sink.send_to(&frame, addr)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Send `msg` to explicit addresses (multicast discovery, unresolved peers)
    pub fn send_to_addrs(
        &self,
        msg: &mut Message,
        addrs: impl IntoIterator<Item = SocketAddr>,
        set_timestamp: bool,
    ) -> Result<usize, RouteError> {
        self.stamp(msg, set_timestamp);
        let frame = self.codec.encode(msg)?;
        let mut sent = 0;
        for addr in addrs {
            self.sink.send_to(&frame, addr)?;
            sent += 1;
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{NodeKey, ServiceEndpoint};
    use crate::transports::MemorySink;
    use codec::{Heartbeat, ImcCodec};

    fn router(sink: &MemorySink, subnets: Vec<Subnet>) -> OutboundRouter {
        OutboundRouter::new(
            LocalIdentity {
                address: 0x3334,
                entity: 0,
            },
            Arc::new(ImcCodec),
            Arc::new(sink.clone()),
        )
        .with_subnets(SubnetSource::Fixed(subnets))
    }

    fn registry_with(services: &[&str]) -> NodeRegistry {
        let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
        let endpoints = services.iter().map(|s| s.parse::<ServiceEndpoint>().unwrap());
        reg.add_node(Node::fixed(NodeKey::new(0x16, "lauv-xplore-1"), endpoints));
        reg
    }

    #[test]
    fn test_send_stamps_and_encodes() {
        let sink = MemorySink::new();
        let lan = Subnet::with_prefix(Ipv4Addr::new(10, 0, 0, 1), 24);
        let router = router(&sink, vec![lan]);
        let reg = registry_with(&["imc+udp://10.0.0.5:6002/"]);

        let mut msg = Message::new(Heartbeat);
        let sent = router.send(&reg, 0x16, &mut msg, true).unwrap();
        assert_eq!(sent, vec!["10.0.0.5:6002".parse().unwrap()]);
        assert_eq!(msg.header.src, 0x3334);
        assert_eq!(msg.header.dst, 0x16);
        assert!(msg.header.timestamp > 0.0);

        let (_, frame) = &sink.sent()[0];
        assert_eq!(ImcCodec.decode(frame).unwrap().header.dst, 0x16);
    }

    #[test]
    fn test_timestamp_suppressed() {
        let sink = MemorySink::new();
        let router = router(&sink, vec![]);
        let reg = registry_with(&["imc+udp://10.0.0.5:6002/"]);

        let mut msg = Message::new(Heartbeat);
        msg.header.timestamp = 42.0;
        router.send(&reg, "lauv-xplore-1", &mut msg, false).unwrap();
        assert_eq!(msg.header.timestamp, 42.0);
    }

    #[test]
    fn test_no_route_without_imc_udp() {
        let sink = MemorySink::new();
        let router = router(&sink, vec![]);
        let reg = registry_with(&["http://10.0.0.5:8080/dune"]);

        let err = router.send(&reg, 0x16, &mut Message::new(Heartbeat), true).unwrap_err();
        assert!(matches!(err, RouteError::NoRoute { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unresolved_node() {
        let sink = MemorySink::new();
        let router = router(&sink, vec![]);
        let reg = registry_with(&[]);
        let mut msg = Message::new(Heartbeat);
        let before = msg.header;
        let err = router.send(&reg, 0x99, &mut msg, true).unwrap_err();
        assert!(err.is_peer_absent());
        assert_eq!(msg.header, before);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_static_mirroring() {
        let sink = MemorySink::new();
        let mut router = router(&sink, vec![Subnet::with_prefix(Ipv4Addr::new(10, 0, 0, 1), 8)]);
        let mirror: ServiceEndpoint = "imc+udp://10.9.9.9:6100/".parse().unwrap();
        router.static_routes_mut().add(&mirror, StaticSelector::All);
        let reg = registry_with(&["imc+udp://10.0.0.5:6002/"]);

        router.send(&reg, 0x16, &mut Message::new(Heartbeat), true).unwrap();
        assert_eq!(
            sink.destinations(),
            vec!["10.0.0.5:6002".parse().unwrap(), "10.9.9.9:6100".parse().unwrap()]
        );

        assert_eq!(router.send_static(&mut Message::new(Heartbeat), true).unwrap(), 1);
    }
}
