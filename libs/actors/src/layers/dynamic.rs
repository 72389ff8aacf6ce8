//! Announcing layer
//!
//! Makes this node visible to the fleet:
//!
//! - Announce every 10 s to the multicast group on every discovery port
//! - Heartbeat every 1 s to the configured peers
//! - EntityList QUERY every 30 s to nodes that have not reported entities
//! - EntityList REPORT in reply to a QUERY
//!
//! Peers that cannot be resolved are skipped quietly; an ambiguous peer name
//! is logged with its candidates and skipped as well.

use crate::builder::{SchedulerBuilder, DYNAMIC_DEPTH};
use crate::context::Context;
use crate::system::Actor;
use codec::{Announce, EntityList, EntityListOp, Heartbeat, Message, SystemType, NULL_ID};
use network::routing::{local_interfaces, Interface};
use network::{NodeId, ResolveError, RouteError, IMC_MULTICAST_GROUP, IMC_MULTICAST_PORTS};
use node_config::NodeConfig;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, warn};

pub const LAYER: &str = "dynamic";

#[derive(Debug, Clone)]
pub struct DynamicSettings {
    pub system_name: String,
    pub system_type: SystemType,
    pub announce_interval: Duration,
    pub heartbeat_interval: Duration,
    pub entity_query_interval: Duration,
    pub heartbeat_peers: Vec<NodeId>,
    pub multicast_group: Ipv4Addr,
    pub multicast_ports: RangeInclusive<u16>,
}

impl DynamicSettings {
    pub fn new(system_name: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            system_type: SystemType::Ccu,
            announce_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(1),
            entity_query_interval: Duration::from_secs(30),
            heartbeat_peers: Vec::new(),
            multicast_group: IMC_MULTICAST_GROUP,
            multicast_ports: IMC_MULTICAST_PORTS,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        let discovery = &config.discovery;
        Self {
            system_name: config.identity.system_name(),
            system_type: config.identity.system_type,
            announce_interval: discovery.announce_interval(),
            heartbeat_interval: discovery.heartbeat_interval(),
            entity_query_interval: discovery.entity_query_interval(),
            heartbeat_peers: discovery.heartbeat_peers.iter().map(|p| parse_peer(p)).collect(),
            multicast_group: config.network.multicast_group,
            multicast_ports: config.network.multicast_ports.to_range(),
        }
    }

    fn announce_targets(&self) -> Vec<SocketAddr> {
        self.multicast_ports
            .clone()
            .map(|port| SocketAddr::V4(SocketAddrV4::new(self.multicast_group, port)))
            .collect()
    }
}

/// Peer identifier from config: `0x0016` or `22` name an address, anything
/// else a system name
pub fn parse_peer(peer: &str) -> NodeId {
    let peer = peer.trim();
    let address = match peer.strip_prefix("0x").or_else(|| peer.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None if !peer.is_empty() && peer.bytes().all(|b| b.is_ascii_digit()) => peer.parse().ok(),
        None => None,
    };
    match address {
        Some(address) => NodeId::Address(address),
        None => NodeId::Name(peer.to_string()),
    }
}

/// Service string advertised for an IMC socket on `port`
///
/// Uses the external interfaces, or the loopback ones when the host has no
/// external interface.
pub fn announce_services(interfaces: &[Interface], port: u16) -> String {
    let external: Vec<&Interface> = interfaces.iter().filter(|i| !i.is_loopback()).collect();
    let chosen: Vec<&Interface> = if external.is_empty() {
        interfaces.iter().filter(|i| i.is_loopback()).collect()
    } else {
        external
    };

    chosen
        .iter()
        .map(|i| format!("imc+udp://{}:{}/", i.addr, port))
        .collect::<Vec<_>>()
        .join(";")
}

fn announce(settings: &DynamicSettings, ctx: &mut Context) {
    let Some(port) = ctx.imc_port() else {
        debug!("No IMC socket bound, skipping announce");
        return;
    };

    let interfaces = local_interfaces(true).unwrap_or_else(|error| {
        warn!(%error, "Unable to list interfaces, announcing without services");
        Vec::new()
    });
    let mut msg = Message::new(Announce {
        sys_name: settings.system_name.clone(),
        sys_type: settings.system_type,
        owner: NULL_ID,
        services: announce_services(&interfaces, port),
        ..Announce::default()
    });
    msg.header.dst = NULL_ID;
    if let Err(error) = ctx.send_to_addrs(&mut msg, settings.announce_targets(), true) {
        warn!(%error, "Unable to send announce");
    }
}

fn heartbeat(peers: &[NodeId], ctx: &mut Context) {
    for peer in peers {
        match ctx.send(peer.clone(), Heartbeat) {
            Ok(_) => {}
            Err(RouteError::Resolve(ResolveError::Ambiguous { candidates, .. })) => {
                warn!(peer = %peer, ?candidates, "Heartbeat peer is ambiguous, skipping");
            }
            Err(error) if error.is_peer_absent() => {}
            Err(error) => warn!(peer = %peer, %error, "Unable to send heartbeat"),
        }
    }
}

fn query_entities(ctx: &mut Context) {
    for key in ctx.registry().nodes_without_entities() {
        if let Err(error) = ctx.send(&key, EntityList::query()) {
            debug!(node = %key, %error, "Unable to query entities");
        }
    }
}

fn report_entities(ctx: &mut Context, msg: &Message) -> anyhow::Result<()> {
    let Some(list) = msg.get::<EntityList>() else {
        return Ok(());
    };
    if list.op != EntityListOp::Query {
        return Ok(());
    }

    let report = EntityList::report(ctx.entities().iter().map(|(label, id)| (label.as_str(), *id)));
    match ctx.send(msg, report) {
        Ok(_) => Ok(()),
        Err(error) if error.is_peer_absent() => {
            debug!(src = msg.src(), %error, "EntityList query from unknown node");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Register the announcing tasks and the entity reply handler
pub fn install<A: Actor>(builder: &mut SchedulerBuilder<A>, settings: DynamicSettings) {
    let peers = settings.heartbeat_peers.clone();
    let heartbeat_interval = settings.heartbeat_interval;
    let query_interval = settings.entity_query_interval;
    let announce_interval = settings.announce_interval;

    builder
        .layer(LAYER, DYNAMIC_DEPTH)
        .subscribe::<EntityList, _>("entity_query", |_, ctx, msg| report_entities(ctx, msg))
        .periodic("announce", announce_interval, move |_, ctx| {
            announce(&settings, ctx);
            Ok(())
        })
        .periodic("heartbeat", heartbeat_interval, move |_, ctx| {
            heartbeat(&peers, ctx);
            Ok(())
        })
        .periodic("entity_query", query_interval, |_, ctx| {
            query_entities(ctx);
            Ok(())
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addr: [u8; 4]) -> Interface {
        Interface {
            name: name.to_string(),
            addr: Ipv4Addr::from(addr),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
        }
    }

    #[test]
    fn test_parse_peer() {
        assert_eq!(parse_peer("0x0016"), NodeId::Address(0x16));
        assert_eq!(parse_peer("22"), NodeId::Address(22));
        assert_eq!(parse_peer("lauv-xplore-1"), NodeId::Name("lauv-xplore-1".to_string()));
        assert_eq!(parse_peer("0xZZ"), NodeId::Name("0xZZ".to_string()));
    }

    #[test]
    fn test_services_prefer_external_interfaces() {
        let interfaces = vec![
            iface("lo", [127, 0, 0, 1]),
            iface("eth0", [10, 0, 10, 5]),
            iface("wlan0", [192, 168, 1, 3]),
        ];
        assert_eq!(
            announce_services(&interfaces, 6002),
            "imc+udp://10.0.10.5:6002/;imc+udp://192.168.1.3:6002/"
        );
    }

    #[test]
    fn test_services_fall_back_to_loopback() {
        let interfaces = vec![iface("lo", [127, 0, 0, 1])];
        assert_eq!(announce_services(&interfaces, 6001), "imc+udp://127.0.0.1:6001/");
        assert_eq!(announce_services(&[], 6001), "");
    }

    #[test]
    fn test_announce_targets_every_discovery_port() {
        let settings = DynamicSettings::new("ccu-rust");
        let targets = settings.announce_targets();
        assert_eq!(targets.len(), 5);
        assert_eq!(targets[0], "224.0.75.69:30100".parse().unwrap());
        assert_eq!(targets[4], "224.0.75.69:30104".parse().unwrap());
    }
}
