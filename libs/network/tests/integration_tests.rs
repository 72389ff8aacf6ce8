//! Integration Tests for the Network Crate
//!
//! Exercises the registry and router together the way the runtime drives
//! them: announces arrive, peers are resolved, messages are routed.

use codec::{Announce, EntityList, Heartbeat, ImcCodec, Message, MessageCodec, Payload};
use network::{
    LocalIdentity, MemorySink, NodeEvent, NodeKey, NodeRegistry, OutboundRouter, ResolveError,
    RouteError, Subnet, SubnetSource,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

fn from(src: u16, payload: impl Into<Payload>) -> Message {
    let mut msg = Message::new(payload);
    msg.header.src = src;
    msg
}

fn announce(src: u16, name: &str, services: &str) -> Message {
    from(
        src,
        Announce {
            sys_name: name.to_string(),
            services: services.to_string(),
            ..Announce::default()
        },
    )
}

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

#[test]
fn test_colliding_address_is_ambiguous() {
    let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
    reg.on_announce(&announce(0x16, "lauv-xplore-1", ""), 0.0);
    reg.on_announce(&announce(0x16, "lauv-xplore-2", ""), 0.0);
    assert_eq!(reg.len(), 2);

    match reg.resolve(0x16) {
        Err(ResolveError::Ambiguous { candidates, .. }) => {
            assert_eq!(
                candidates,
                vec![NodeKey::new(0x16, "lauv-xplore-1"), NodeKey::new(0x16, "lauv-xplore-2")]
            );
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }

    // the full key and the distinct names still resolve
    assert!(reg.resolve((0x16, "lauv-xplore-2")).is_ok());
    assert!(reg.resolve("lauv-xplore-1").is_ok());
}

#[test]
fn test_colliding_name_is_ambiguous() {
    let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
    reg.on_announce(&announce(0x16, "lauv-xplore-1", ""), 0.0);
    reg.on_announce(&announce(0x17, "lauv-xplore-1", ""), 0.0);

    let err = reg.resolve("lauv-xplore-1").unwrap_err();
    assert_eq!(err.candidates().len(), 2);
    assert!(reg.resolve(0x17).is_ok());
}

#[test]
fn test_heartbeat_ambiguous_source_dropped() {
    let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
    reg.on_announce(&announce(0x16, "a", ""), 0.0);
    reg.on_announce(&announce(0x16, "b", ""), 0.0);
    assert_eq!(reg.on_heartbeat(&from(0x16, Heartbeat), 1.0), None);
    assert!(reg.nodes().all(|n| n.last_heartbeat.is_none()));
}

#[test]
fn test_in_subnet_endpoint_preferred() {
    let sink = MemorySink::new();
    let router = router(&sink, vec![Subnet::with_prefix(Ipv4Addr::new(192, 168, 1, 3), 24)]);
    let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
    reg.on_announce(
        &announce(
            0x16,
            "lauv-xplore-1",
            "imc+udp://10.0.10.20:6002/;imc+udp://192.168.1.40:6002/",
        ),
        0.0,
    );

    let sent = router
        .send(&reg, 0x16, &mut Message::new(Heartbeat), true)
        .unwrap();
    let expected: SocketAddr = "192.168.1.40:6002".parse().unwrap();
    assert_eq!(sent, vec![expected]);
    assert_eq!(sink.destinations(), vec![expected]);
}

#[test]
fn test_loopback_fallback_outside_subnets() {
    let sink = MemorySink::new();
    let router = router(&sink, vec![Subnet::with_prefix(Ipv4Addr::new(192, 168, 1, 3), 24)]);
    let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
    reg.on_announce(
        &announce(0x16, "sim", "imc+udp://10.0.10.20:6003/;imc+udp://172.16.0.2:6003/"),
        0.0,
    );

    let sent = router
        .send(&reg, "sim", &mut Message::new(EntityList::query()), true)
        .unwrap();
    assert_eq!(sent, vec!["127.0.0.1:6003".parse::<SocketAddr>().unwrap()]);

    let (_, frame) = &sink.sent()[0];
    let decoded = ImcCodec.decode(frame).unwrap();
    assert_eq!(decoded.header.src, 0x3334);
    assert_eq!(decoded.header.dst, 0x16);
}

#[test]
fn test_route_after_prune_is_absent() {
    let sink = MemorySink::new();
    let router = router(&sink, vec![]);
    let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
    reg.on_announce(&announce(0x16, "lauv-xplore-1", "imc+udp://10.0.0.5:6002/"), 0.0);

    assert_eq!(
        reg.prune(61.0),
        vec![NodeEvent::Disconnected(NodeKey::new(0x16, "lauv-xplore-1"))]
    );
    let err = router
        .send(&reg, 0x16, &mut Message::new(Heartbeat), true)
        .unwrap_err();
    assert!(matches!(err, RouteError::Resolve(ResolveError::NotFound { .. })));
}

proptest! {
    #[test]
    fn prop_distinct_announces_resolve_uniquely(
        peers in prop::collection::btree_map(1u16..0x3000, "[a-z]{3,12}", 1..20)
    ) {
        // keep names distinct as well as addresses
        let mut seen = BTreeMap::new();
        for (address, name) in &peers {
            seen.entry(name.clone()).or_insert(*address);
        }

        let mut reg = NodeRegistry::new(0x3334, "ccu-rust");
        for (name, address) in &seen {
            let event = reg.on_announce(&announce(*address, name, ""), 0.0);
            prop_assert_eq!(event, Some(NodeEvent::Connected(NodeKey::new(*address, name.as_str()))));
        }

        prop_assert_eq!(reg.len(), seen.len());
        for (name, address) in &seen {
            prop_assert_eq!(&reg.resolve(*address).unwrap().key.name, name);
            prop_assert_eq!(reg.resolve(name.as_str()).unwrap().address(), *address);
        }
    }
}
