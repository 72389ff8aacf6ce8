//! Node Assembly
//!
//! Turns a [`NodeConfig`] into a ready-to-run [`SchedulerBuilder`]: identity,
//! registry, router, sockets, static transports, session recording and the
//! built-in layers. Applications add their own layers to the returned
//! builder before building it.

use crate::builder::SchedulerBuilder;
use crate::context::Context;
use crate::error::{ActorError, Result};
use crate::layers::{base, dynamic, BaseSettings, DynamicSettings};
use crate::recording::SessionRecorder;
use crate::system::Actor;
use crate::transport::Listener;
use codec::{ImcCodec, MessageCodec};
use network::transports::MulticastConfig;
use network::{
    DatagramSink, DiscardSink, LocalIdentity, NodeRegistry, OutboundRouter, ServiceEndpoint,
    StaticSelector, UdpConfig, UdpEndpoint,
};
use node_config::{NodeConfig, StaticTransportConfig};
use std::sync::Arc;
use tracing::info;

/// Selectors for a static transport's `types` list
///
/// Entries are type names or numeric ids; an empty list or `*` selects every
/// message.
pub fn static_selectors(codec: &dyn MessageCodec, types: &[String]) -> Result<Vec<StaticSelector>> {
    if types.is_empty() || types.iter().any(|t| t.trim() == "*") {
        return Ok(vec![StaticSelector::All]);
    }
    types
        .iter()
        .map(|entry| {
            let entry = entry.trim();
            entry
                .parse::<u16>()
                .ok()
                .or_else(|| codec.type_id(entry))
                .map(StaticSelector::Type)
                .ok_or_else(|| {
                    ActorError::configuration(
                        format!("unknown message type '{}'", entry),
                        Some("static_transports.types"),
                    )
                })
        })
        .collect()
}

fn add_static_transport(ctx: &mut Context, codec: &dyn MessageCodec, transport: &StaticTransportConfig) -> Result<()> {
    let endpoint: ServiceEndpoint = transport
        .uri
        .parse()
        .map_err(|e: network::discovery::ServiceParseError| {
            ActorError::configuration(e.to_string(), Some("static_transports.uri"))
        })?;
    let selectors = static_selectors(codec, &transport.types)?;
    if !ctx.add_static_transport(&endpoint, &selectors) {
        return Err(ActorError::configuration(
            format!("'{}' needs a literal IPv4 address and port", transport.uri),
            Some("static_transports.uri"),
        ));
    }
    info!(uri = %transport.uri, ?selectors, "Static transport added");
    Ok(())
}

/// Build a scheduler for `actor` from configuration
///
/// With networking enabled this binds the IMC unicast socket and the
/// multicast discovery socket; the announcing layer is installed only then.
pub async fn node_builder<A: Actor>(actor: A, config: &NodeConfig) -> Result<SchedulerBuilder<A>> {
    let identity = &config.identity;
    let name = identity.system_name();
    let codec: Arc<dyn MessageCodec> = Arc::new(ImcCodec);

    let registry = NodeRegistry::new(identity.address, name.as_str())
        .with_liveness_timeout(config.discovery.liveness_timeout());

    let mut listeners = Vec::new();
    let mut imc_port = None;
    let sink: Arc<dyn DatagramSink> = if config.network.enabled {
        let net = &config.network;
        let imc = UdpEndpoint::bind(UdpConfig {
            bind_ip: net.bind_ip,
            port_range: net.port_range.to_range(),
            ..UdpConfig::imc(net.static_port)
        })
        .await?;
        let discovery = UdpEndpoint::bind(UdpConfig {
            bind_ip: net.bind_ip,
            port_range: net.multicast_ports.to_range(),
            multicast: Some(MulticastConfig {
                group: net.multicast_group,
                ..MulticastConfig::default()
            }),
            ..UdpConfig::discovery()
        })
        .await?;

        imc_port = Some(imc.port());
        let sink = Arc::new(imc.sink());
        listeners.push(Listener::udp("imc", imc, Arc::clone(&codec)));
        listeners.push(Listener::udp("discovery", discovery, Arc::clone(&codec)));
        sink
    } else {
        info!("Networking disabled, outbound traffic is discarded");
        Arc::new(DiscardSink)
    };

    let router = OutboundRouter::new(
        LocalIdentity {
            address: identity.address,
            entity: identity.entity,
        },
        Arc::clone(&codec),
        sink,
    );

    let mut ctx = Context::new(registry, router).with_entities(identity.entities.clone());
    ctx.set_imc_port(imc_port);
    for transport in &config.static_transports {
        add_static_transport(&mut ctx, codec.as_ref(), transport)?;
    }
    if config.logging.record {
        ctx = ctx.with_recorder(SessionRecorder::start(&config.logging.root, &name, identity.address)?);
    }

    let mut builder = SchedulerBuilder::new(actor, ctx)
        .inbound_capacity(config.scheduler.inbound_capacity)
        .shutdown_grace(config.scheduler.shutdown_grace());

    base::install(&mut builder, BaseSettings::from_config(&config.discovery)?);
    if config.network.enabled && config.discovery.announce {
        dynamic::install(&mut builder, DynamicSettings::from_config(config));
    }
    for listener in listeners {
        builder.listener(listener);
    }

    info!(
        node = %name,
        address = %format!("0x{:04X}", identity.address),
        ?imc_port,
        "Node assembled"
    );
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_selectors() {
        let codec = ImcCodec;
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(static_selectors(&codec, &[]).unwrap(), vec![StaticSelector::All]);
        assert_eq!(static_selectors(&codec, &names(&["*"])).unwrap(), vec![StaticSelector::All]);
        assert_eq!(
            static_selectors(&codec, &names(&["Heartbeat", "350"])).unwrap(),
            vec![StaticSelector::Type(150), StaticSelector::Type(350)]
        );
        assert!(static_selectors(&codec, &names(&["EstimatedState"])).is_err());
    }

    #[tokio::test]
    async fn test_offline_node_has_base_layer_only() {
        let mut config = NodeConfig::default();
        config.network.enabled = false;
        config.identity.name = Some("ccu-offline".to_string());
        config.static_transports.push(StaticTransportConfig {
            uri: "imc+udp://127.0.0.1:6100/".to_string(),
            types: vec!["Announce".to_string()],
        });

        struct Quiet;
        impl Actor for Quiet {}

        let builder = node_builder(Quiet, &config).await.unwrap();
        assert_eq!(builder.context().imc_port(), None);
        assert_eq!(builder.context().registry().self_name(), "ccu-offline");
        assert_eq!(builder.subscriptions().types(), vec![3, 5, 150, 151]);
        let ids: Vec<String> = builder.subscriptions().handler_ids(5).iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["base::entity_list"]);
    }

    #[tokio::test]
    async fn test_static_transport_needs_literal_address() {
        let mut config = NodeConfig::default();
        config.network.enabled = false;
        config.static_transports.push(StaticTransportConfig {
            uri: "imc+udp://mirror.local:6100/".to_string(),
            types: Vec::new(),
        });

        struct Quiet;
        impl Actor for Quiet {}

        let err = node_builder(Quiet, &config).await.unwrap_err();
        assert!(matches!(err, ActorError::Configuration { .. }));
    }
}
