//! Node bookkeeping layer
//!
//! Feeds discovery traffic into the node registry and prunes peers that went
//! silent. Installed at [`BASE_DEPTH`] so every other layer observes a
//! registry that already reflects the message being dispatched.

use crate::builder::{SchedulerBuilder, BASE_DEPTH};
use crate::error::{ActorError, Result};
use crate::system::Actor;
use codec::{Announce, EntityInfo, EntityList, Heartbeat};
use network::{Node, NodeKey, ServiceEndpoint};
use node_config::DiscoveryConfig;
use std::time::Duration;
use tracing::info;

pub const LAYER: &str = "base";

#[derive(Debug, Clone)]
pub struct BaseSettings {
    pub prune_interval: Duration,
    /// Log the node table every `node_list_interval`
    pub verbose_nodes: bool,
    pub node_list_interval: Duration,
    /// Manually provisioned peers, never pruned
    pub fixed_nodes: Vec<Node>,
}

impl BaseSettings {
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self> {
        let fixed_nodes = config
            .fixed_nodes
            .iter()
            .map(|fixed| {
                let endpoints = fixed
                    .services
                    .iter()
                    .map(|uri| {
                        uri.parse::<ServiceEndpoint>().map_err(|e| {
                            ActorError::configuration(e.to_string(), Some("discovery.fixed_nodes.services"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::fixed(NodeKey::new(fixed.address, fixed.name.as_str()), endpoints))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prune_interval: config.prune_interval(),
            verbose_nodes: config.verbose_nodes,
            node_list_interval: config.node_list_interval(),
            fixed_nodes,
        })
    }
}

/// Register the bookkeeping handlers and add the fixed nodes
pub fn install<A: Actor>(builder: &mut SchedulerBuilder<A>, settings: BaseSettings) {
    for node in settings.fixed_nodes {
        builder.context_mut().add_node(node);
    }

    let mut layer = builder.layer(LAYER, BASE_DEPTH);
    layer
        .subscribe::<Announce, _>("announce", |_, ctx, msg| {
            let now = ctx.now();
            if let Some(event) = ctx.registry_mut().on_announce(msg, now) {
                ctx.notify(event);
            }
            Ok(())
        })
        .subscribe::<Heartbeat, _>("heartbeat", |_, ctx, msg| {
            let now = ctx.now();
            if let Some(event) = ctx.registry_mut().on_heartbeat(msg, now) {
                ctx.notify(event);
            }
            Ok(())
        })
        .subscribe::<EntityList, _>("entity_list", |_, ctx, msg| {
            ctx.registry_mut().on_entity_list(msg);
            Ok(())
        })
        .subscribe::<EntityInfo, _>("entity_info", |_, ctx, msg| {
            ctx.registry_mut().on_entity_info(msg);
            Ok(())
        })
        .periodic("prune", settings.prune_interval, |_, ctx| {
            let now = ctx.now();
            for event in ctx.registry_mut().prune(now) {
                ctx.notify(event);
            }
            Ok(())
        });

    if settings.verbose_nodes {
        layer.periodic("list_nodes", settings.node_list_interval, |_, ctx| {
            let now = ctx.now();
            info!(count = ctx.registry().len(), "Connected nodes");
            for node in ctx.registry().nodes() {
                info!(
                    node = %node.key,
                    fixed = node.is_fixed,
                    announce_age = node.last_announce.map(|t| now - t),
                    heartbeat_age = node.last_heartbeat.map(|t| now - t),
                    entities = node.entities.len(),
                    "Node"
                );
            }
            Ok(())
        });
    }
}
