//! Node Registry
//!
//! Tracks peers discovered through Announce/Heartbeat and answers "which peer
//! does this identifier mean" without ever guessing under ambiguity.
//!
//! The registry is plain data: it performs no I/O and reads no clock. Callers
//! pass the current wall-clock time in, and receive [`NodeEvent`]s back for
//! the edges they may want to react to (new node, first heartbeat, removal).

use super::{Node, NodeId, NodeKey, ResolveError};
use codec::{Announce, EntityInfo, EntityList, EntityListOp, Message};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time without announce or heartbeat before a node is pruned
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry edge notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A previously unknown (address, name) pair announced itself
    Connected(NodeKey),
    /// The node's first heartbeat arrived
    FirstHeartbeat(NodeKey),
    /// The node was pruned or removed
    Disconnected(NodeKey),
}

/// Map of known peers keyed by (address, name)
#[derive(Debug)]
pub struct NodeRegistry {
    self_address: u16,
    self_name: String,
    liveness_timeout: f64,
    nodes: BTreeMap<NodeKey, Node>,
}

impl NodeRegistry {
    pub fn new(self_address: u16, self_name: impl Into<String>) -> Self {
        Self {
            self_address,
            self_name: self_name.into(),
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT.as_secs_f64(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout.as_secs_f64();
        self
    }

    pub fn self_address(&self) -> u16 {
        self.self_address
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn set_self_name(&mut self, name: impl Into<String>) {
        self.self_name = name.into();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes ordered by key
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    fn lookup(&self, id: &NodeId) -> Result<NodeKey, ResolveError> {
        if let NodeId::Key(key) = id {
            return if self.nodes.contains_key(key) {
                Ok(key.clone())
            } else {
                Err(ResolveError::not_found(id))
            };
        }

        let mut candidates: Vec<NodeKey> =
            self.nodes.keys().filter(|k| id.matches(k)).cloned().collect();
        match candidates.len() {
            0 => Err(ResolveError::not_found(id)),
            1 => Ok(candidates.remove(0)),
            _ => Err(ResolveError::Ambiguous {
                query: id.to_string(),
                candidates,
            }),
        }
    }

    /// Resolve an identifier to the unique matching node
    pub fn resolve(&self, id: impl Into<NodeId>) -> Result<&Node, ResolveError> {
        let key = self.lookup(&id.into())?;
        self.nodes
            .get(&key)
            .ok_or_else(|| ResolveError::not_found(&key))
    }

    pub fn resolve_mut(&mut self, id: impl Into<NodeId>) -> Result<&mut Node, ResolveError> {
        let key = self.lookup(&id.into())?;
        self.nodes
            .get_mut(&key)
            .ok_or_else(|| ResolveError::not_found(&key))
    }

    /// Insert or replace a node, returning the previous entry
    pub fn add_node(&mut self, node: Node) -> Option<Node> {
        debug!(node = %node.key, fixed = node.is_fixed, "Adding node");
        self.nodes.insert(node.key.clone(), node)
    }

    /// Remove the node named by `id`
    pub fn remove_node(&mut self, id: impl Into<NodeId>) -> Result<Node, ResolveError> {
        let key = self.lookup(&id.into())?;
        self.nodes
            .remove(&key)
            .ok_or_else(|| ResolveError::not_found(&key))
    }

    /// Apply an Announce received at wall-clock time `now`
    pub fn on_announce(&mut self, msg: &Message, now: f64) -> Option<NodeEvent> {
        let announce = msg.get::<Announce>()?;

        if msg.src() == self.self_address {
            if announce.sys_name != self.self_name {
                warn!(
                    address = msg.src(),
                    name = %announce.sys_name,
                    "Another system is announcing our IMC address"
                );
            }
            return None;
        }

        let key = NodeKey::new(msg.src(), announce.sys_name.as_str());
        if let Some(node) = self.nodes.get_mut(&key) {
            node.last_announce = Some(now);
            node.update_services(&announce.services);
            return None;
        }

        let collisions: Vec<&NodeKey> = self
            .nodes
            .keys()
            .filter(|k| k.address == key.address || k.name == key.name)
            .collect();
        if !collisions.is_empty() {
            warn!(
                node = %key,
                existing = ?collisions,
                "Multiple nodes are announcing the same IMC address or name"
            );
        }

        let mut node = Node::new(key.clone());
        node.last_announce = Some(now);
        node.update_services(&announce.services);
        info!(node = %key, services = %announce.services, "Node connected");
        self.nodes.insert(key.clone(), node);
        Some(NodeEvent::Connected(key))
    }

    /// Apply a Heartbeat received at wall-clock time `now`
    pub fn on_heartbeat(&mut self, msg: &Message, now: f64) -> Option<NodeEvent> {
        let node = match self.resolve_mut(msg) {
            Ok(node) => node,
            Err(error) => {
                debug!(src = msg.src(), %error, "Heartbeat from unresolved node");
                return None;
            }
        };

        let first = node.last_heartbeat.is_none();
        node.last_heartbeat = Some(now);
        first.then(|| NodeEvent::FirstHeartbeat(node.key.clone()))
    }

    /// Merge an EntityList REPORT; queries are ignored here
    pub fn on_entity_list(&mut self, msg: &Message) {
        let Some(list) = msg.get::<EntityList>() else {
            return;
        };
        if list.op != EntityListOp::Report {
            return;
        }

        match self.resolve_mut(msg) {
            Ok(node) => node.update_entity_list(list.entries()),
            Err(error) => debug!(src = msg.src(), %error, "Unable to resolve node for EntityList"),
        }
    }

    /// Merge a single EntityInfo
    pub fn on_entity_info(&mut self, msg: &Message) {
        let Some(info) = msg.get::<EntityInfo>() else {
            return;
        };

        match self.resolve_mut(msg) {
            Ok(node) => node.update_entity(info.id, info.label.as_str()),
            Err(error) => debug!(src = msg.src(), %error, "Unable to resolve node for EntityInfo"),
        }
    }

    /// Remove every non-fixed node whose announce and heartbeat are both stale
    pub fn prune(&mut self, now: f64) -> Vec<NodeEvent> {
        let timeout = self.liveness_timeout;
        let stale: Vec<NodeKey> = self
            .nodes
            .values()
            .filter(|n| !n.is_fixed && n.is_stale(now, timeout))
            .map(|n| n.key.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| {
                self.nodes.remove(&key)?;
                info!(node = %key, "Connection to node timed out");
                Some(NodeEvent::Disconnected(key))
            })
            .collect()
    }

    /// Nodes that have not reported any entities yet
    pub fn nodes_without_entities(&self) -> Vec<NodeKey> {
        self.nodes
            .values()
            .filter(|n| n.entities.is_empty())
            .map(|n| n.key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{Heartbeat, Payload};

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

    fn registry() -> NodeRegistry {
        NodeRegistry::new(0x3334, "ccu-rust")
    }

    #[test]
    fn test_own_announce_ignored() {
        let mut reg = registry();
        assert_eq!(reg.on_announce(&announce(0x3334, "ccu-rust", ""), 0.0), None);
        assert_eq!(reg.on_announce(&announce(0x3334, "impostor", ""), 0.0), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_new_node_connects_once() {
        let mut reg = registry();
        let msg = announce(0x16, "lauv-xplore-1", "imc+udp://10.0.0.5:6002/");
        assert_eq!(
            reg.on_announce(&msg, 1.0),
            Some(NodeEvent::Connected(NodeKey::new(0x16, "lauv-xplore-1")))
        );
        assert_eq!(reg.on_announce(&msg, 2.0), None);
        assert_eq!(reg.resolve(0x16).unwrap().last_announce, Some(2.0));
    }

    #[test]
    fn test_first_heartbeat_edge() {
        let mut reg = registry();
        reg.on_announce(&announce(0x16, "lauv-xplore-1", ""), 0.0);

        let hb = from(0x16, Heartbeat);
        assert!(matches!(reg.on_heartbeat(&hb, 1.0), Some(NodeEvent::FirstHeartbeat(_))));
        assert_eq!(reg.on_heartbeat(&hb, 2.0), None);
        assert_eq!(reg.on_heartbeat(&from(0x99, Heartbeat), 2.0), None);
    }

    #[test]
    fn test_entity_list_and_info() {
        let mut reg = registry();
        reg.on_announce(&announce(0x16, "lauv-xplore-1", ""), 0.0);

        reg.on_entity_list(&from(0x16, EntityList::query()));
        assert!(reg.resolve(0x16).unwrap().entities.is_empty());

        reg.on_entity_list(&from(0x16, EntityList::report([("Daemon", 0), ("GPS", 12)])));
        reg.on_entity_info(&from(
            0x16,
            EntityInfo {
                id: 13,
                label: "Camera".to_string(),
                ..EntityInfo::default()
            },
        ));

        let node = reg.resolve("lauv-xplore-1").unwrap();
        assert_eq!(node.entity_id("GPS"), Some(12));
        assert_eq!(node.entity_id("Camera"), Some(13));
        assert!(reg.nodes_without_entities().is_empty());
    }

    #[test]
    fn test_remove_node() {
        let mut reg = registry();
        reg.on_announce(&announce(0x16, "lauv-xplore-1", ""), 0.0);
        assert!(matches!(reg.remove_node(0x17), Err(ResolveError::NotFound { .. })));
        assert_eq!(reg.remove_node("lauv-xplore-1").unwrap().address(), 0x16);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_prune_keeps_alive_and_fixed() {
        let mut reg = registry().with_liveness_timeout(Duration::from_secs(60));
        reg.on_announce(&announce(0x16, "stale", ""), 0.0);
        reg.on_announce(&announce(0x17, "heartbeating", ""), 0.0);
        reg.on_heartbeat(&from(0x17, Heartbeat), 50.0);
        reg.add_node(Node::fixed(NodeKey::new(0x18, "fixed"), []));

        let events = reg.prune(100.0);
        assert_eq!(events, vec![NodeEvent::Disconnected(NodeKey::new(0x16, "stale"))]);
        assert_eq!(reg.len(), 2);

        let events = reg.prune(200.0);
        assert_eq!(events.len(), 1);
        assert_eq!(reg.keys().collect::<Vec<_>>(), vec![&NodeKey::new(0x18, "fixed")]);
    }
}
