//! Peer nodes known to the registry
//!
//! A node is identified by its (address, name) pair. Either half may collide
//! with another peer for a while (misconfiguration, a restarted vehicle with a
//! new name) so neither half alone is treated as an identity.

use super::service::{parse_services, ServiceEndpoint, IMC_UDP_SCHEME};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Unique identity of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub address: u16,
    pub name: String,
}

impl NodeKey {
    pub fn new(address: u16, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.name, self.address)
    }
}

/// A remote peer with its advertised services, entities and liveness
#[derive(Debug, Clone)]
pub struct Node {
    pub key: NodeKey,
    /// Wall-clock time (s) of the last Announce
    pub last_announce: Option<f64>,
    /// Wall-clock time (s) of the last Heartbeat
    pub last_heartbeat: Option<f64>,
    /// Manually provisioned, never pruned
    pub is_fixed: bool,
    pub services: HashMap<String, Vec<ServiceEndpoint>>,
    /// Entity label → id
    pub entities: HashMap<String, u8>,
    raw_services: String,
}

impl Node {
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            last_announce: None,
            last_heartbeat: None,
            is_fixed: false,
            services: HashMap::new(),
            entities: HashMap::new(),
            raw_services: String::new(),
        }
    }

    /// A manually provisioned node reachable at the given endpoints
    pub fn fixed(key: NodeKey, endpoints: impl IntoIterator<Item = ServiceEndpoint>) -> Self {
        let mut node = Self::new(key);
        node.is_fixed = true;
        for endpoint in endpoints {
            node.services
                .entry(endpoint.scheme.clone())
                .or_default()
                .push(endpoint);
        }
        node
    }

    pub fn address(&self) -> u16 {
        self.key.address
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Replace the service map from an announce service string
    ///
    /// Returns `false` without re-parsing when the string is unchanged.
    pub fn update_services(&mut self, services: &str) -> bool {
        if services == self.raw_services && !self.services.is_empty() {
            return false;
        }

        let (parsed, errors) = parse_services(services);
        for error in errors {
            warn!(node = %self.key, %error, "Ignoring malformed service entry");
        }
        self.services = parsed;
        self.raw_services = services.to_string();
        true
    }

    pub fn raw_services(&self) -> &str {
        &self.raw_services
    }

    /// Endpoints advertised for a scheme, in announce order
    pub fn endpoints(&self, scheme: &str) -> &[ServiceEndpoint] {
        self.services.get(scheme).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True while the node has at least one IMC-over-UDP endpoint
    pub fn is_reachable(&self) -> bool {
        !self.endpoints(IMC_UDP_SCHEME).is_empty()
    }

    /// Stale when neither announce nor heartbeat is younger than `timeout`
    pub fn is_stale(&self, now: f64, timeout: f64) -> bool {
        let fresh = |t: Option<f64>| t.map_or(false, |t| now - t < timeout);
        !(fresh(self.last_announce) || fresh(self.last_heartbeat))
    }

    /// Replace the entity map from a full report
    pub fn update_entity_list(&mut self, entries: impl IntoIterator<Item = (String, u8)>) {
        self.entities = entries.into_iter().collect();
    }

    /// Record a single entity, dropping any stale label that pointed at the same id
    pub fn update_entity(&mut self, id: u8, label: impl Into<String>) {
        let label = label.into();
        self.entities.retain(|l, i| *i != id || *l == label);
        self.entities.insert(label, id);
    }

    pub fn entity_id(&self, label: &str) -> Option<u8> {
        self.entities.get(label).copied()
    }

    pub fn entity_label(&self, id: u8) -> Option<&str> {
        self.entities
            .iter()
            .find(|(_, i)| **i == id)
            .map(|(l, _)| l.as_str())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new(NodeKey::new(0x16, "lauv-xplore-1"))
    }

    #[test]
    fn test_services_reparsed_only_on_change() {
        let mut node = node();
        assert!(node.update_services("imc+udp://10.0.0.5:6002/"));
        assert!(!node.update_services("imc+udp://10.0.0.5:6002/"));
        assert!(node.is_reachable());
        assert!(node.update_services("http://10.0.0.5:8080/dune"));
        assert!(!node.is_reachable());
    }

    #[test]
    fn test_staleness_needs_both_signals_old() {
        let mut node = node();
        assert!(node.is_stale(100.0, 60.0));

        node.last_announce = Some(10.0);
        node.last_heartbeat = Some(90.0);
        assert!(!node.is_stale(100.0, 60.0));

        node.last_heartbeat = Some(20.0);
        assert!(node.is_stale(100.0, 60.0));
    }

    #[test]
    fn test_entity_updates() {
        let mut node = node();
        node.update_entity_list(vec![("Daemon".to_string(), 0), ("GPS".to_string(), 12)]);
        assert_eq!(node.entity_id("GPS"), Some(12));

        node.update_entity(12, "GPS Receiver");
        assert_eq!(node.entity_id("GPS"), None);
        assert_eq!(node.entity_label(12), Some("GPS Receiver"));
        assert_eq!(node.entities.len(), 2);
    }

    #[test]
    fn test_fixed_node() {
        let endpoint: ServiceEndpoint = "imc+udp://10.0.0.9:6001/".parse().unwrap();
        let node = Node::fixed(NodeKey::new(0x20, "relay"), [endpoint]);
        assert!(node.is_fixed);
        assert!(node.is_reachable());
    }
}
