//! Static destinations keyed by message type
//!
//! Used for always-on relays (log mirrors, operator consoles) that should
//! receive traffic regardless of discovery.

use crate::discovery::ServiceEndpoint;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Which messages a static destination receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticSelector {
    Type(u16),
    All,
}

#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    by_type: HashMap<u16, Vec<SocketAddr>>,
    all: Vec<SocketAddr>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` for the selected messages
    ///
    /// Returns `false` when the endpoint has no literal IP and port.
    pub fn add(&mut self, endpoint: &ServiceEndpoint, selector: StaticSelector) -> bool {
        let Some(addr) = endpoint.socket_addr() else {
            return false;
        };
        let list = match selector {
            StaticSelector::Type(type_id) => self.by_type.entry(type_id).or_default(),
            StaticSelector::All => &mut self.all,
        };
        if !list.contains(&addr) {
            list.push(addr);
        }
        true
    }

    /// Destinations for a message type: type-specific first, then catch-all
    pub fn destinations(&self, type_id: u16) -> impl Iterator<Item = SocketAddr> + '_ {
        self.by_type
            .get(&type_id)
            .into_iter()
            .flatten()
            .chain(self.all.iter())
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.by_type.values().all(Vec::is_empty)
    }
}
