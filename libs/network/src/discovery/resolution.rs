//! Node identifiers accepted by lookups
//!
//! Callers may name a peer by address, by name, by the full key, or by a
//! message it sent. Only the full key is guaranteed unique.

use super::NodeKey;
use codec::Message;
use std::fmt;

/// Anything that can name a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeId {
    Address(u16),
    Name(String),
    Key(NodeKey),
}

impl NodeId {
    /// True when the identifier can match more than one node
    pub fn is_partial(&self) -> bool {
        !matches!(self, NodeId::Key(_))
    }

    pub fn matches(&self, key: &NodeKey) -> bool {
        match self {
            NodeId::Address(address) => key.address == *address,
            NodeId::Name(name) => key.name == *name,
            NodeId::Key(k) => k == key,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Address(address) => write!(f, "0x{:04X}", address),
            NodeId::Name(name) => f.write_str(name),
            NodeId::Key(key) => write!(f, "{}", key),
        }
    }
}

impl From<u16> for NodeId {
    fn from(address: u16) -> Self {
        NodeId::Address(address)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        NodeId::Name(name.to_string())
    }
}

impl From<String> for NodeId {
    fn from(name: String) -> Self {
        NodeId::Name(name)
    }
}

impl From<NodeKey> for NodeId {
    fn from(key: NodeKey) -> Self {
        NodeId::Key(key)
    }
}

impl From<&NodeKey> for NodeId {
    fn from(key: &NodeKey) -> Self {
        NodeId::Key(key.clone())
    }
}

impl From<(u16, &str)> for NodeId {
    fn from((address, name): (u16, &str)) -> Self {
        NodeId::Key(NodeKey::new(address, name))
    }
}

/// A message names its sender by source address
impl From<&Message> for NodeId {
    fn from(msg: &Message) -> Self {
        NodeId::Address(msg.src())
    }
}
