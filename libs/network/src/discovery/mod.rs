//! Peer Discovery and Address Resolution
//!
//! ## Purpose
//!
//! Keeps the set of peers learned from the discovery protocol and resolves the
//! identifiers handlers use (address, name, full key, or a received message)
//! to a single [`Node`].
//!
//! ## Discovery Protocol
//!
//! ```text
//!  peer ──Announce (multicast, ~10 s)──▶ on_announce   → Connected
//!  peer ──Heartbeat (unicast, ~1 s)────▶ on_heartbeat  → FirstHeartbeat (once)
//!  peer ──EntityList REPORT / EntityInfo▶ entities map
//!  prune (~65 s): announce AND heartbeat older than 60 s → Disconnected
//! ```
//!
//! ## Resolution Rules
//!
//! - A full [`NodeKey`] matches at most one node.
//! - An address or a name alone may match several nodes while peers collide;
//!   the lookup then fails with [`ResolveError::Ambiguous`] carrying every
//!   candidate. A candidate is never picked silently.
//! - A message resolves through its source address.
//!
//! Fixed nodes (manually provisioned) are never pruned.

pub mod error;
pub mod nodes;
pub mod registry;
pub mod resolution;
pub mod service;

pub use error::ResolveError;
pub use nodes::{Node, NodeKey};
pub use registry::{NodeEvent, NodeRegistry, DEFAULT_LIVENESS_TIMEOUT};
pub use resolution::NodeId;
pub use service::{format_services, parse_services, ServiceEndpoint, ServiceParseError, IMC_UDP_SCHEME};
