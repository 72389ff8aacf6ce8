//! Node configuration defaults
//!
//! Values follow the conventions of existing IMC deployments so that a node
//! started without a config file interoperates with them.

/// Identity defaults
pub mod identity {
    /// IMC address used by console nodes
    pub const ADDRESS: u16 = 0x3334;

    /// Prefix of the generated system name
    pub const NAME_PREFIX: &str = "ccu-rust";
}

/// Socket defaults
pub mod network {
    use std::net::Ipv4Addr;

    pub const BIND_IP: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

    /// Unicast ports scanned when no static port is set
    pub const PORT_RANGE: (u16, u16) = (6001, 6029);

    pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 75, 69);

    /// Discovery ports (announces are sent to all of them)
    pub const MULTICAST_PORTS: (u16, u16) = (30100, 30104);
}

/// Discovery cadence (seconds)
pub mod discovery {
    pub const LIVENESS_TIMEOUT_SECS: f64 = 60.0;
    pub const PRUNE_INTERVAL_SECS: f64 = 65.0;
    pub const ANNOUNCE_INTERVAL_SECS: f64 = 10.0;
    pub const HEARTBEAT_INTERVAL_SECS: f64 = 1.0;
    pub const ENTITY_QUERY_INTERVAL_SECS: f64 = 30.0;
    pub const NODE_LIST_INTERVAL_SECS: f64 = 10.0;
}

/// Scheduler defaults
pub mod scheduler {
    /// Time listeners get to unwind after a stop request (seconds)
    pub const SHUTDOWN_GRACE_SECS: f64 = 2.0;

    /// Bound of the inbound message queue
    pub const INBOUND_CAPACITY: usize = 1024;
}
