//! Node Configuration Module
//!
//! Loads a [`NodeConfig`] from built-in defaults, an optional TOML file and
//! `IMC__`-prefixed environment variables, in that order of precedence
//! (environment wins). Nested keys use `__` as separator, e.g.
//! `IMC__DISCOVERY__ANNOUNCE_INTERVAL_SECS=5`.

use crate::defaults;
use anyhow::{bail, Context, Result};
use codec::SystemType;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "IMC";

/// Main node configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    /// Always-on destinations (log mirrors, relays)
    pub static_transports: Vec<StaticTransportConfig>,
}

/// Who this node is
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub address: u16,
    /// System name; generated from the host when absent
    pub name: Option<String>,
    pub system_type: SystemType,
    /// Source entity stamped on outgoing messages
    pub entity: u8,
    /// Local entities reported on EntityList queries (label → id)
    pub entities: BTreeMap<String, u8>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            address: defaults::identity::ADDRESS,
            name: None,
            system_type: SystemType::Ccu,
            entity: 0,
            entities: BTreeMap::from([
                ("Daemon".to_string(), 0),
                ("Service Announcer".to_string(), 1),
            ]),
        }
    }
}

impl IdentityConfig {
    /// Configured name, or `<prefix>-<host>` when none is set
    pub fn system_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        format!("{}-{}", defaults::identity::NAME_PREFIX, host.to_lowercase())
    }
}

/// Inclusive port range
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new((start, end): (u16, u16)) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn to_range(self) -> std::ops::RangeInclusive<u16> {
        self.start..=self.end
    }
}

/// Socket settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bind the UDP sockets at all (off for offline playback)
    pub enabled: bool,
    pub bind_ip: Ipv4Addr,
    /// Bind the IMC socket to exactly this port
    pub static_port: Option<u16>,
    pub port_range: PortRange,
    pub multicast_group: Ipv4Addr,
    pub multicast_ports: PortRange,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_ip: defaults::network::BIND_IP,
            static_port: None,
            port_range: PortRange::new(defaults::network::PORT_RANGE),
            multicast_group: defaults::network::MULTICAST_GROUP,
            multicast_ports: PortRange::new(defaults::network::MULTICAST_PORTS),
        }
    }
}

/// Manually provisioned peer, never pruned
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FixedNodeConfig {
    pub address: u16,
    pub name: String,
    /// Service URIs, e.g. `imc+udp://10.0.10.20:6002/`
    pub services: Vec<String>,
}

/// Discovery and liveness cadence
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Multicast our own Announce and run the heartbeat/entity tasks
    pub announce: bool,
    pub liveness_timeout_secs: f64,
    pub prune_interval_secs: f64,
    pub announce_interval_secs: f64,
    pub heartbeat_interval_secs: f64,
    pub entity_query_interval_secs: f64,
    /// Log the connected nodes periodically
    pub verbose_nodes: bool,
    pub node_list_interval_secs: f64,
    /// Peers kept alive with heartbeats: a name, or an address (`0x0016` / `22`)
    pub heartbeat_peers: Vec<String>,
    pub fixed_nodes: Vec<FixedNodeConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        use defaults::discovery::*;
        Self {
            announce: true,
            liveness_timeout_secs: LIVENESS_TIMEOUT_SECS,
            prune_interval_secs: PRUNE_INTERVAL_SECS,
            announce_interval_secs: ANNOUNCE_INTERVAL_SECS,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            entity_query_interval_secs: ENTITY_QUERY_INTERVAL_SECS,
            verbose_nodes: false,
            node_list_interval_secs: NODE_LIST_INTERVAL_SECS,
            heartbeat_peers: Vec::new(),
            fixed_nodes: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.liveness_timeout_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs_f64(self.prune_interval_secs)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs_f64(self.announce_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_secs)
    }

    pub fn entity_query_interval(&self) -> Duration {
        Duration::from_secs_f64(self.entity_query_interval_secs)
    }

    pub fn node_list_interval(&self) -> Duration {
        Duration::from_secs_f64(self.node_list_interval_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub shutdown_grace_secs: f64,
    pub inbound_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: defaults::scheduler::SHUTDOWN_GRACE_SECS,
            inbound_capacity: defaults::scheduler::INBOUND_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_grace_secs)
    }
}

/// Console log level and LSF session recording
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Record inbound and outbound traffic to an LSF file
    pub record: bool,
    /// Root of `<root>/<system>/<date>/<time>/Data.lsf`
    pub root: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            record: false,
            root: std::env::temp_dir().join("imc"),
        }
    }
}

/// Static destination for a set of message types
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StaticTransportConfig {
    /// `imc+udp://host:port/`
    pub uri: String,
    /// Message type names or ids; empty means every type
    #[serde(default)]
    pub types: Vec<String>,
}

impl NodeConfig {
    /// Load defaults, then `path` (if given), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            info!("Loading node config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let node: NodeConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        debug!(address = node.identity.address, "Node config loaded");
        Ok(node)
    }

    /// Reject settings the runtime cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.network.port_range.is_empty() {
            bail!(
                "network.port_range is empty ({}..={})",
                self.network.port_range.start,
                self.network.port_range.end
            );
        }
        if self.network.multicast_ports.is_empty() {
            bail!(
                "network.multicast_ports is empty ({}..={})",
                self.network.multicast_ports.start,
                self.network.multicast_ports.end
            );
        }
        if !self.network.multicast_group.is_multicast() {
            bail!("network.multicast_group {} is not a multicast address", self.network.multicast_group);
        }

        let d = &self.discovery;
        for (name, value) in [
            ("liveness_timeout_secs", d.liveness_timeout_secs),
            ("prune_interval_secs", d.prune_interval_secs),
            ("announce_interval_secs", d.announce_interval_secs),
            ("heartbeat_interval_secs", d.heartbeat_interval_secs),
            ("entity_query_interval_secs", d.entity_query_interval_secs),
            ("node_list_interval_secs", d.node_list_interval_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("discovery.{} must be a positive number of seconds, got {}", name, value);
            }
        }

        let grace = self.scheduler.shutdown_grace_secs;
        if !(grace.is_finite() && grace >= 0.0) {
            bail!("scheduler.shutdown_grace_secs must be >= 0, got {}", grace);
        }
        if self.scheduler.inbound_capacity == 0 {
            bail!("scheduler.inbound_capacity must be at least 1");
        }

        if let Some(name) = &self.identity.name {
            if name.is_empty() {
                bail!("identity.name must not be empty");
            }
        }
        Ok(())
    }
}

/// Load and validate in one step
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let config = NodeConfig::load(path)?;
    config.validate()?;
    Ok(config)
}
