//! # Node Configuration
//!
//! Layered settings for an IMC node: compiled-in defaults, an optional TOML
//! file, then `IMC__`-prefixed environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use node_config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Some(Path::new("node.toml")))?;
//! println!("{:#06x} {}", config.identity.address, config.identity.system_name());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod defaults;
pub mod node_config;

pub use node_config::{
    load_config, DiscoveryConfig, FixedNodeConfig, IdentityConfig, LoggingConfig, NetworkConfig,
    NodeConfig, PortRange, SchedulerConfig, StaticTransportConfig, ENV_PREFIX,
};
