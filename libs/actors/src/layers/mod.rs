//! Built-in layers
//!
//! - [`base`]: registry bookkeeping (depth 0)
//! - [`dynamic`]: announce, heartbeat and entity exchange (depth 1)

pub mod base;
pub mod dynamic;

pub use base::BaseSettings;
pub use dynamic::DynamicSettings;
