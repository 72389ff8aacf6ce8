//! IMC Actor Runtime
//!
//! Cooperative, single-threaded event scheduler for IMC nodes. An actor
//! declares message handlers, periodic tasks and deferred tasks in layers;
//! the scheduler drives them all from one event loop so handlers never race
//! each other or the node registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Delivery    ┌──────────────────────────────┐
//! │ UDP listener │──────────────▶│          Scheduler           │
//! ├──────────────┤   (bounded)   │                              │
//! │ UDP listener │──────────────▶│  base layer     (depth 0)    │
//! ├──────────────┤               │  dynamic layer  (depth 1)    │
//! │ LSF playback │──────────────▶│  user layers    (depth 2+)   │
//! └──────────────┘               │                              │
//!                                │  periodic / deferred timers  │
//!                                └──────────────┬───────────────┘
//!                                               │ Context::send
//!                                               ▼
//!                                 OutboundRouter ─▶ UDP / static
//! ```
//!
//! - Listeners run as tokio tasks and only decode; all state lives on the
//!   scheduler side
//! - Handlers for one message run in layer depth order, then registration
//!   order; wildcard handlers see every message after the typed ones
//! - A handler that fails or panics is reported through
//!   [`Actor::on_fault`] and never stops the loop
//! - A periodic task that fails is retired
//!
//! Use [`node_builder`] to assemble a networked node from a
//! [`node_config::NodeConfig`], or [`SchedulerBuilder`] directly for tests
//! and offline tools.

pub mod builder;
pub mod context;
pub mod error;
pub mod layers;
pub mod messages;
pub mod node;
pub mod playback;
pub mod recording;
pub mod registry;
pub mod system;
pub mod transport;

pub use builder::{Layer, SchedulerBuilder, BASE_DEPTH, DYNAMIC_DEPTH, USER_DEPTH};
pub use context::{Context, StopHandle};
pub use error::{ActorError, Result};
pub use layers::{BaseSettings, DynamicSettings};
pub use messages::{Fault, FaultKind, HandlerId, Inbound, Origin};
pub use node::{node_builder, static_selectors};
pub use playback::{Playback, PlaybackOptions};
pub use recording::{session_path, SessionRecorder};
pub use registry::{HandlerFn, SubscriptionTable, TaskFn};
pub use system::{next_deadline, Actor, Injector, Scheduler, SchedulerState};
pub use transport::{Feed, Listener};
