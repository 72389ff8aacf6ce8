//! Actor Registration
//!
//! Handlers, periodic tasks and deferred tasks are declared once, layer by
//! layer, before the scheduler is built:
//!
//! ```rust,no_run
//! use messaging_actors::{Actor, Context, SchedulerBuilder, USER_DEPTH};
//! use codec::Heartbeat;
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct Watchdog {
//!     beats: u64,
//! }
//!
//! impl Actor for Watchdog {}
//!
//! fn register(builder: &mut SchedulerBuilder<Watchdog>) {
//!     builder
//!         .layer("watchdog", USER_DEPTH)
//!         .subscribe::<Heartbeat, _>("count", |actor, _ctx, _msg| {
//!             actor.beats += 1;
//!             Ok(())
//!         })
//!         .periodic("report", Duration::from_secs(5), |actor, _ctx| {
//!             tracing::info!(beats = actor.beats, "Heartbeats so far");
//!             Ok(())
//!         });
//! }
//! ```
//!
//! A layer's depth decides where its handlers run relative to other layers
//! subscribed to the same type: shallower first.

use crate::context::Context;
use crate::messages::HandlerId;
use crate::registry::SubscriptionTable;
use crate::system::{Actor, Schedule, Scheduler, Timer};
use crate::transport::Listener;
use codec::{Message, PayloadKind};
use std::time::Duration;

/// Depth of the node bookkeeping layer
pub const BASE_DEPTH: u8 = 0;
/// Depth of the announcing layer
pub const DYNAMIC_DEPTH: u8 = 1;
/// Default depth for application layers
pub const USER_DEPTH: u8 = 2;

/// Default bound of the inbound queue
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;
/// Default time listeners get to unwind
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct SchedulerBuilder<A: Actor> {
    actor: A,
    ctx: Context,
    table: SubscriptionTable<A>,
    timers: Vec<Timer<A>>,
    listeners: Vec<Listener>,
    capacity: usize,
    grace: Duration,
}

impl<A: Actor> std::fmt::Debug for SchedulerBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("subscriptions", &self.table)
            .field("timers", &self.timers.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl<A: Actor> SchedulerBuilder<A> {
    pub fn new(actor: A, ctx: Context) -> Self {
        Self {
            actor,
            ctx,
            table: SubscriptionTable::new(),
            timers: Vec::new(),
            listeners: Vec::new(),
            capacity: DEFAULT_INBOUND_CAPACITY,
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start declaring the handlers of one layer
    pub fn layer(&mut self, name: impl Into<String>, depth: u8) -> Layer<'_, A> {
        Layer {
            builder: self,
            name: name.into(),
            depth,
        }
    }

    /// Add a message source, spawned when the scheduler starts
    pub fn listener(&mut self, listener: Listener) -> &mut Self {
        self.listeners.push(listener);
        self
    }

    pub fn actor_mut(&mut self) -> &mut A {
        &mut self.actor
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn subscriptions(&self) -> &SubscriptionTable<A> {
        &self.table
    }

    pub fn build(self) -> Scheduler<A> {
        Scheduler::new(
            self.actor,
            self.ctx,
            self.table,
            self.timers,
            self.listeners,
            self.capacity,
            self.grace,
        )
    }
}

/// Registration scope for one layer
pub struct Layer<'a, A: Actor> {
    builder: &'a mut SchedulerBuilder<A>,
    name: String,
    depth: u8,
}

impl<A: Actor> Layer<'_, A> {
    fn id(&self, name: &str) -> HandlerId {
        HandlerId::new(self.name.as_str(), name)
    }

    /// Handle every message of kind `K`
    pub fn subscribe<K, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        K: PayloadKind,
        F: FnMut(&mut A, &mut Context, &Message) -> anyhow::Result<()> + 'static,
    {
        let id = self.id(name);
        self.builder
            .table
            .subscribe(K::TYPE_ID, id, self.depth, Box::new(handler));
        self
    }

    /// Handle every message, after the type-specific handlers
    pub fn subscribe_all<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: FnMut(&mut A, &mut Context, &Message) -> anyhow::Result<()> + 'static,
    {
        let id = self.id(name);
        self.builder.table.subscribe_all(id, self.depth, Box::new(handler));
        self
    }

    /// Run `task` when the scheduler starts and every `interval` after
    pub fn periodic<F>(&mut self, name: &str, interval: Duration, task: F) -> &mut Self
    where
        F: FnMut(&mut A, &mut Context) -> anyhow::Result<()> + 'static,
    {
        let id = self.id(name);
        self.builder
            .timers
            .push(Timer::new(id, Schedule::Periodic(interval), Box::new(task)));
        self
    }

    /// Run `task` once, `delay` after the scheduler starts
    pub fn deferred<F>(&mut self, name: &str, delay: Duration, task: F) -> &mut Self
    where
        F: FnOnce(&mut A, &mut Context) -> anyhow::Result<()> + 'static,
    {
        let id = self.id(name);
        let mut task = Some(task);
        let once = move |actor: &mut A, ctx: &mut Context| match task.take() {
            Some(task) => task(actor, ctx),
            None => Ok(()),
        };
        self.builder
            .timers
            .push(Timer::new(id, Schedule::Deferred(delay), Box::new(once)));
        self
    }
}
