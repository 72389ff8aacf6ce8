//! Event Scheduler
//!
//! One logical thread of control that delivers inbound messages to their
//! subscribed handlers, runs periodic and deferred tasks, and shuts down
//! cooperatively.
//!
//! ## Loop
//!
//! ```text
//!            ┌──────────── run due timers (registration order on ties)
//!            ▼
//!   select! (biased)
//!     ├─ stop signal ─────────▶ shutdown
//!     ├─ inbound channel ─────▶ dispatch to handlers, then wildcards
//!     └─ next timer deadline ─▶ back to top
//! ```
//!
//! Every callback is run inline and individually guarded: a returned error or
//! a panic becomes a [`Fault`] for [`Actor::on_fault`] and never stops the
//! loop. Registry edges queued in the [`Context`] while a callback ran are
//! delivered to the actor's lifecycle hooks right after it returns.
//!
//! ## States
//!
//! `Created → Running → StopRequested → Stopped`; nothing leaves `Stopped`.

use crate::context::{stopped, Context, StopHandle};
use crate::error::{ActorError, Result};
use crate::messages::{Fault, FaultKind, HandlerId, Inbound};
use crate::registry::{SubscriptionTable, TaskFn};
use crate::transport::{Delivery, Feed, Listener};
use network::{NodeEvent, NodeKey};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Callbacks the scheduler invokes on the actor itself
///
/// Every method has a default, so a plain struct only needs an empty impl.
pub trait Actor {
    /// A node was added to the registry
    fn on_connect(&mut self, _ctx: &mut Context, _node: &NodeKey) {}

    /// A node was pruned or removed
    fn on_disconnect(&mut self, _ctx: &mut Context, _node: &NodeKey) {}

    /// The first heartbeat of a node arrived
    fn on_first_heartbeat(&mut self, _ctx: &mut Context, _node: &NodeKey) {}

    /// A handler, task or hook failed
    fn on_fault(&mut self, _ctx: &mut Context, fault: &Fault) {
        error!(handler = %fault.handler, kind = ?fault.kind, error = %format!("{:#}", fault.error), "Callback failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    StopRequested,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    Periodic(Duration),
    Deferred(Duration),
}

pub(crate) struct Timer<A> {
    pub(crate) id: HandlerId,
    pub(crate) schedule: Schedule,
    pub(crate) task: TaskFn<A>,
    due: Option<Instant>,
    retired: bool,
}

impl<A> Timer<A> {
    pub(crate) fn new(id: HandlerId, schedule: Schedule, task: TaskFn<A>) -> Self {
        Self {
            id,
            schedule,
            task,
            due: None,
            retired: false,
        }
    }

    fn arm(&mut self, start: Instant) {
        self.due = Some(match self.schedule {
            Schedule::Periodic(_) => start,
            Schedule::Deferred(delay) => start + delay,
        });
    }
}

/// Next invocation of a periodic task
///
/// The interval is measured from the start of the previous invocation; a body
/// that overran its interval is invoked again immediately. Drift does not
/// accumulate across cycles.
pub fn next_deadline(started: Instant, finished: Instant, interval: Duration) -> Instant {
    (started + interval).max(finished)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a callback, turning a panic into an error
fn guarded(f: impl FnOnce() -> anyhow::Result<()>) -> anyhow::Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Hand a fault to the actor; a failing fault hook is only logged
fn report_fault<A: Actor>(actor: &mut A, ctx: &mut Context, fault: &Fault) {
    let hooked = guarded(|| {
        actor.on_fault(ctx, fault);
        Ok(())
    });
    if let Err(error) = hooked {
        error!(handler = %fault.handler, fault = %fault.error, %error, "Fault hook failed");
    }
}

/// Feed queued registry edges to the lifecycle hooks until none are left
fn deliver_events<A: Actor>(actor: &mut A, ctx: &mut Context) {
    loop {
        let events = ctx.take_events();
        if events.is_empty() {
            return;
        }
        for event in events {
            let (hook, result) = match &event {
                NodeEvent::Connected(key) => (
                    "on_connect",
                    guarded(|| {
                        actor.on_connect(ctx, key);
                        Ok(())
                    }),
                ),
                NodeEvent::Disconnected(key) => (
                    "on_disconnect",
                    guarded(|| {
                        actor.on_disconnect(ctx, key);
                        Ok(())
                    }),
                ),
                NodeEvent::FirstHeartbeat(key) => (
                    "on_first_heartbeat",
                    guarded(|| {
                        actor.on_first_heartbeat(ctx, key);
                        Ok(())
                    }),
                ),
            };
            if let Err(error) = result {
                let fault = Fault {
                    handler: HandlerId::new("actor", hook),
                    kind: FaultKind::Hook,
                    error,
                };
                report_fault(actor, ctx, &fault);
            }
        }
    }
}

enum Wake {
    Stop,
    Delivery(Option<Delivery>),
    Timer,
}

/// Handle for pushing messages into a scheduler from outside a listener
#[derive(Debug, Clone)]
pub struct Injector {
    tx: mpsc::Sender<Delivery>,
}

impl Injector {
    /// Enqueue a message; `false` once the scheduler is gone
    pub async fn send(&self, inbound: Inbound) -> bool {
        self.tx.send(Delivery::Message(inbound)).await.is_ok()
    }

    /// Enqueue without waiting; `false` when the queue is full or closed
    pub fn try_send(&self, inbound: Inbound) -> bool {
        self.tx.try_send(Delivery::Message(inbound)).is_ok()
    }
}

pub struct Scheduler<A: Actor> {
    actor: A,
    ctx: Context,
    table: SubscriptionTable<A>,
    timers: Vec<Timer<A>>,
    listeners: Vec<Listener>,
    running: Vec<(String, JoinHandle<()>)>,
    inbound_tx: mpsc::Sender<Delivery>,
    inbound_rx: mpsc::Receiver<Delivery>,
    stop_rx: watch::Receiver<bool>,
    grace: Duration,
    state: SchedulerState,
    unknown_seen: HashSet<u16>,
}

impl<A: Actor> std::fmt::Debug for Scheduler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("subscriptions", &self.table)
            .field("timers", &self.timers.len())
            .field("listeners", &(self.listeners.len() + self.running.len()))
            .finish()
    }
}

impl<A: Actor> Scheduler<A> {
    pub(crate) fn new(
        actor: A,
        ctx: Context,
        table: SubscriptionTable<A>,
        timers: Vec<Timer<A>>,
        listeners: Vec<Listener>,
        capacity: usize,
        grace: Duration,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        let stop_rx = ctx.stop_handle().subscribe();
        Self {
            actor,
            ctx,
            table,
            timers,
            listeners,
            running: Vec::new(),
            inbound_tx,
            inbound_rx,
            stop_rx,
            grace,
            state: SchedulerState::Created,
            unknown_seen: HashSet::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn actor(&self) -> &A {
        &self.actor
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

    pub fn stop_handle(&self) -> StopHandle {
        self.ctx.stop_handle()
    }

    pub fn injector(&self) -> Injector {
        Injector {
            tx: self.inbound_tx.clone(),
        }
    }

    /// Run until a stop is requested, then shut down
    pub async fn run(&mut self) -> Result<()> {
        if self.state != SchedulerState::Created {
            return Err(ActorError::InvalidState {
                operation: "run",
                state: self.state,
            });
        }
        self.state = SchedulerState::Running;

        let start = Instant::now();
        for timer in &mut self.timers {
            timer.arm(start);
        }
        self.spawn_listeners();
        info!(
            types = ?self.table.types(),
            wildcard = self.table.has_wildcard(),
            timers = self.timers.len(),
            listeners = self.running.len(),
            "Scheduler running"
        );

        // edges raised while the node was assembled (fixed nodes)
        deliver_events(&mut self.actor, &mut self.ctx);

        while !self.ctx.is_stopping() {
            self.run_due_timers();
            if self.ctx.is_stopping() {
                break;
            }

            let deadline = self.timers.iter().filter_map(|t| t.due).min();
            let idle_until = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            let wake = tokio::select! {
                biased;
                _ = stopped(&mut self.stop_rx) => Wake::Stop,
                delivery = self.inbound_rx.recv() => Wake::Delivery(delivery),
                _ = sleep_until(idle_until), if deadline.is_some() => Wake::Timer,
            };

            match wake {
                Wake::Stop => break,
                Wake::Delivery(Some(Delivery::Message(inbound))) => self.dispatch(inbound),
                Wake::Delivery(Some(Delivery::Finished { source, stop })) => {
                    info!(source = %source, stop, "Message source finished");
                    if stop {
                        self.ctx.stop();
                    }
                }
                Wake::Delivery(None) => break,
                Wake::Timer => {}
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn spawn_listeners(&mut self) {
        let wanted: Option<Arc<[u16]>> = self.table.wanted_types().map(Arc::from);
        for listener in self.listeners.drain(..) {
            let feed = Feed::new(
                listener.name().to_string(),
                self.inbound_tx.clone(),
                self.ctx.stop_handle(),
                wanted.clone(),
            );
            self.running.push(listener.spawn(feed));
        }
    }

    /// Deliver one message to its handlers in dispatch order
    pub fn dispatch(&mut self, inbound: Inbound) {
        let Inbound { message, origin } = inbound;
        let type_id = message.type_id();
        let unknown = message.payload.is_unknown();

        if unknown {
            if self.unknown_seen.insert(type_id) {
                warn!(type_id, ?origin, "Unknown message type, delivering to wildcard handlers only");
            } else {
                debug!(type_id, ?origin, "Unknown message type");
            }
        }

        self.ctx.record(&message);

        let Self { actor, ctx, table, .. } = self;
        for sub in table.handlers_mut(type_id, unknown) {
            let handler = &mut sub.handler;
            if let Err(error) = guarded(|| handler(actor, ctx, &message)) {
                let fault = Fault {
                    handler: sub.id.clone(),
                    kind: FaultKind::Handler { type_id },
                    error,
                };
                report_fault(actor, ctx, &fault);
            }
            deliver_events(actor, ctx);
        }
    }

    fn run_due_timers(&mut self) {
        let now = Instant::now();
        let mut due: Vec<usize> = (0..self.timers.len())
            .filter(|&i| self.timers[i].due.map_or(false, |d| d <= now))
            .collect();
        // stable: equal deadlines keep registration order
        due.sort_by_key(|&i| self.timers[i].due);

        let Self { actor, ctx, timers, .. } = self;
        for i in due {
            if ctx.is_stopping() {
                break;
            }
            let timer = &mut timers[i];
            let started = Instant::now();
            let task = &mut timer.task;
            let result = guarded(|| task(actor, ctx));

            let kind = match timer.schedule {
                Schedule::Periodic(interval) => {
                    if result.is_ok() {
                        timer.due = Some(next_deadline(started, Instant::now(), interval));
                    } else {
                        timer.retired = true;
                    }
                    FaultKind::Periodic
                }
                Schedule::Deferred(_) => {
                    timer.retired = true;
                    FaultKind::Deferred
                }
            };

            if let Err(error) = result {
                let fault = Fault {
                    handler: timer.id.clone(),
                    kind,
                    error,
                };
                report_fault(actor, ctx, &fault);
            }
            deliver_events(actor, ctx);
        }
        timers.retain(|t| !t.retired);
    }

    async fn shutdown(&mut self) {
        self.state = SchedulerState::StopRequested;
        self.ctx.stop();

        let cancelled = self.timers.len();
        self.timers.clear();
        info!(cancelled_tasks = cancelled, listeners = self.running.len(), "Scheduler stopping");

        let deadline = Instant::now() + self.grace;
        for (name, handle) in self.running.drain(..) {
            let abort = handle.abort_handle();
            match timeout_at(deadline, handle).await {
                Ok(Ok(())) => debug!(listener = %name, "Listener stopped"),
                Ok(Err(e)) if e.is_cancelled() => debug!(listener = %name, "Listener cancelled"),
                Ok(Err(e)) => warn!(listener = %name, error = %e, "Listener ended abnormally"),
                Err(_) => {
                    warn!(
                        listener = %name,
                        grace_ms = self.grace.as_millis() as u64,
                        "Listener did not stop within the grace period, aborting"
                    );
                    abort.abort();
                }
            }
        }

        self.ctx.close_recorder();
        self.state = SchedulerState::Stopped;
        info!("Scheduler stopped");
    }
}
