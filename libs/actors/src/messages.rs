//! Scheduler Envelopes
//!
//! What travels into the scheduler (decoded messages tagged with where they
//! came from) and what comes out of a failed handler (a [`Fault`] naming the
//! handler that failed).

use codec::Message;
use std::fmt;
use std::net::SocketAddr;

/// Where an inbound message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Received on a UDP socket
    Udp(SocketAddr),
    /// Replayed from a log
    Playback,
    /// Injected in-process (tests, local producers)
    Local,
}

/// A decoded message waiting for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub message: Message,
    pub origin: Origin,
}

impl Inbound {
    pub fn new(message: Message, origin: Origin) -> Self {
        Self { message, origin }
    }

    pub fn local(message: Message) -> Self {
        Self::new(message, Origin::Local)
    }
}

/// Qualified handler identity, displayed as `layer::name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    pub layer: String,
    pub name: String,
}

impl HandlerId {
    pub fn new(layer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.layer, self.name)
    }
}

/// What kind of callback failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Message handler; the message's other handlers still ran
    Handler { type_id: u16 },
    /// Periodic task; it will not be invoked again
    Periodic,
    /// Deferred one-shot task
    Deferred,
    /// Lifecycle hook (`on_connect`, `on_disconnect`, `on_first_heartbeat`)
    Hook,
}

/// A handler or task failure reported to [`crate::Actor::on_fault`]
#[derive(Debug)]
pub struct Fault {
    pub handler: HandlerId,
    pub kind: FaultKind,
    /// Returned error, or the panic message of a panicking callback
    pub error: anyhow::Error,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Handler { type_id } => {
                write!(f, "handler {} failed on type {}: {:#}", self.handler, type_id, self.error)
            }
            FaultKind::Periodic => {
                write!(f, "periodic task {} failed and was cancelled: {:#}", self.handler, self.error)
            }
            FaultKind::Deferred => write!(f, "deferred task {} failed: {:#}", self.handler, self.error),
            FaultKind::Hook => write!(f, "hook {} failed: {:#}", self.handler, self.error),
        }
    }
}
