//! Handler Context
//!
//! Everything a handler or task may touch while it runs: the node registry,
//! the outbound router, the local entity table, the session recorder and the
//! stop signal. Only one callback runs at a time, so the context is handed
//! out as `&mut` and needs no locking.
//!
//! Registry edges produced while a callback runs ([`NodeEvent`]s) are queued
//! here and turned into [`crate::Actor`] hook calls by the scheduler once the
//! callback returns.

use crate::recording::SessionRecorder;
use codec::{unix_timestamp, Message, Payload};
use network::{
    LocalIdentity, Node, NodeEvent, NodeId, NodeRegistry, OutboundRouter, ResolveError, RouteError,
    ServiceEndpoint, StaticSelector,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Cloneable handle that requests scheduler shutdown
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown; idempotent
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolve once the stop signal is raised (or its sender is gone)
pub(crate) async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub struct Context {
    registry: NodeRegistry,
    router: OutboundRouter,
    recorder: Option<SessionRecorder>,
    entities: BTreeMap<String, u8>,
    events: Vec<NodeEvent>,
    stop: StopHandle,
    imc_port: Option<u16>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("identity", &self.router.identity())
            .field("nodes", &self.registry.len())
            .field("recording", &self.recorder.is_some())
            .field("imc_port", &self.imc_port)
            .finish()
    }
}

impl Context {
    pub fn new(registry: NodeRegistry, router: OutboundRouter) -> Self {
        Self {
            registry,
            router,
            recorder: None,
            entities: BTreeMap::new(),
            events: Vec::new(),
            stop: StopHandle::new(),
            imc_port: None,
        }
    }

    pub fn with_entities(mut self, entities: BTreeMap<String, u8>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn router(&self) -> &OutboundRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut OutboundRouter {
        &mut self.router
    }

    pub fn identity(&self) -> LocalIdentity {
        self.router.identity()
    }

    /// Local entities (label → id) reported to peers
    pub fn entities(&self) -> &BTreeMap<String, u8> {
        &self.entities
    }

    /// Port of the bound IMC unicast socket, if any
    pub fn imc_port(&self) -> Option<u16> {
        self.imc_port
    }

    pub fn set_imc_port(&mut self, port: Option<u16>) {
        self.imc_port = port;
    }

    /// Current wall-clock time in seconds since the epoch
    pub fn now(&self) -> f64 {
        unix_timestamp()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the scheduler to shut down after the current callback
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Queue a registry edge for the actor's lifecycle hooks
    pub fn notify(&mut self, event: NodeEvent) {
        self.events.push(event);
    }

    pub(crate) fn take_events(&mut self) -> Vec<NodeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Insert a node; a previously unknown key raises `Connected`
    pub fn add_node(&mut self, node: Node) {
        let key = node.key.clone();
        if self.registry.add_node(node).is_none() {
            self.notify(NodeEvent::Connected(key));
        }
    }

    /// Remove a node and raise `Disconnected` for it
    pub fn remove_node(&mut self, id: impl Into<NodeId>) -> Result<Node, ResolveError> {
        let node = self.registry.remove_node(id)?;
        self.notify(NodeEvent::Disconnected(node.key.clone()));
        Ok(node)
    }

    /// Mirror messages of the selected types to a fixed endpoint
    ///
    /// Returns `false` when the endpoint has no literal IP and port.
    pub fn add_static_transport(&mut self, endpoint: &ServiceEndpoint, selectors: &[StaticSelector]) -> bool {
        let routes = self.router.static_routes_mut();
        if selectors.is_empty() {
            return routes.add(endpoint, StaticSelector::All);
        }
        selectors.iter().all(|selector| routes.add(endpoint, *selector))
    }

    /// Send a new message carrying `payload` to the node named by `id`
    pub fn send(
        &mut self,
        id: impl Into<NodeId>,
        payload: impl Into<Payload>,
    ) -> Result<Vec<SocketAddr>, RouteError> {
        let mut msg = Message::new(payload);
        self.send_message(id, &mut msg, true)
    }

    /// Route `msg` to the node named by `id`, stamping it in place
    pub fn send_message(
        &mut self,
        id: impl Into<NodeId>,
        msg: &mut Message,
        set_timestamp: bool,
    ) -> Result<Vec<SocketAddr>, RouteError> {
        let sent = self.router.send(&self.registry, id, msg, set_timestamp)?;
        self.record(msg);
        Ok(sent)
    }

    /// Send `msg` only to the static destinations for its type
    pub fn send_static(&mut self, msg: &mut Message, set_timestamp: bool) -> Result<usize, RouteError> {
        let sent = self.router.send_static(msg, set_timestamp)?;
        if sent > 0 {
            self.record(msg);
        }
        Ok(sent)
    }

    /// Send `msg` to explicit socket addresses
    pub fn send_to_addrs(
        &mut self,
        msg: &mut Message,
        addrs: impl IntoIterator<Item = SocketAddr>,
        set_timestamp: bool,
    ) -> Result<usize, RouteError> {
        let sent = self.router.send_to_addrs(msg, addrs, set_timestamp)?;
        if sent > 0 {
            self.record(msg);
        }
        Ok(sent)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Append a message to the session log, if one is open
    ///
    /// A failing recorder is closed after the first error.
    pub fn record(&mut self, msg: &Message) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(error) = recorder.record(msg) {
            warn!(%error, path = %recorder.path().display(), "Session recording failed, closing log");
            self.close_recorder();
        }
    }

    /// Write the closing record and release the session log
    pub(crate) fn close_recorder(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            match recorder.stop() {
                Ok(path) => debug!(path = %path.display(), "Session log closed"),
                Err(error) => warn!(%error, "Unable to close session log"),
            }
        }
    }
}
