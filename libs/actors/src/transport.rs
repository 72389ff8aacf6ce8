//! Message Sources
//!
//! Anything that produces inbound messages (a UDP socket, a log being
//! replayed) runs as its own task and feeds the scheduler through one bounded
//! channel. Sources never call handlers; they only decode and enqueue, so
//! every handler still runs on the scheduler's single thread of control.
//!
//! A source is described by a [`Listener`] and spawned when the scheduler
//! starts. It receives a [`Feed`]: the channel sender, the stop signal, and the
//! message types the scheduler has subscribers for.

use crate::context::{stopped, StopHandle};
use crate::messages::{Inbound, Origin};
use codec::MessageCodec;
use network::UdpEndpoint;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Item carried by the inbound channel
#[derive(Debug)]
pub(crate) enum Delivery {
    Message(Inbound),
    /// A source has nothing more to deliver
    Finished { source: String, stop: bool },
}

/// Connection from a message source to the scheduler
#[derive(Debug)]
pub struct Feed {
    name: String,
    tx: mpsc::Sender<Delivery>,
    stop_rx: watch::Receiver<bool>,
    stop: StopHandle,
    wanted: Option<Arc<[u16]>>,
}

impl Feed {
    pub(crate) fn new(
        name: String,
        tx: mpsc::Sender<Delivery>,
        stop: StopHandle,
        wanted: Option<Arc<[u16]>>,
    ) -> Self {
        Self {
            name,
            tx,
            stop_rx: stop.subscribe(),
            stop,
            wanted,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribed types, or `None` when a wildcard handler wants everything
    pub fn wanted(&self) -> Option<&[u16]> {
        self.wanted.as_deref()
    }

    /// Enqueue a message; `false` once the scheduler is gone
    pub async fn send(&self, inbound: Inbound) -> bool {
        self.tx.send(Delivery::Message(inbound)).await.is_ok()
    }

    /// Report that this source is exhausted
    ///
    /// With `stop_scheduler`, the scheduler stops after dispatching every
    /// message this source queued before.
    pub async fn finish(&self, stop_scheduler: bool) {
        let _ = self
            .tx
            .send(Delivery::Finished {
                source: self.name.clone(),
                stop: stop_scheduler,
            })
            .await;
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Resolve once shutdown has been requested
    pub async fn stopped(&mut self) {
        stopped(&mut self.stop_rx).await
    }
}

type SpawnFn = Box<dyn FnOnce(Feed) -> JoinHandle<()>>;

/// A message source waiting to be spawned
pub struct Listener {
    name: String,
    spawn: SpawnFn,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("name", &self.name).finish()
    }
}

impl Listener {
    pub fn new(name: impl Into<String>, spawn: impl FnOnce(Feed) -> JoinHandle<()> + 'static) -> Self {
        Self {
            name: name.into(),
            spawn: Box::new(spawn),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn spawn(self, feed: Feed) -> (String, JoinHandle<()>) {
        let handle = (self.spawn)(feed);
        (self.name, handle)
    }

    /// Receive, decode and enqueue datagrams from a UDP endpoint
    pub fn udp(name: impl Into<String>, endpoint: UdpEndpoint, codec: Arc<dyn MessageCodec>) -> Self {
        Self::new(name, move |feed| tokio::spawn(udp_loop(endpoint, codec, feed)))
    }
}

async fn udp_loop(endpoint: UdpEndpoint, codec: Arc<dyn MessageCodec>, mut feed: Feed) {
    let local = endpoint.local_addr();
    info!(listener = feed.name(), %local, "Listening for IMC datagrams");
    let wanted: Option<HashSet<u16>> = feed.wanted().map(|types| types.iter().copied().collect());

    loop {
        let received = tokio::select! {
            biased;
            _ = feed.stopped() => break,
            received = endpoint.recv_from() => received,
        };

        let (datagram, sender) = match received {
            Ok(received) => received,
            Err(error) if error.is_retryable() => {
                debug!(listener = feed.name(), %error, "Receive failed, retrying");
                continue;
            }
            Err(error) => {
                warn!(listener = feed.name(), category = error.category(), %error, "Receive failed, closing listener");
                break;
            }
        };

        let message = match codec.decode(&datagram) {
            Ok(message) => message,
            Err(error) => {
                warn!(listener = feed.name(), %sender, len = datagram.len(), %error, "Dropping undecodable datagram");
                continue;
            }
        };

        // unknown types still reach the scheduler so they get diagnosed
        if let Some(wanted) = &wanted {
            if !message.payload.is_unknown() && !wanted.contains(&message.type_id()) {
                continue;
            }
        }

        if !feed.send(Inbound::new(message, Origin::Udp(sender))).await {
            break;
        }
    }
    debug!(listener = feed.name(), %local, "Listener stopped");
}
