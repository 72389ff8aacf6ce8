//! In-process datagram sinks
//!
//! [`MemorySink`] records every datagram instead of sending it, for tests and
//! dry runs that want to inspect outbound traffic. [`DiscardSink`] drops
//! everything, for nodes running without sockets (offline playback).

use super::DatagramSink;
use crate::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;

/// Sink that keeps every datagram it is given
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    sent: Arc<Mutex<Vec<(SocketAddr, Bytes)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far
    pub fn sent(&self) -> Vec<(SocketAddr, Bytes)> {
        self.sent.lock().clone()
    }

    /// Destinations in send order
    pub fn destinations(&self) -> Vec<SocketAddr> {
        self.sent.lock().iter().map(|(addr, _)| *addr).collect()
    }

    /// Remove and return everything sent so far
    pub fn take(&self) -> Vec<(SocketAddr, Bytes)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl DatagramSink for MemorySink {
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        self.sent.lock().push((addr, Bytes::copy_from_slice(datagram)));
        Ok(())
    }
}

/// Sink that drops every datagram
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl DatagramSink for DiscardSink {
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(%addr, len = datagram.len(), "Discarding datagram");
        Ok(())
    }
}
