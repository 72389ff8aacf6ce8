//! Network Error Types
//!
//! Transport failures (sockets, interfaces) and routing failures (resolution,
//! missing endpoints) are kept apart: a handler usually wants to treat
//! "peer unknown" differently from "socket broken".

use crate::discovery::{NodeKey, ResolveError};
use std::net::SocketAddr;
use thiserror::Error;

/// Socket and interface level errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Binding a local socket failed
    #[error("Bind error: {message} (tried: {attempted:?})")]
    Bind {
        message: String,
        attempted: Vec<u16>,
    },

    /// Datagram could not be handed to the socket
    #[error("Send error: {message} (remote: {remote_addr})")]
    Send {
        message: String,
        remote_addr: SocketAddr,
        source: Option<std::io::Error>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn bind(message: impl Into<String>, attempted: Vec<u16>) -> Self {
        Self::Bind {
            message: message.into(),
            attempted,
        }
    }

    pub fn send(message: impl Into<String>, remote_addr: SocketAddr, source: Option<std::io::Error>) -> Self {
        Self::Send {
            message: message.into(),
            remote_addr,
            source,
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Check if the error is worth retrying on the next cycle
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } | TransportError::Send { .. } => true,
            TransportError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            TransportError::Bind { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Bind { .. } => "bind",
            TransportError::Send { .. } => "send",
            TransportError::Io { .. } => "io",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

/// Failure to deliver a message to a logical destination
#[derive(Error, Debug)]
pub enum RouteError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The node advertises no endpoint with a usable scheme
    #[error("No route to {node}: no '{scheme}' endpoint advertised")]
    NoRoute { node: NodeKey, scheme: String },

    #[error("Encode error: {0}")]
    Encode(#[from] codec::ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RouteError {
    /// True for errors meaning "peer absent", as opposed to local failures
    pub fn is_peer_absent(&self) -> bool {
        matches!(
            self,
            RouteError::Resolve(ResolveError::NotFound { .. }) | RouteError::NoRoute { .. }
        )
    }
}
