//! Runtime Error Types
//!
//! Errors of the scheduler itself. Handler and task bodies report their own
//! failures as `anyhow::Error`; those never reach this type and go to the
//! actor's fault hook instead.

use crate::system::SchedulerState;
use network::{RouteError, TransportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActorError {
    /// Operation not allowed in the scheduler's current state
    #[error("Cannot {operation} while the scheduler is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SchedulerState,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("Log error: {0}")]
    Log(#[from] lsf::LsfError),

    /// Invalid runtime settings
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Category for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::InvalidState { .. } => "state",
            ActorError::Transport(_) => "transport",
            ActorError::Route(_) => "route",
            ActorError::Log(_) => "log",
            ActorError::Configuration { .. } => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = ActorError::configuration("unknown message type 'Foo'", Some("static_transports.types"));
        assert_eq!(err.category(), "configuration");
        assert!(err.to_string().contains("Foo"));

        let err = ActorError::InvalidState {
            operation: "run",
            state: SchedulerState::Stopped,
        };
        assert_eq!(err.category(), "state");
        assert_eq!(err.to_string(), "Cannot run while the scheduler is Stopped");
    }
}
