//! LSF error types
//!
//! Frame-level problems always carry the file offset of the offending record
//! and what was expected versus found, so a corrupted log can be inspected
//! with a hex editor straight from the message.

use codec::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LsfError>;

#[derive(Error, Debug)]
pub enum LsfError {
    /// Header or record boundary is broken at `offset`
    #[error("Malformed frame at offset {offset}: expected {expected}, found {actual} ({reason})")]
    MalformedFrame {
        offset: u64,
        expected: String,
        actual: String,
        reason: String,
    },

    /// Record framing is intact but its contents failed to decode
    #[error("Invalid record at offset {offset}: {source}")]
    Protocol {
        offset: u64,
        #[source]
        source: ProtocolError,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Index error: {message}")]
    Index {
        message: String,
        #[source]
        source: Option<bincode::Error>,
    },

    #[error("'{operation}' requires a valid index")]
    IndexRequired { operation: &'static str },

    #[error("Invalid log search pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

impl LsfError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn index(message: impl Into<String>, source: Option<bincode::Error>) -> Self {
        Self::Index {
            message: message.into(),
            source,
        }
    }

    /// Describe a header that failed validation at `offset`
    pub fn malformed(offset: u64, err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidSync {
                expected,
                actual,
                diagnosis,
                ..
            } => Self::MalformedFrame {
                offset,
                expected: format!("sync {:#06x}", expected),
                actual: format!("{:#06x}", actual),
                reason: diagnosis,
            },
            ProtocolError::MessageTooSmall { need, got, context } => Self::MalformedFrame {
                offset,
                expected: format!("{} bytes", need),
                actual: format!("{} bytes", got),
                reason: format!("truncated {}", context),
            },
            other => Self::Protocol {
                offset,
                source: other,
            },
        }
    }

    /// Offset of the offending record, when known
    pub fn offset(&self) -> Option<u64> {
        match self {
            LsfError::MalformedFrame { offset, .. } | LsfError::Protocol { offset, .. } => {
                Some(*offset)
            }
            _ => None,
        }
    }
}
