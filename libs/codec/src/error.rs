//! Protocol-level errors for IMC frame processing
//!
//! Each variant carries enough context to explain what was expected and what was
//! found, so corrupted frames and logs can be diagnosed from the error alone.

use thiserror::Error;

/// Frame and payload parsing errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Buffer is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Sync number validation failed
    #[error("Invalid sync number: expected {expected:#06x}, got {actual:#06x} (offset: {offset}, indicates: {diagnosis})")]
    InvalidSync {
        expected: u16,
        actual: u16,
        offset: usize,
        diagnosis: String,
    },

    /// Footer CRC does not match header + payload
    #[error("Checksum mismatch: expected {expected:#06x}, calculated {calculated:#06x} (type {type_id}, payload: {payload_size} bytes)")]
    ChecksumMismatch {
        expected: u16,
        calculated: u16,
        type_id: u16,
        payload_size: usize,
    },

    /// Payload length disagrees with the header
    #[error("Payload size mismatch for type {type_id}: header declares {declared} bytes, frame carries {actual}")]
    PayloadSizeMismatch {
        type_id: u16,
        declared: usize,
        actual: usize,
    },

    /// Payload field could not be decoded
    #[error("Invalid payload for type {type_id} at offset {offset}: {reason}")]
    InvalidPayload {
        type_id: u16,
        offset: usize,
        reason: String,
    },

    /// Encoded payload does not fit in a frame
    #[error("Payload too large: {size} bytes exceeds limit {limit} (type {type_id})")]
    PayloadTooLarge {
        size: usize,
        limit: usize,
        type_id: u16,
    },
}

impl ProtocolError {
    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    /// Create an InvalidSync error, guessing the likely cause from the bytes found
    pub fn invalid_sync(expected: u16, actual: u16, offset: usize) -> Self {
        let diagnosis = match actual {
            0x0000 => "zeroed or uninitialized data",
            0xFFFF => "erased or padded data",
            _ if actual.swap_bytes() == expected => "byte order (endianness) mismatch",
            _ => "corruption, truncation or a misaligned read",
        };

        Self::InvalidSync {
            expected,
            actual,
            offset,
            diagnosis: diagnosis.to_string(),
        }
    }

    pub fn invalid_payload(type_id: u16, offset: usize, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            type_id,
            offset,
            reason: reason.into(),
        }
    }

    /// True when more bytes could turn this error into a successful parse
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::MessageTooSmall { .. })
    }
}

/// Result alias for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
