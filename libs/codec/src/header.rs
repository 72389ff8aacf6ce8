//! Frame header and footer
//!
//! The header is the only part of a frame a log scanner ever needs: it names the
//! message type, the payload length and the routing fields. Decoding it never
//! touches the payload.

use crate::constants::{offsets, FOOTER_SIZE, HEADER_SIZE, NULL_ID, SYNC, UNK_EID};
use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded frame header (the sync number is validated, not stored)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// Message type identifier
    pub type_id: u16,
    /// Payload size in bytes
    pub size: u16,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Source address
    pub src: u16,
    /// Source entity
    pub src_ent: u8,
    /// Destination address
    pub dst: u16,
    /// Destination entity
    pub dst_ent: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            type_id: NULL_ID,
            size: 0,
            timestamp: 0.0,
            src: NULL_ID,
            src_ent: UNK_EID,
            dst: NULL_ID,
            dst_ent: UNK_EID,
        }
    }
}

impl Header {
    pub fn new(type_id: u16) -> Self {
        Self {
            type_id,
            ..Self::default()
        }
    }

    /// Decode a header from the first [`HEADER_SIZE`] bytes of `data`
    ///
    /// Fails on a short buffer or an invalid sync number; no other field is
    /// range-checked here.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                HEADER_SIZE,
                data.len(),
                "frame header",
            ));
        }

        let mut buf = &data[..HEADER_SIZE];
        let sync = buf.get_u16_le();
        if sync != SYNC {
            return Err(ProtocolError::invalid_sync(SYNC, sync, offsets::SYNC));
        }

        Ok(Self {
            type_id: buf.get_u16_le(),
            size: buf.get_u16_le(),
            timestamp: buf.get_f64_le(),
            src: buf.get_u16_le(),
            src_ent: buf.get_u8(),
            dst: buf.get_u16_le(),
            dst_ent: buf.get_u8(),
        })
    }

    /// Append the encoded header (including sync) to `out`
    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u16_le(SYNC);
        out.put_u16_le(self.type_id);
        out.put_u16_le(self.size);
        out.put_f64_le(self.timestamp);
        out.put_u16_le(self.src);
        out.put_u8(self.src_ent);
        out.put_u16_le(self.dst);
        out.put_u8(self.dst_ent);
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        self.encode_into(&mut &mut raw[..]);
        raw
    }

    /// Total frame length described by this header
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.size as usize + FOOTER_SIZE
    }

    /// Stamp the header with the current wall-clock time
    pub fn set_timestamp_now(&mut self) {
        self.timestamp = unix_timestamp();
    }
}

/// Frame footer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Footer {
    pub crc: u16,
}

impl Footer {
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(ProtocolError::message_too_small(
                FOOTER_SIZE,
                data.len(),
                "frame footer",
            ));
        }
        Ok(Self {
            crc: u16::from_le_bytes([data[0], data[1]]),
        })
    }
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
