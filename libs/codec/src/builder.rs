//! # Frame Builder
//!
//! Assembles header + payload + CRC footer, and provides the field writer used
//! by payload encoders.

use crate::checksum::calculate_crc16;
use crate::constants::{FOOTER_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::Header;
use bytes::{BufMut, Bytes, BytesMut};

/// Build a complete frame from a header and an already-encoded payload
///
/// The header's `size` is overwritten with the payload length.
pub fn build_frame(header: &Header, payload: &[u8]) -> ProtocolResult<Bytes> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            limit: MAX_PAYLOAD_SIZE,
            type_id: header.type_id,
        });
    }

    let mut header = *header;
    header.size = payload.len() as u16;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    header.encode_into(&mut frame);
    frame.extend_from_slice(payload);
    let crc = calculate_crc16(&frame);
    frame.put_u16_le(crc);
    Ok(frame.freeze())
}

/// Little-endian payload field writer
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: BytesMut,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64_le(value);
        self
    }

    /// Length-prefixed (u16) UTF-8 text; text longer than the prefix can
    /// describe is truncated at a character boundary
    pub fn plaintext(&mut self, value: &str) -> &mut Self {
        let mut end = value.len().min(u16::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.put_u16_le(end as u16);
        self.buf.extend_from_slice(&value.as_bytes()[..end]);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FieldReader;

    #[test]
    fn test_build_frame_sets_size() {
        let mut header = Header::new(5);
        header.size = 999;
        let frame = build_frame(&header, &[0xAA; 4]).unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + 4 + FOOTER_SIZE);
        assert_eq!(Header::decode(&frame).unwrap().size, 4);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let err = build_frame(&Header::new(5), &payload).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_plaintext_prefix() {
        let mut writer = FieldWriter::new();
        writer.u8(1).plaintext("Daemon=0");
        let bytes = writer.finish();

        let mut reader = FieldReader::new(5, &bytes);
        assert_eq!(reader.u8("op").unwrap(), 1);
        assert_eq!(reader.plaintext("list").unwrap(), "Daemon=0");
        reader.finish().unwrap();
    }
}
