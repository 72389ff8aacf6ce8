//! # Frame Parser
//!
//! Validates complete frames (sync, declared size, CRC) and provides the
//! bounds-checked field reader used by payload decoders.
//!
//! Parsing is split so that a log scanner can stop after [`parse_header`] and
//! skip the payload entirely.

use crate::checksum::calculate_crc16;
use crate::constants::{FOOTER_SIZE, HEADER_SIZE};
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{Footer, Header};
use bytes::Buf;

/// Parse and validate the header at the start of `data`
pub fn parse_header(data: &[u8]) -> ProtocolResult<Header> {
    Header::decode(data)
}

/// Parse a complete frame, returning the header and a borrowed payload slice
///
/// Validates the declared payload size against the buffer and the footer CRC
/// against header + payload. Trailing bytes after the footer are ignored.
pub fn parse_frame(data: &[u8]) -> ProtocolResult<(Header, &[u8])> {
    let header = parse_header(data)?;
    let frame_len = header.frame_len();
    if data.len() < frame_len {
        return Err(ProtocolError::message_too_small(
            frame_len,
            data.len(),
            format!("frame of type {} ({} byte payload)", header.type_id, header.size),
        ));
    }

    let payload_end = HEADER_SIZE + header.size as usize;
    let footer = Footer::decode(&data[payload_end..payload_end + FOOTER_SIZE])?;
    let calculated = calculate_crc16(&data[..payload_end]);
    if calculated != footer.crc {
        return Err(ProtocolError::ChecksumMismatch {
            expected: footer.crc,
            calculated,
            type_id: header.type_id,
            payload_size: header.size as usize,
        });
    }

    Ok((header, &data[HEADER_SIZE..payload_end]))
}

/// Bounds-checked little-endian reader over a payload
///
/// Every accessor reports the payload offset of the failing field, so a bad
/// payload can be located in a hex dump.
pub struct FieldReader<'a> {
    type_id: u16,
    data: &'a [u8],
    len: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(type_id: u16, data: &'a [u8]) -> Self {
        Self {
            type_id,
            data,
            len: data.len(),
        }
    }

    /// Current offset into the payload
    pub fn offset(&self) -> usize {
        self.len - self.data.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn ensure(&self, need: usize, field: &str) -> ProtocolResult<()> {
        if self.data.remaining() < need {
            return Err(ProtocolError::invalid_payload(
                self.type_id,
                self.offset(),
                format!(
                    "field '{}' needs {} bytes, {} left",
                    field,
                    need,
                    self.data.remaining()
                ),
            ));
        }
        Ok(())
    }

    pub fn u8(&mut self, field: &str) -> ProtocolResult<u8> {
        self.ensure(1, field)?;
        Ok(self.data.get_u8())
    }

    pub fn u16(&mut self, field: &str) -> ProtocolResult<u16> {
        self.ensure(2, field)?;
        Ok(self.data.get_u16_le())
    }

    pub fn f32(&mut self, field: &str) -> ProtocolResult<f32> {
        self.ensure(4, field)?;
        Ok(self.data.get_f32_le())
    }

    pub fn f64(&mut self, field: &str) -> ProtocolResult<f64> {
        self.ensure(8, field)?;
        Ok(self.data.get_f64_le())
    }

    /// Length-prefixed (u16) UTF-8 text
    pub fn plaintext(&mut self, field: &str) -> ProtocolResult<String> {
        let len = self.u16(field)? as usize;
        self.ensure(len, field)?;
        let start = self.offset();
        let text = std::str::from_utf8(&self.data[..len]).map_err(|e| {
            ProtocolError::invalid_payload(
                self.type_id,
                start,
                format!("field '{}' is not valid UTF-8: {}", field, e),
            )
        })?;
        let text = text.to_string();
        self.data.advance(len);
        Ok(text)
    }

    /// Fail if bytes are left over after the last field
    pub fn finish(self) -> ProtocolResult<()> {
        if self.data.has_remaining() {
            return Err(ProtocolError::PayloadSizeMismatch {
                type_id: self.type_id,
                declared: self.len,
                actual: self.len - self.data.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_frame;

    #[test]
    fn test_parse_frame_roundtrip_bytes() {
        let mut header = Header::new(150);
        header.src = 0x22;
        let frame = build_frame(&header, &[1, 2, 3]).unwrap();

        let (parsed, payload) = parse_frame(&frame).unwrap();
        assert_eq!(parsed.type_id, 150);
        assert_eq!(parsed.size, 3);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn test_checksum_mismatch() {
        let frame = build_frame(&Header::new(150), &[9, 9]).unwrap();
        let mut corrupted = frame.to_vec();
        corrupted[HEADER_SIZE] = 0;

        let err = parse_frame(&corrupted).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { type_id: 150, .. }));
    }

    #[test]
    fn test_truncated_frame() {
        let frame = build_frame(&Header::new(150), &[1, 2, 3, 4]).unwrap();
        let err = parse_frame(&frame[..frame.len() - 3]).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_field_reader_reports_offset() {
        let data = [3u8, 0, b'a', b'b'];
        let mut reader = FieldReader::new(151, &data);
        let err = reader.plaintext("sys_name").unwrap_err();
        match err {
            ProtocolError::InvalidPayload { type_id, offset, reason } => {
                assert_eq!(type_id, 151);
                assert_eq!(offset, 2);
                assert!(reason.contains("sys_name"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_field_reader_trailing_bytes() {
        let data = [1u8, 2, 3];
        let mut reader = FieldReader::new(5, &data);
        assert_eq!(reader.u8("op").unwrap(), 1);
        assert!(matches!(
            reader.finish(),
            Err(ProtocolError::PayloadSizeMismatch { .. })
        ));
    }
}
