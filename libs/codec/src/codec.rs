//! Message codec collaborator
//!
//! The runtime never touches payload bytes directly; it goes through a
//! [`MessageCodec`]. [`ImcCodec`] is the implementation for the core message
//! set, and passes every other type through as raw bytes.

use crate::builder::build_frame;
use crate::error::ProtocolResult;
use crate::header::Header;
use crate::messages::{self, Message, Payload};
use crate::parser::parse_frame;
use bytes::Bytes;

/// Encode/decode typed messages and map type ids to names
pub trait MessageCodec: Send + Sync {
    /// Encode a complete frame (header, payload, footer)
    fn encode(&self, message: &Message) -> ProtocolResult<Bytes>;

    /// Decode a complete frame
    fn decode(&self, frame: &[u8]) -> ProtocolResult<Message> {
        let (header, payload) = parse_frame(frame)?;
        Ok(Message {
            header,
            payload: self.decode_payload(&header, payload)?,
        })
    }

    /// Decode the payload of an already validated header
    fn decode_payload(&self, header: &Header, payload: &[u8]) -> ProtocolResult<Payload>;

    fn type_name(&self, type_id: u16) -> Option<&'static str>;

    fn type_id(&self, name: &str) -> Option<u16>;
}

/// Codec for the core IMC message set
#[derive(Debug, Clone, Copy, Default)]
pub struct ImcCodec;

impl ImcCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for ImcCodec {
    fn encode(&self, message: &Message) -> ProtocolResult<Bytes> {
        let mut header = message.header;
        header.type_id = message.payload.type_id();
        build_frame(&header, &message.payload.encode_fields())
    }

    fn decode_payload(&self, header: &Header, payload: &[u8]) -> ProtocolResult<Payload> {
        Payload::decode(header.type_id, payload)
    }

    fn type_name(&self, type_id: u16) -> Option<&'static str> {
        messages::type_name(type_id)
    }

    fn type_id(&self, name: &str) -> Option<u16> {
        messages::type_id(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::messages::{Heartbeat, LoggingControl, LoggingControlOp};

    #[test]
    fn test_encode_overrides_header_type() {
        let mut msg = Message::new(Heartbeat);
        msg.header.type_id = 42;
        let frame = ImcCodec.encode(&msg).unwrap();
        let decoded = ImcCodec.decode(&frame).unwrap();
        assert_eq!(decoded.header.type_id, 150);
    }

    #[test]
    fn test_decode_rejects_trailing_payload_bytes() {
        let mut header = Header::new(150);
        header.src = 1;
        let frame = build_frame(&header, &[0]).unwrap();
        let err = ImcCodec.decode(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadSizeMismatch { type_id: 150, .. }));
    }

    #[test]
    fn test_logging_control_frame() {
        let msg = Message::new(LoggingControl {
            op: LoggingControlOp::Started,
            name: "20240101/120000".to_string(),
        });
        let frame = ImcCodec.encode(&msg).unwrap();
        let decoded = ImcCodec.decode(&frame).unwrap();
        assert_eq!(decoded.get::<LoggingControl>().unwrap().op, LoggingControlOp::Started);
        assert_eq!(decoded.header.size as usize, frame.len() - 22);
    }
}
