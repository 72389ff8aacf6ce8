//! # IMC Protocol Codec
//!
//! ## Purpose
//!
//! The "Rules" layer of the IMC runtime: frame layout, checksum and the core
//! message set every node must understand.
//!
//! ## Architecture Role
//!
//! ```text
//! [codec] → network/ → actors/
//!    ↓         ↓          ↓
//! Frames    Registry   Scheduler
//! CRC16     Routing    Dispatch
//!    └──────→ lsf/ (same record format on disk)
//! ```
//!
//! ## What This Crate Contains
//! - [`Header`] / [`Footer`] encoding with sync validation
//! - CRC-16 checksum
//! - [`FieldReader`] / [`FieldWriter`] for little-endian payload fields
//! - Core messages: Announce, Heartbeat, EntityList, EntityInfo, LoggingControl
//! - [`MessageCodec`] trait and the [`ImcCodec`] implementation
//!
//! ## What This Crate Does NOT Contain
//! - Sockets or routing (belongs in network/)
//! - Schema-generated bindings for the full message catalogue; unmapped types
//!   travel as [`Payload::Unknown`]
//!
//! ## Example
//!
//! ```rust
//! use codec::{ImcCodec, Message, MessageCodec, Heartbeat};
//!
//! let mut msg = Message::new(Heartbeat);
//! msg.header.src = 0x3334;
//! let frame = ImcCodec.encode(&msg).unwrap();
//! assert_eq!(ImcCodec.decode(&frame).unwrap(), msg);
//! ```

pub mod builder;
pub mod checksum;
pub mod codec;
pub mod constants;
pub mod error;
pub mod header;
pub mod messages;
pub mod parser;

pub use builder::{build_frame, FieldWriter};
pub use checksum::{calculate_crc16, verify_crc16, StreamingChecksum};
pub use codec::{ImcCodec, MessageCodec};
pub use constants::*;
pub use error::{ProtocolError, ProtocolResult};
pub use header::{unix_timestamp, Footer, Header};
pub use messages::{
    Announce, EntityInfo, EntityList, EntityListOp, Heartbeat, LoggingControl, LoggingControlOp,
    Message, Payload, PayloadKind, RawPayload, SystemType,
};
pub use parser::{parse_frame, parse_header, FieldReader};
