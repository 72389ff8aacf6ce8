//! # Protocol Constants
//!
//! Framing constants of the IMC wire format. These values are shared with every
//! peer on the network and with every recorded log, so they must never change.
//!
//! ```text
//! ┌──────────────────── header (20 bytes, little-endian) ─────────────────────┐
//! │ sync u16 │ type u16 │ size u16 │ timestamp f64 │ src u16 │ src_ent u8 │ ... │
//! │ ... dst u16 │ dst_ent u8 │
//! └───────────────────────────────────────────────────────────────────────────┘
//! payload (`size` bytes) │ footer: crc16 u16
//! ```

/// Synchronization number at the start of every frame
pub const SYNC: u16 = 0xFE54;

/// Synchronization number as seen by a reader of the opposite byte order
pub const SYNC_REV: u16 = 0x54FE;

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 20;

/// Size of the frame footer (CRC-16) in bytes
pub const FOOTER_SIZE: usize = 2;

/// Largest payload a header can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Largest complete frame
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + FOOTER_SIZE;

/// Null address / null message identifier
pub const NULL_ID: u16 = 0xFFFF;

/// Unknown entity identifier
pub const UNK_EID: u8 = 0xFF;

/// System entity identifier
pub const SYS_EID: u8 = 0;

/// Byte offsets of the header fields
pub mod offsets {
    pub const SYNC: usize = 0;
    pub const TYPE_ID: usize = 2;
    pub const SIZE: usize = 4;
    pub const TIMESTAMP: usize = 6;
    pub const SRC: usize = 14;
    pub const SRC_ENT: usize = 16;
    pub const DST: usize = 17;
    pub const DST_ENT: usize = 19;
}
