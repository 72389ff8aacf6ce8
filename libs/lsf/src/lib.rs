//! # LSF Logs
//!
//! ## Purpose
//!
//! Durable recording of the IMC record stream with fast, type-filtered replay.
//! An LSF file is the wire frames written back to back; nothing else.
//!
//! ## Architecture Role
//!
//! ```text
//! codec/ ──→ [lsf] ──→ actors/ (session recorder, playback)
//!              │
//!              └──→ services/imc_node (index, merge)
//! ```
//!
//! ## What This Crate Contains
//! - [`FrameScanner`]: header-only record boundary walk, no resynchronization
//! - [`LogIndex`]: per-type offsets with a first-timestamp sentinel, persisted
//!   as a bincode side file next to the log
//! - [`LsfReader`]: indexed (k-way merged offsets) or scanning filtered reads
//! - [`LsfWriter`]: append-only writer
//! - [`merge`]: time-ordered consolidation of plain and gzip logs
//!
//! ## Example
//!
//! ```rust,no_run
//! use lsf::LsfReader;
//!
//! let mut reader = LsfReader::open_indexed("Data.lsf")?;
//! println!("{} heartbeats", reader.count(150)?);
//! for msg in reader.messages(Some(&[151])) {
//!     let msg = msg?;
//!     println!("announce from {:#06x}", msg.src());
//! }
//! # Ok::<(), lsf::LsfError>(())
//! ```

pub mod error;
pub mod index;
pub mod merge;
pub mod reader;
pub mod record;
pub mod writer;

pub use error::{LsfError, Result};
pub use index::{kway_merge, LogIndex, INDEX_EXTENSION};
pub use merge::{find_logs, merge, merge_files, MergeReport};
pub use reader::{IndexMode, IndexStatus, LsfReader, Messages};
pub use record::FrameScanner;
pub use writer::LsfWriter;
