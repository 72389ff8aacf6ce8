//! LSF writer
//!
//! Appends encoded frames back to back. The buffered file is flushed when the
//! writer is dropped; call [`LsfWriter::finish`] to observe flush errors.

use crate::error::{LsfError, Result};
use codec::{ImcCodec, Message, MessageCodec};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct LsfWriter<W: Write = BufWriter<File>> {
    out: W,
    codec: Arc<dyn MessageCodec>,
    path: Option<PathBuf>,
    records: u64,
    bytes: u64,
}

impl<W: Write> std::fmt::Debug for LsfWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LsfWriter")
            .field("path", &self.path)
            .field("records", &self.records)
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl LsfWriter<BufWriter<File>> {
    /// Create (or truncate) a log file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| LsfError::io(format!("creating {}", path.display()), e))?;
        Ok(Self::new(BufWriter::new(file)).with_path(path))
    }

    /// Open a log file for appending, creating it if missing
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LsfError::io(format!("opening {} for append", path.display()), e))?;
        Ok(Self::new(BufWriter::new(file)).with_path(path))
    }
}

impl<W: Write> LsfWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            codec: Arc::new(ImcCodec),
            path: None,
            records: 0,
            bytes: 0,
        }
    }

    fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    fn describe(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "log".to_string())
    }

    /// Encode and append one message
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        let frame = self.codec.encode(msg).map_err(|source| LsfError::Protocol {
            offset: self.bytes,
            source,
        })?;
        self.write_frame(&frame)
    }

    /// Append an already encoded frame
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.out
            .write_all(frame)
            .map_err(|e| LsfError::io(format!("writing {}", self.describe()), e))?;
        self.records += 1;
        self.bytes += frame.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| LsfError::io(format!("flushing {}", self.describe()), e))
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.out)
    }
}
