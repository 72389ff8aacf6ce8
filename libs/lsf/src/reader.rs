//! LSF reader
//!
//! Two read strategies share one iterator:
//!
//! - **indexed**: the per-type offset lists of the wanted types are k-way
//!   merged into file order and each record is read by seeking to it
//! - **scan**: one forward pass; every header is read, but payloads of
//!   unwanted types are skipped without being decoded
//!
//! Any frame-level failure ends the iteration with an error carrying the
//! record offset. It is never reported as a clean end of file.

use crate::error::{LsfError, Result};
use crate::index::LogIndex;
use crate::record::FrameScanner;
use codec::{ImcCodec, Message, MessageCodec};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an index side file is used when opening a log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Never touch the side file
    Disabled,
    /// Use a valid side file if present
    UseExisting,
    /// Use a valid side file, otherwise build one and save it
    Build,
}

/// What happened to the index when the log was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// No index in use
    None,
    /// A valid side file was loaded
    Loaded,
    /// No usable side file existed; a new index was built
    Built,
    /// The side file did not match the log and was discarded
    Stale,
    /// The side file was stale and a fresh index was built in its place
    Rebuilt,
}

/// Reader over one LSF file
pub struct LsfReader {
    path: PathBuf,
    scanner: FrameScanner<BufReader<File>>,
    codec: Arc<dyn MessageCodec>,
    index: Option<LogIndex>,
    index_status: IndexStatus,
}

impl std::fmt::Debug for LsfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LsfReader")
            .field("path", &self.path)
            .field("index_status", &self.index_status)
            .finish()
    }
}

impl LsfReader {
    /// Open without an index (scan reads only)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, IndexMode::Disabled)
    }

    /// Open and build or load the side-file index
    pub fn open_indexed(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, IndexMode::Build)
    }

    pub fn open_with(path: impl AsRef<Path>, mode: IndexMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| LsfError::io(format!("opening {}", path.display()), e))?;
        let scanner = FrameScanner::new(BufReader::new(file))?;

        let mut reader = Self {
            path,
            scanner,
            codec: Arc::new(ImcCodec),
            index: None,
            index_status: IndexStatus::None,
        };
        reader.attach_index(mode)?;
        Ok(reader)
    }

    /// Decode records with a different codec
    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> Option<&LogIndex> {
        self.index.as_ref()
    }

    pub fn index_status(&self) -> IndexStatus {
        self.index_status
    }

    /// Timestamp of the first record, read from its header
    pub fn first_timestamp(&mut self) -> Result<Option<f64>> {
        self.scanner.seek_to(0)?;
        Ok(self.scanner.next_header()?.map(|(_, h)| h.timestamp))
    }

    fn attach_index(&mut self, mode: IndexMode) -> Result<()> {
        if mode == IndexMode::Disabled {
            return Ok(());
        }

        let side = LogIndex::side_path(&self.path);
        let mut stale = false;
        if side.exists() {
            match LogIndex::load(&side) {
                Ok(index) => {
                    let first = self.first_timestamp()?;
                    if index.matches_first_timestamp(first) {
                        debug!(path = %side.display(), "Loaded log index");
                        self.index = Some(index);
                        self.index_status = IndexStatus::Loaded;
                        return Ok(());
                    }
                    warn!(
                        path = %side.display(),
                        sentinel = ?index.sentinel,
                        first = ?first,
                        "Index does not match log, discarding"
                    );
                    stale = true;
                }
                Err(error) => {
                    warn!(path = %side.display(), %error, "Unreadable index, discarding");
                    stale = true;
                }
            }
        }

        if mode == IndexMode::UseExisting {
            self.index_status = if stale { IndexStatus::Stale } else { IndexStatus::None };
            return Ok(());
        }

        self.rebuild_index()?;
        self.index_status = if stale { IndexStatus::Rebuilt } else { IndexStatus::Built };
        Ok(())
    }

    /// Build a fresh index from the log and try to persist it
    ///
    /// A side file that cannot be written is logged; the in-memory index is
    /// still used.
    pub fn rebuild_index(&mut self) -> Result<&LogIndex> {
        let index = LogIndex::from_scanner(&mut self.scanner)?;
        let side = LogIndex::side_path(&self.path);
        match index.save(&side) {
            Ok(()) => info!(path = %side.display(), records = index.record_count(), "Saved log index"),
            Err(error) => warn!(path = %side.display(), %error, "Unable to save log index"),
        }
        Ok(self.index.insert(index))
    }

    /// Number of records of `type_id`; needs a valid index
    pub fn count(&self, type_id: u16) -> Result<usize> {
        self.index
            .as_ref()
            .map(|i| i.count(type_id))
            .ok_or(LsfError::IndexRequired { operation: "count" })
    }

    /// Iterate records of the given types (all types when `None`)
    ///
    /// Uses the index when one is attached, a forward scan otherwise.
    pub fn messages(&mut self, types: Option<&[u16]>) -> Messages<'_> {
        let plan = match &self.index {
            Some(index) => Plan::Offsets(index.merged_offsets(types).into_iter()),
            None => Plan::Scan {
                wanted: types.map(|t| t.iter().copied().collect()),
                started: false,
            },
        };
        Messages {
            reader: self,
            plan,
            failed: false,
        }
    }

    /// Collect [`Self::messages`] into a vector, failing on the first error
    pub fn read_all(&mut self, types: Option<&[u16]>) -> Result<Vec<Message>> {
        self.messages(types).collect()
    }

    fn read_at(&mut self, offset: u64) -> Result<Message> {
        self.scanner.seek_to(offset)?;
        let (offset, header) = self.scanner.next_header()?.ok_or_else(|| LsfError::MalformedFrame {
            offset,
            expected: "record".to_string(),
            actual: "end of file".to_string(),
            reason: "indexed offset past end of log".to_string(),
        })?;
        self.decode_current(offset, &header)
    }

    fn decode_current(&mut self, offset: u64, header: &codec::Header) -> Result<Message> {
        let frame = self.scanner.read_frame(offset, header)?;
        self.codec
            .decode(&frame)
            .map_err(|source| LsfError::Protocol { offset, source })
    }

    fn scan_next(&mut self, wanted: &Option<HashSet<u16>>) -> Result<Option<Message>> {
        while let Some((offset, header)) = self.scanner.next_header()? {
            let keep = wanted.as_ref().map_or(true, |w| w.contains(&header.type_id));
            if keep {
                return self.decode_current(offset, &header).map(Some);
            }
            self.scanner.skip_body(offset, &header)?;
        }
        Ok(None)
    }
}

enum Plan {
    Offsets(std::vec::IntoIter<u64>),
    Scan {
        wanted: Option<HashSet<u16>>,
        started: bool,
    },
}

/// Record iterator returned by [`LsfReader::messages`]
pub struct Messages<'a> {
    reader: &'a mut LsfReader,
    plan: Plan,
    failed: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let step = match &mut self.plan {
            Plan::Offsets(offsets) => match offsets.next() {
                Some(offset) => self.reader.read_at(offset).map(Some),
                None => Ok(None),
            },
            Plan::Scan { wanted, started } => {
                let rewind = if *started {
                    Ok(())
                } else {
                    *started = true;
                    self.reader.scanner.seek_to(0)
                };
                rewind.and_then(|()| self.reader.scan_next(wanted))
            }
        };

        match step {
            Ok(found) => found.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::LsfWriter;
    use codec::{Heartbeat, Message};

    #[test]
    fn test_count_requires_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data.lsf");
        let mut writer = LsfWriter::create(&path).unwrap();
        writer.write_message(&Message::new(Heartbeat)).unwrap();
        writer.finish().unwrap();

        let reader = LsfReader::open(&path).unwrap();
        assert!(matches!(reader.count(150), Err(LsfError::IndexRequired { .. })));

        let reader = LsfReader::open_indexed(&path).unwrap();
        assert_eq!(reader.index_status(), IndexStatus::Built);
        assert_eq!(reader.count(150).unwrap(), 1);
    }

    #[test]
    fn test_use_existing_without_side_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data.lsf");
        LsfWriter::create(&path).unwrap().finish().unwrap();

        let mut reader = LsfReader::open_with(&path, IndexMode::UseExisting).unwrap();
        assert_eq!(reader.index_status(), IndexStatus::None);
        assert!(reader.read_all(None).unwrap().is_empty());
    }
}
