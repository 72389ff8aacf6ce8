//! LSF side-file index
//!
//! One linear pass over the headers records, per type id, the offsets of every
//! record of that type. The first record's timestamp is stored as a sentinel:
//! an index is only trusted while the log still starts with that record, which
//! catches a log replaced or truncated behind the index's back.

use crate::error::{LsfError, Result};
use crate::record::FrameScanner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of the index side file
pub const INDEX_EXTENSION: &str = "idx";

/// Per-type record offsets of one log file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogIndex {
    /// Timestamp of the first record (`None` for an empty log)
    pub sentinel: Option<f64>,
    /// Type id → ascending record offsets
    pub offsets: BTreeMap<u16, Vec<u64>>,
}

impl LogIndex {
    /// Build from a seekable log, reading headers only
    pub fn build<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::from_scanner(&mut FrameScanner::new(reader)?)
    }

    /// Build by walking every header of `scanner` from the start
    pub fn from_scanner<R: Read + Seek>(scanner: &mut FrameScanner<R>) -> Result<Self> {
        scanner.seek_to(0)?;
        let mut index = LogIndex::default();

        for found in scanner.headers() {
            let (offset, header) = found?;
            if index.sentinel.is_none() {
                index.sentinel = Some(header.timestamp);
            }
            index.offsets.entry(header.type_id).or_default().push(offset);
        }

        debug!(records = index.record_count(), types = index.offsets.len(), "Built log index");
        Ok(index)
    }

    pub fn build_file(log: &Path) -> Result<Self> {
        let file = File::open(log)
            .map_err(|e| LsfError::io(format!("opening {}", log.display()), e))?;
        Self::build(BufReader::new(file))
    }

    /// Side-file path of a log: same path with the extension replaced
    pub fn side_path(log: &Path) -> PathBuf {
        log.with_extension(INDEX_EXTENSION)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| LsfError::io(format!("opening index {}", path.display()), e))?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            LsfError::index(format!("index {} is unreadable", path.display()), Some(e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| LsfError::io(format!("creating index {}", path.display()), e))?;
        let mut out = BufWriter::new(file);
        bincode::serialize_into(&mut out, self).map_err(|e| {
            LsfError::index(format!("failed to write index {}", path.display()), Some(e))
        })?;
        out.flush()
            .map_err(|e| LsfError::io(format!("flushing index {}", path.display()), e))
    }

    /// True when the sentinel matches the first record currently in the log
    pub fn matches_first_timestamp(&self, first: Option<f64>) -> bool {
        match (self.sentinel, first) {
            (None, None) => true,
            (Some(a), Some(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }

    pub fn offsets(&self, type_id: u16) -> &[u64] {
        self.offsets.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, type_id: u16) -> usize {
        self.offsets(type_id).len()
    }

    /// Record count per type id
    pub fn counts(&self) -> BTreeMap<u16, usize> {
        self.offsets.iter().map(|(t, o)| (*t, o.len())).collect()
    }

    pub fn record_count(&self) -> usize {
        self.offsets.values().map(Vec::len).sum()
    }

    /// Offsets of the selected types (all when `types` is `None`) in file order
    pub fn merged_offsets(&self, types: Option<&[u16]>) -> Vec<u64> {
        let lists: Vec<&[u64]> = match types {
            Some(types) => {
                let mut wanted: Vec<u16> = types.to_vec();
                wanted.sort_unstable();
                wanted.dedup();
                wanted.into_iter().map(|t| self.offsets(t)).collect()
            }
            None => self.offsets.values().map(Vec::as_slice).collect(),
        };
        kway_merge(&lists)
    }
}

/// Merge ascending lists into one ascending list
pub fn kway_merge(lists: &[&[u64]]) -> Vec<u64> {
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    let total = lists.iter().map(|l| l.len()).sum();
    let mut merged = Vec::with_capacity(total);
    let mut heap: BinaryHeap<Reverse<(u64, usize, usize)>> = lists
        .iter()
        .enumerate()
        .filter_map(|(list, l)| l.first().map(|first| Reverse((*first, list, 0))))
        .collect();

    while let Some(Reverse((offset, list, pos))) = heap.pop() {
        merged.push(offset);
        if let Some(next) = lists[list].get(pos + 1) {
            heap.push(Reverse((*next, list, pos + 1)));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{build_frame, Header};
    use std::io::Cursor;

    fn log() -> Vec<u8> {
        let mut log = Vec::new();
        for (i, type_id) in [151u16, 150, 150, 5, 150].into_iter().enumerate() {
            let mut header = Header::new(type_id);
            header.timestamp = 100.0 + i as f64;
            log.extend_from_slice(&build_frame(&header, &[i as u8; 3]).unwrap());
        }
        log
    }

    #[test]
    fn test_build_index() {
        let index = LogIndex::build(Cursor::new(log())).unwrap();
        assert_eq!(index.sentinel, Some(100.0));
        assert_eq!(index.offsets(150), &[25, 50, 100]);
        assert_eq!(index.count(151), 1);
        assert_eq!(index.count(999), 0);
        assert_eq!(index.record_count(), 5);
    }

    #[test]
    fn test_merged_offsets_in_file_order() {
        let index = LogIndex::build(Cursor::new(log())).unwrap();
        assert_eq!(index.merged_offsets(Some(&[5, 151, 5])), vec![0, 75]);
        assert_eq!(index.merged_offsets(None), vec![0, 25, 50, 75, 100]);
    }

    #[test]
    fn test_empty_log() {
        let index = LogIndex::build(Cursor::new(Vec::new())).unwrap();
        assert_eq!(index.sentinel, None);
        assert!(index.matches_first_timestamp(None));
        assert!(!index.matches_first_timestamp(Some(1.0)));
    }

    #[test]
    fn test_kway_merge() {
        let merged = kway_merge(&[&[1, 7, 9], &[], &[2, 3, 10], &[4]]);
        assert_eq!(merged, vec![1, 2, 3, 4, 7, 9, 10]);
    }

    #[test]
    fn test_side_path() {
        assert_eq!(
            LogIndex::side_path(Path::new("/logs/lauv/20240101/101010/Data.lsf")),
            PathBuf::from("/logs/lauv/20240101/101010/Data.idx")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data.idx");
        let index = LogIndex::build(Cursor::new(log())).unwrap();
        index.save(&path).unwrap();
        assert_eq!(LogIndex::load(&path).unwrap(), index);
    }
}
