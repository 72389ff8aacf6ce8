//! Log consolidation
//!
//! Collects every record of every log under a root (plain `.lsf` or gzip
//! compressed `.lsf.gz`), orders them by header timestamp and writes them out
//! as one contiguous log. Records with equal timestamps keep their input order.
//!
//! A compressed input whose stream ends early is decompressed chunk by chunk;
//! every complete record before the break is kept and the file is listed in
//! [`MergeReport::truncated`].

use crate::error::{LsfError, Result};
use crate::record::FrameScanner;
use crate::writer::LsfWriter;
use codec::parse_frame;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Input logs in the order they were read
    pub inputs: Vec<PathBuf>,
    /// Records written to the output
    pub records: usize,
    /// Compressed inputs that ended early; their complete records were kept
    pub truncated: Vec<PathBuf>,
    pub output: PathBuf,
}

struct Record {
    timestamp: f64,
    frame: Vec<u8>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

/// Every `*.lsf` and `*.lsf.gz` below `root`, sorted by path
pub fn find_logs(root: &Path) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let mut found = Vec::new();

    for suffix in ["**/*.lsf", "**/*.lsf.gz"] {
        let pattern = format!("{}/{}", base.trim_end_matches('/'), suffix);
        let paths = glob::glob(&pattern).map_err(|source| LsfError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => found.push(path),
                Ok(_) => {}
                Err(e) => {
                    let context = format!("listing {}", e.path().display());
                    return Err(LsfError::io(context, e.into_error()));
                }
            }
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

/// Merge every log found under `root` into `output`
///
/// `output` itself is never read as an input, so it may live inside `root`.
pub fn merge(root: &Path, output: &Path) -> Result<MergeReport> {
    let inputs: Vec<PathBuf> = find_logs(root)?
        .into_iter()
        .filter(|p| p.as_path() != output)
        .collect();
    merge_files(&inputs, output)
}

/// Merge the given logs into `output`, ordered by record timestamp
pub fn merge_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<MergeReport> {
    let mut report = MergeReport {
        output: output.to_path_buf(),
        ..MergeReport::default()
    };
    let mut records = Vec::new();

    for input in inputs {
        let input = input.as_ref();
        let (data, truncated) = read_input(input)?;
        let before = records.len();
        collect_records(input, data, truncated, &mut records)?;

        debug!(path = %input.display(), records = records.len() - before, truncated, "Read merge input");
        if truncated {
            report.truncated.push(input.to_path_buf());
        }
        report.inputs.push(input.to_path_buf());
    }

    records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut writer = LsfWriter::create(output)?;
    for record in &records {
        writer.write_frame(&record.frame)?;
    }
    writer.finish()?;
    report.records = records.len();

    info!(
        inputs = report.inputs.len(),
        records = report.records,
        truncated = report.truncated.len(),
        output = %output.display(),
        "Merged logs"
    );
    Ok(report)
}

/// Whole contents of an input, decompressed; the flag marks an early end
fn read_input(path: &Path) -> Result<(Vec<u8>, bool)> {
    let file = File::open(path)
        .map_err(|e| LsfError::io(format!("opening {}", path.display()), e))?;

    if !is_gzip(path) {
        let mut data = Vec::new();
        BufReader::new(file)
            .read_to_end(&mut data)
            .map_err(|e| LsfError::io(format!("reading {}", path.display()), e))?;
        return Ok((data, false));
    }

    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    let mut data = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        match decoder.read(&mut chunk) {
            Ok(0) => return Ok((data, false)),
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::UnexpectedEof | ErrorKind::InvalidInput | ErrorKind::InvalidData
                ) =>
            {
                warn!(
                    path = %path.display(),
                    recovered_bytes = data.len(),
                    error = %e,
                    "Compressed log ends unexpectedly, keeping complete records"
                );
                return Ok((data, true));
            }
            Err(e) => {
                return Err(LsfError::io(format!("decompressing {}", path.display()), e));
            }
        }
    }
}

/// Split `data` into validated frames
///
/// For a truncated input the first broken record ends collection; for an
/// intact one it is an error.
fn collect_records(path: &Path, data: Vec<u8>, truncated: bool, out: &mut Vec<Record>) -> Result<()> {
    let mut scanner = FrameScanner::new(Cursor::new(data))?;
    loop {
        let step = scanner.next_header().and_then(|found| match found {
            Some((offset, header)) => {
                let frame = scanner.read_frame(offset, &header)?;
                parse_frame(&frame).map_err(|source| LsfError::Protocol { offset, source })?;
                Ok(Some(Record {
                    timestamp: header.timestamp,
                    frame,
                }))
            }
            None => Ok(None),
        });

        match step {
            Ok(Some(record)) => out.push(record),
            Ok(None) => return Ok(()),
            Err(e) if truncated => {
                debug!(path = %path.display(), error = %e, "Dropping partial record at end of salvaged log");
                return Ok(());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Merge input is corrupted");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_detection() {
        assert!(is_gzip(Path::new("a/Data.lsf.gz")));
        assert!(!is_gzip(Path::new("a/Data.lsf")));
    }

    #[test]
    fn test_find_logs_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("lauv-xplore-1/20240101/101010");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Data.lsf"), b"").unwrap();
        std::fs::write(dir.path().join("Old.lsf.gz"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = find_logs(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.to_string_lossy().contains(".lsf")));
    }
}
