//! Record boundary scanning
//!
//! An LSF file is a plain concatenation of wire frames. From any record start
//! the header gives the payload size, and the next record starts
//! `HEADER_SIZE + size + FOOTER_SIZE` bytes later. A header that fails
//! validation aborts the scan; there is no attempt to resynchronize by
//! searching for the next sync number.

use crate::error::{LsfError, Result};
use codec::{Header, HEADER_SIZE};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Header-only walker over a seekable log
#[derive(Debug)]
pub struct FrameScanner<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> FrameScanner<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner
            .seek(SeekFrom::End(0))
            .map_err(|e| LsfError::io("measuring log length", e))?;
        inner
            .seek(SeekFrom::Start(0))
            .map_err(|e| LsfError::io("rewinding log", e))?;
        Ok(Self { inner, pos: 0, len })
    }

    /// Current offset; a record start between calls to [`Self::next_header`]
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.len
    }

    /// Move to a known record start
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|e| LsfError::io(format!("seeking to offset {}", offset), e))?;
        self.pos = offset;
        Ok(())
    }

    /// Read and validate the header at the current position
    ///
    /// Returns `None` at a clean end of file. On success the position is just
    /// past the header; follow with [`Self::skip_body`] or [`Self::read_frame`].
    pub fn next_header(&mut self) -> Result<Option<(u64, Header)>> {
        let offset = self.pos;
        if offset >= self.len {
            return Ok(None);
        }

        let mut raw = [0u8; HEADER_SIZE];
        let got = read_up_to(&mut self.inner, &mut raw)
            .map_err(|e| LsfError::io(format!("reading header at offset {}", offset), e))?;
        self.pos += got as u64;

        let header = Header::decode(&raw[..got]).map_err(|e| LsfError::malformed(offset, e))?;

        let frame_len = header.frame_len() as u64;
        let available = self.len - offset;
        if frame_len > available {
            return Err(LsfError::MalformedFrame {
                offset,
                expected: format!("{} byte record (type {})", frame_len, header.type_id),
                actual: format!("{} bytes left in file", available),
                reason: "record extends past end of file".to_string(),
            });
        }

        Ok(Some((offset, header)))
    }

    /// Skip the payload and footer of the record whose header was just read
    pub fn skip_body(&mut self, offset: u64, header: &Header) -> Result<()> {
        self.seek_to(offset + header.frame_len() as u64)
    }

    /// Read the complete frame (header included) whose header was just read
    pub fn read_frame(&mut self, offset: u64, header: &Header) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(header.frame_len());
        frame.extend_from_slice(&header.to_bytes());
        frame.resize(header.frame_len(), 0);
        self.inner
            .read_exact(&mut frame[HEADER_SIZE..])
            .map_err(|e| LsfError::io(format!("reading record body at offset {}", offset), e))?;
        self.pos = offset + header.frame_len() as u64;
        Ok(frame)
    }

    /// Walk every header from the current position to the end of file
    pub fn headers(&mut self) -> Headers<'_, R> {
        Headers {
            scanner: self,
            failed: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Iterator over `(offset, header)` that skips every body
pub struct Headers<'a, R> {
    scanner: &'a mut FrameScanner<R>,
    failed: bool,
}

impl<R: Read + Seek> Iterator for Headers<'_, R> {
    type Item = Result<(u64, Header)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let step = self.scanner.next_header().and_then(|found| match found {
            Some((offset, header)) => {
                self.scanner.skip_body(offset, &header)?;
                Ok(Some((offset, header)))
            }
            None => Ok(None),
        });
        match step {
            Ok(found) => found.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill as much of `buf` as the reader can supply
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
