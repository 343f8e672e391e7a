//! Record Scanner
//!
//! Sequential pass over a segment file, yielding where each record lives.
//! Used to rebuild a segment's index on startup.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};

use super::LEN_PREFIX_SIZE;

/// Position of one fully written record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    /// Byte offset of the frame start
    pub offset: u64,
    /// Key stored in the frame
    pub key: String,
    /// Total frame length in bytes
    pub len: u64,
}

/// Scans frames from offset 0 up to `end`.
///
/// A frame that does not fit before `end` is a torn write: the scan stops
/// there without error and [`valid_len`](Self::valid_len) reports where the
/// last complete record ends.
pub struct RecordScanner<R> {
    reader: R,
    path: PathBuf,
    pos: u64,
    end: u64,
    torn: bool,
    done: bool,
}

impl RecordScanner<BufReader<File>> {
    /// Open a segment file for a full scan
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let end = file.metadata()?.len();
        Ok(Self::new(BufReader::new(file), path, end))
    }
}

impl<R: Read> RecordScanner<R> {
    /// Wrap a reader positioned at offset 0 whose valid data ends at `end`
    pub fn new(reader: R, path: &Path, end: u64) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            pos: 0,
            end,
            torn: false,
            done: false,
        }
    }

    /// Offset just past the last complete record seen so far
    pub fn valid_len(&self) -> u64 {
        self.pos
    }

    /// Whether the scan stopped at a partially written record
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    /// Bytes after the last complete record
    pub fn discarded_bytes(&self) -> u64 {
        self.end - self.pos
    }

    fn next_location(&mut self) -> Result<Option<RecordLocation>> {
        let remaining = self.end - self.pos;
        if remaining == 0 {
            return Ok(None);
        }

        let key_len = match self.read_len(remaining)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if remaining < 2 * LEN_PREFIX_SIZE + key_len {
            return Ok(self.stop_torn());
        }

        let mut key = vec![0u8; key_len as usize];
        if !self.fill(&mut key)? {
            return Ok(None);
        }
        let key = String::from_utf8(key)
            .map_err(|_| KvError::corrupt(&self.path, self.pos, "key is not valid UTF-8"))?;

        let value_len = match self.read_len(remaining - LEN_PREFIX_SIZE - key_len)? {
            Some(len) => len,
            None => return Ok(None),
        };
        let len = 2 * LEN_PREFIX_SIZE + key_len + value_len;
        if remaining < len {
            return Ok(self.stop_torn());
        }

        let skipped = io::copy(&mut (&mut self.reader).take(value_len), &mut io::sink())?;
        if skipped < value_len {
            return Ok(self.stop_torn());
        }

        let location = RecordLocation {
            offset: self.pos,
            key,
            len,
        };
        self.pos += len;
        Ok(Some(location))
    }

    /// Read a length prefix, or mark the scan torn if fewer than 4 bytes remain
    fn read_len(&mut self, remaining: u64) -> Result<Option<u64>> {
        if remaining < LEN_PREFIX_SIZE {
            return Ok(self.stop_torn());
        }
        let mut buf = [0u8; LEN_PREFIX_SIZE as usize];
        if !self.fill(&mut buf)? {
            return Ok(None);
        }
        Ok(Some(u32::from_le_bytes(buf) as u64))
    }

    /// read_exact that treats an early EOF as a torn record
    fn fill(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.torn = true;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn stop_torn<T>(&mut self) -> Option<T> {
        self.torn = true;
        None
    }
}

impl<R: Read> Iterator for RecordScanner<R> {
    type Item = Result<RecordLocation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_location() {
            Ok(Some(location)) => Some(Ok(location)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
