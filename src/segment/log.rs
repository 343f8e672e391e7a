//! Segment
//!
//! One append-only log file plus its in-memory key → offset index.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{KvError, Result};

use super::iterator::RecordScanner;
use super::record::Record;
use super::parse_segment_id;

/// An append-only log file with a hash index over its keys
///
/// ## Handles
/// - `writer`: present only while this segment is the tail
/// - `reader`: positioned reads for lookups; behind a Mutex so lookups
///   work through `&self` while the store is read-locked
///
/// ## Invariant
/// Every offset in `index` points at a complete frame below `write_offset`
/// whose key equals the index key, and it is the last such frame.
pub struct Segment {
    /// Sequence number (ordering authority)
    id: u64,
    /// Current file path
    path: PathBuf,
    /// Append handle, `None` once sealed
    writer: Option<File>,
    /// Lookup handle, `None` once closed
    reader: Mutex<Option<BufReader<File>>>,
    /// End of the last complete record
    write_offset: u64,
    /// Bytes after `write_offset` that replay could not parse
    unparsed_bytes: u64,
    /// key → offset of its last record in this file
    index: HashMap<String, u64>,
    /// fsync policy for appends
    sync_strategy: SyncStrategy,
    /// Appends since the last fsync
    writes_since_sync: usize,
}

impl Segment {
    /// Create a new, empty segment open for append
    ///
    /// Fails if a file already exists at `path`.
    pub fn create(path: &Path, id: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        let writer = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)?;
        let reader = File::open(path)?;

        tracing::debug!("Created segment {} at {}", id, path.display());

        Ok(Self {
            id,
            path: path.to_path_buf(),
            writer: Some(writer),
            reader: Mutex::new(Some(BufReader::new(reader))),
            write_offset: 0,
            unparsed_bytes: 0,
            index: HashMap::new(),
            sync_strategy,
            writes_since_sync: 0,
        })
    }

    /// Open an existing segment file (sealed) and rebuild its index
    ///
    /// Bytes replay cannot parse are dropped from the in-memory view only;
    /// the file keeps them. Such a segment cannot be resumed.
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let id = parse_segment_id(path)
            .ok_or_else(|| KvError::InvalidSegmentName(path.display().to_string()))?;

        let (index, write_offset) = Self::replay(path)?;
        let reader = File::open(path)?;
        let on_disk = reader.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            writer: None,
            reader: Mutex::new(Some(BufReader::new(reader))),
            write_offset,
            unparsed_bytes: on_disk.saturating_sub(write_offset),
            index,
            sync_strategy,
            writes_since_sync: 0,
        })
    }

    /// Rebuild an index by reading every record from offset 0
    ///
    /// Later records overwrite earlier ones. Returns the index and the
    /// offset just past the last complete record.
    pub fn replay(path: &Path) -> Result<(HashMap<String, u64>, u64)> {
        let mut scanner = RecordScanner::open(path)?;
        let mut index = HashMap::new();
        let mut records = 0u64;

        for location in scanner.by_ref() {
            let location = location?;
            index.insert(location.key, location.offset);
            records += 1;
        }

        if scanner.is_torn() {
            tracing::warn!(
                "Segment {}: ignoring {} bytes of torn trailing record at offset {}",
                path.display(),
                scanner.discarded_bytes(),
                scanner.valid_len()
            );
        }

        tracing::debug!(
            "Replayed {}: {} records, {} keys, {} bytes",
            path.display(),
            records,
            index.len(),
            scanner.valid_len()
        );

        Ok((index, scanner.valid_len()))
    }

    /// Reopen a recovered segment for append so it can serve as the tail
    ///
    /// Refused when the file holds bytes past the last parsed record: new
    /// frames must start exactly at `write_offset`, and those bytes are
    /// never cut off.
    pub fn resume(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        if self.unparsed_bytes > 0 {
            return Err(KvError::corrupt(
                &self.path,
                self.write_offset,
                format!("{} unparsed bytes after the last record", self.unparsed_bytes),
            ));
        }

        let writer = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Append a record, returning its offset
    ///
    /// The index only changes after the frame is fully written (and synced,
    /// if the strategy asks for it). On failure the file is cut back to the
    /// previous end so no torn frame sits in front of later appends.
    pub fn append(&mut self, key: &str, value: &str) -> Result<u64> {
        let frame = Record::encode(key, value)?;
        let offset = self.write_offset;
        let sync_due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.writes_since_sync + 1 >= count,
            SyncStrategy::Never => false,
        };

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| KvError::SegmentSealed(self.path.clone()))?;

        let written = writer
            .write_all(&frame)
            .and_then(|_| if sync_due { writer.sync_data() } else { Ok(()) });

        if let Err(e) = written {
            if let Err(rollback) = writer.set_len(offset) {
                tracing::error!(
                    "Failed to roll back {} to {} bytes, sealing it: {}",
                    self.path.display(),
                    offset,
                    rollback
                );
                // The file end is unknown now; no further appends here.
                self.writer = None;
            }
            return Err(e.into());
        }

        self.writes_since_sync = if sync_due { 0 } else { self.writes_since_sync + 1 };
        self.write_offset += frame.len() as u64;
        self.index.insert(key.to_string(), offset);

        Ok(offset)
    }

    /// Look up the latest value for `key` in this segment
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key indexed here
    /// - `Ok(None)`: key not in this segment
    /// - `Err(CorruptRecord)`: the indexed frame cannot be parsed
    pub fn lookup(&self, key: &str) -> Result<Option<String>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(KvError::AlreadyClosed)?;

        reader.seek(SeekFrom::Start(offset))?;
        let record = Record::decode_at(reader, &self.path, offset, self.write_offset)?;

        if record.key != key {
            return Err(KvError::corrupt(
                &self.path,
                offset,
                format!("expected key {:?}, found {:?}", key, record.key),
            ));
        }

        Ok(Some(record.value))
    }

    /// Flush and fsync, then release the append handle
    pub fn seal(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.sync_all()?;
            tracing::debug!(
                "Sealed segment {} at {} bytes",
                self.id,
                self.write_offset
            );
        }
        Ok(())
    }

    /// Seal and release every handle
    pub fn close(&mut self) -> Result<()> {
        let sealed = self.seal();
        self.reader.lock().take();
        sealed
    }

    /// Point the lookup handle at `path` after the file was renamed there
    pub fn relocate(&mut self, path: &Path) -> Result<()> {
        let id = parse_segment_id(path)
            .ok_or_else(|| KvError::InvalidSegmentName(path.display().to_string()))?;
        let reader = File::open(path)?;

        *self.reader.lock() = Some(BufReader::new(reader));
        self.path = path.to_path_buf();
        self.id = id;
        Ok(())
    }

    /// Verify the file name is a well-formed `segment<N>` and return `N`
    pub fn check_health(&self) -> Result<u64> {
        match parse_segment_id(&self.path) {
            Some(id) if id == self.id => Ok(id),
            _ => Err(KvError::InvalidSegmentName(format!(
                "segment {} is corrupted: unexpected file name {}",
                self.id,
                self.path.display()
            ))),
        }
    }

    /// Keys ordered by the offset of their latest record
    pub fn keys_by_offset(&self) -> Vec<(&str, u64)> {
        let mut keys: Vec<(&str, u64)> = self
            .index
            .iter()
            .map(|(key, &offset)| (key.as_str(), offset))
            .collect();
        keys.sort_unstable_by_key(|&(_, offset)| offset);
        keys
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of complete records in this segment
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    /// Number of distinct keys indexed
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    /// Bytes after the last complete record that replay skipped
    pub fn unparsed_bytes(&self) -> u64 {
        self.unparsed_bytes
    }

    /// True once the append handle is released
    pub fn is_sealed(&self) -> bool {
        self.writer.is_none()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("write_offset", &self.write_offset)
            .field("keys", &self.index.len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
