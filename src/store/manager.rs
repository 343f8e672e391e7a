//! Segment Store
//!
//! Owns the ordered list of segments and their lifecycle.
//!
//! ## Responsibilities
//! - Discover existing segment files on startup and replay them
//! - Search segments newest → oldest for reads
//! - Append to the tail and rotate it when it grows too large
//! - Close every segment exactly once on shutdown

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::SyncStrategy;
use crate::error::{KvError, Result};
use crate::segment::{parse_segment_id, segment_path, Segment, MERGE_TMP_NAME};

/// Ordered segments, oldest first; the last one is the tail
///
/// ## Concurrency:
/// The store itself is not synchronized. The engine wraps it in a
/// `parking_lot::RwLock`: lookups take the shared side, the writer thread
/// takes the exclusive side for append, rotate and merge.
pub struct SegmentStore {
    /// Directory holding the segment files
    pub(super) dir: PathBuf,

    /// Segments ordered oldest → newest, never empty while open
    pub(super) segments: Vec<Segment>,

    /// fsync policy handed to every new tail
    pub(super) sync_strategy: SyncStrategy,

    /// Set once by `close`
    closed: bool,
}

/// Point-in-time description of one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub id: u64,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub keys: usize,
    pub sealed: bool,
}

impl SegmentStore {
    /// Open or create the store in `dir`
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Delete a leftover merge temp file (never authoritative)
    /// 3. Discover `segment<N>` files and sort them by `N`
    /// 4. Replay each into its index
    /// 5. Reopen the newest for append, or create `segment0` if none exist.
    ///    A newest segment with unparsed trailing bytes stays sealed and a
    ///    new tail is created after it.
    pub fn open(dir: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let stale = dir.join(MERGE_TMP_NAME);
        match fs::remove_file(&stale) {
            Ok(()) => tracing::warn!("Removed stale merge file {}", stale.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove stale merge file {}: {}", stale.display(), e),
        }

        let mut ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match parse_segment_id(&path) {
                Some(id) => ids.push(id),
                None => tracing::debug!("Ignoring non-segment file {}", path.display()),
            }
        }
        ids.sort_unstable();

        let mut segments = Vec::with_capacity(ids.len().max(1));
        for id in &ids {
            segments.push(Segment::open(&segment_path(dir, *id), sync_strategy)?);
        }

        let fresh_tail = match segments.last_mut() {
            Some(tail) if tail.unparsed_bytes() > 0 => {
                // Leave the damaged bytes on disk and append to a new file.
                tracing::warn!(
                    "Segment {} has {} unparsed bytes at offset {}; keeping it sealed",
                    tail.path().display(),
                    tail.unparsed_bytes(),
                    tail.write_offset()
                );
                Some(tail.id() + 1)
            }
            Some(tail) => {
                tail.resume()?;
                None
            }
            None => Some(0),
        };
        if let Some(id) = fresh_tail {
            segments.push(Segment::create(&segment_path(dir, id), id, sync_strategy)?);
        }

        tracing::info!(
            "Opened segment store at {}: {} segment(s), tail = segment{}",
            dir.display(),
            segments.len(),
            segments.last().map(|s| s.id()).unwrap_or(0)
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            sync_strategy,
            closed: false,
        })
    }

    /// Get a value by key (searches all segments newest → oldest)
    ///
    /// Returns the first hit; older segments are not consulted once a
    /// newer one has the key.
    pub fn get(&self, key: &str) -> Result<String> {
        self.ensure_open()?;

        for segment in self.segments.iter().rev() {
            if let Some(value) = segment.lookup(key)? {
                return Ok(value);
            }
        }

        Err(KvError::NotFound)
    }

    /// Append a record to the tail, returning its offset
    pub fn append(&mut self, key: &str, value: &str) -> Result<u64> {
        self.ensure_open()?;
        self.tail_mut().append(key, value)
    }

    /// Seal the tail and start a new one
    ///
    /// The tail's file name is checked first; the new tail gets the next
    /// sequence number. Returns the new tail's id.
    pub fn rotate(&mut self) -> Result<u64> {
        self.ensure_open()?;

        let current = self.tail().check_health()?;
        let next = current + 1;
        let tail = Segment::create(&segment_path(&self.dir, next), next, self.sync_strategy)?;

        let sealed = self.tail_mut().seal();
        self.segments.push(tail);

        tracing::info!(
            "Rotated tail segment{} → segment{} ({} segments)",
            current,
            next,
            self.segments.len()
        );

        sealed.map(|_| next)
    }

    /// Close every segment; a second call fails
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        let mut first_err = None;
        for segment in &mut self.segments {
            if let Err(e) = segment.close() {
                tracing::error!("Failed to close segment {}: {}", segment.id(), e);
                first_err.get_or_insert(e);
            }
        }

        tracing::info!("Closed segment store at {}", self.dir.display());

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The segment currently open for append
    pub fn tail(&self) -> &Segment {
        // Never empty: open() guarantees a tail and merge keeps it.
        &self.segments[self.segments.len() - 1]
    }

    fn tail_mut(&mut self) -> &mut Segment {
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// Segments ordered oldest → newest
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments, tail included
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Sequence numbers, oldest → newest
    pub fn segment_ids(&self) -> Vec<u64> {
        self.segments.iter().map(|s| s.id()).collect()
    }

    /// Total bytes of complete records across all segments
    pub fn total_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.write_offset()).sum()
    }

    pub fn segment_info(&self) -> Vec<SegmentInfo> {
        self.segments
            .iter()
            .map(|s| SegmentInfo {
                id: s.id(),
                path: s.path().to_path_buf(),
                size_bytes: s.write_offset(),
                keys: s.key_count(),
                sealed: s.is_sealed(),
            })
            .collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(super) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(KvError::AlreadyClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for SegmentStore {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                tracing::warn!("Error closing segment store on drop: {}", e);
            }
        }
    }
}
