//! Engine Module
//!
//! The storage engine that coordinates the segment store, the writer
//! thread and the read gate.
//!
//! ## Responsibilities
//! - Recover the segment store on startup
//! - Route writes through the single writer thread
//! - Admit a bounded number of concurrent lookups
//! - Shut down exactly once

mod gate;
mod writer;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::store::{MergeOutcome, SegmentInfo, SegmentStore};

pub use gate::{ReadGate, ReadPermit};
use writer::{WritePolicy, WriteSerializer};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/compact): queued to one writer thread
///   - Applied strictly in submission order
///   - Writer holds the store's exclusive lock for append → rotate → merge
///
/// - **Reads** (get): run on the caller's thread
///   - Admitted by `gate` (at most `max_concurrent_readers` at once)
///   - Hold the store's shared lock while scanning segments
///
/// A put that returned `Ok` is visible to every get issued after it.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Segments, shared with the writer thread
    store: Arc<RwLock<SegmentStore>>,

    /// Bounds concurrent lookups
    gate: ReadGate,

    /// Single mutation path
    writer: WriteSerializer,

    /// Completed merges, bumped by the writer thread
    merges: Arc<AtomicU64>,

    /// Set by the first `close`
    closed: AtomicBool,
}

/// Snapshot of engine state
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub segment_count: usize,
    pub tail_id: u64,
    pub total_bytes: u64,
    pub merges_completed: u64,
    pub in_flight_reads: usize,
    pub max_concurrent_readers: usize,
    pub segments: Vec<SegmentInfo>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Recover (or create) the segment store
    /// 3. Start the writer thread
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = SegmentStore::open(&config.data_dir, config.sync_strategy)?;
        let store = Arc::new(RwLock::new(store));
        let merges = Arc::new(AtomicU64::new(0));

        let policy = WritePolicy {
            segment_size_threshold: config.segment_size_threshold,
            merge_threshold: config.merge_threshold,
        };
        let writer = WriteSerializer::spawn(Arc::clone(&store), policy, Arc::clone(&merges))?;

        tracing::info!(
            "Engine ready at {} (segment threshold {} bytes, {} reader slots)",
            config.data_dir.display(),
            config.segment_size_threshold,
            config.max_concurrent_readers
        );

        Ok(Self {
            gate: ReadGate::new(config.max_concurrent_readers),
            config,
            store,
            writer,
            merges,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a directory, tail size threshold and reader limit
    ///
    /// Uses defaults for everything else.
    pub fn open_with(
        dir: impl AsRef<Path>,
        segment_size_threshold: u64,
        max_concurrent_readers: usize,
    ) -> Result<Self> {
        let config = Config::builder()
            .data_dir(dir.as_ref())
            .segment_size_threshold(segment_size_threshold)
            .max_concurrent_readers(max_concurrent_readers)
            .build();
        Self::open(config)
    }

    /// Store a value
    ///
    /// Blocks until the record is appended and any rotation or merge it
    /// triggers has finished. A rotation or merge error is returned here,
    /// but the record itself is already durable.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_open()?;
        self.writer.put(key, value)
    }

    /// Get the latest value for `key`
    ///
    /// Search order: tail first, then sealed segments newest → oldest.
    /// Returns `KvError::NotFound` if no segment has the key.
    pub fn get(&self, key: &str) -> Result<String> {
        self.ensure_open()?;

        let _permit = self.gate.acquire();
        let store = self.store.read();

        let result = store.get(key);
        if let Err(KvError::NotFound) = result {
            tracing::debug!("Key {:?} not found", key);
        }
        result
    }

    /// Merge all sealed segments now, regardless of segment count
    ///
    /// Returns `Ok(None)` when fewer than two sealed segments exist.
    pub fn compact(&self) -> Result<Option<MergeOutcome>> {
        self.ensure_open()?;
        self.writer.compact()
    }

    /// Close the engine
    ///
    /// Stops accepting writes, lets the writer finish what is queued,
    /// waits for in-flight lookups and closes every segment. A second
    /// call returns `AlreadyClosed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(KvError::AlreadyClosed);
        }

        tracing::info!("Closing engine at {}", self.config.data_dir.display());

        let drained = self.writer.shutdown();
        let closed = self.store.write().close();
        drained.and(closed)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Snapshot of segments and counters
    pub fn stats(&self) -> Result<EngineStats> {
        self.ensure_open()?;
        let store = self.store.read();
        Ok(EngineStats {
            segment_count: store.segment_count(),
            tail_id: store.tail().id(),
            total_bytes: store.total_bytes(),
            merges_completed: self.merges.load(Ordering::Relaxed),
            in_flight_reads: self.gate.in_flight(),
            max_concurrent_readers: self.gate.capacity(),
            segments: store.segment_info(),
        })
    }

    /// Get the number of segments (tail included)
    pub fn segment_count(&self) -> usize {
        self.store.read().segment_count()
    }

    /// Segment sequence numbers, oldest → newest
    pub fn segment_ids(&self) -> Vec<u64> {
        self.store.read().segment_ids()
    }

    /// Lookups currently admitted
    pub fn in_flight_reads(&self) -> usize {
        self.gate.in_flight()
    }

    /// Highest number of lookups ever admitted at once
    pub fn peak_concurrent_reads(&self) -> usize {
        self.gate.peak()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(KvError::AlreadyClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                tracing::warn!("Error closing engine on drop: {}", e);
            }
        }
    }
}
