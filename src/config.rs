//! Configuration for segkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for a segkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segment0             (oldest, possibly a merge result)
    ///     ├── segment1
    ///     ├── segmentN             (tail, open for append)
    ///     └── segment-merged.tmp   (only while a merge is in progress)
    pub data_dir: PathBuf,

    /// Tail size (in bytes) at which the tail is sealed and a new one created
    pub segment_size_threshold: u64,

    /// Segment count above which a rotation triggers a merge
    pub merge_threshold: usize,

    /// fsync policy for appends
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Max lookups allowed to run at once
    pub max_concurrent_readers: usize,
}

/// Append sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N appends (balanced durability/performance)
    EveryNWrites { count: usize },

    /// Leave flushing to the OS; segments are still fsync'd when sealed
    Never,
}

/// Default tail size threshold: 10 MiB
pub const DEFAULT_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of segments tolerated before a merge
pub const DEFAULT_MERGE_THRESHOLD: usize = 3;

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./segkv_data"),
            segment_size_threshold: DEFAULT_SEGMENT_SIZE,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            sync_strategy: SyncStrategy::EveryNWrites { count: 100 },
            max_concurrent_readers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.segment_size_threshold == 0 {
            return Err(KvError::Config(
                "segment_size_threshold must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_readers == 0 {
            return Err(KvError::Config(
                "max_concurrent_readers must be greater than 0".to_string(),
            ));
        }
        if self.merge_threshold < 2 {
            return Err(KvError::Config(format!(
                "merge_threshold must be at least 2, got {}",
                self.merge_threshold
            )));
        }
        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(KvError::Config(
                "EveryNWrites count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the tail rotation threshold (in bytes)
    pub fn segment_size_threshold(mut self, bytes: u64) -> Self {
        self.config.segment_size_threshold = bytes;
        self
    }

    /// Set the segment count that triggers a merge once exceeded
    pub fn merge_threshold(mut self, count: usize) -> Self {
        self.config.merge_threshold = count;
        self
    }

    /// Set the append sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the maximum number of concurrent lookups
    pub fn max_concurrent_readers(mut self, count: usize) -> Self {
        self.config.max_concurrent_readers = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
