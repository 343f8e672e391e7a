//! Write Serializer
//!
//! A dedicated thread that owns every mutation of the segment store.
//!
//! Requests arrive over a crossbeam channel and are applied one at a time
//! in submission order. Each request carries its own reply channel; the
//! submitting thread blocks on it until the write (and any rotation or
//! merge it triggers) is done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{KvError, Result};
use crate::store::{MergeOutcome, SegmentStore};

/// Requests handled by the writer thread
enum WriteCommand {
    Put {
        key: String,
        value: String,
        reply: Sender<Result<()>>,
    },
    Compact {
        reply: Sender<Result<Option<MergeOutcome>>>,
    },
    Shutdown,
}

/// Thresholds the writer applies after each append
#[derive(Debug, Clone, Copy)]
pub(crate) struct WritePolicy {
    /// Rotate once the tail reaches this many bytes
    pub segment_size_threshold: u64,
    /// Merge once a rotation leaves more segments than this
    pub merge_threshold: usize,
}

/// Handle to the writer thread
pub(crate) struct WriteSerializer {
    sender: Sender<WriteCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriteSerializer {
    /// Start the writer thread
    pub fn spawn(
        store: Arc<RwLock<SegmentStore>>,
        policy: WritePolicy,
        merges: Arc<AtomicU64>,
    ) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();

        let handle = thread::Builder::new()
            .name("segkv-writer".to_string())
            .spawn(move || run(receiver, store, policy, merges))
            .map_err(|e| KvError::WriterUnavailable(format!("failed to spawn: {}", e)))?;

        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a put and wait for its outcome
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let (reply, outcome) = channel::bounded(1);
        self.sender
            .send(WriteCommand::Put {
                key: key.to_string(),
                value: value.to_string(),
                reply,
            })
            .map_err(|_| KvError::AlreadyClosed)?;

        // A dropped reply means the writer shut down before reaching us.
        outcome.recv().map_err(|_| KvError::AlreadyClosed)?
    }

    /// Queue a merge of all sealed segments and wait for it
    pub fn compact(&self) -> Result<Option<MergeOutcome>> {
        let (reply, outcome) = channel::bounded(1);
        self.sender
            .send(WriteCommand::Compact { reply })
            .map_err(|_| KvError::AlreadyClosed)?;
        outcome.recv().map_err(|_| KvError::AlreadyClosed)?
    }

    /// Stop the writer after it drains requests already queued
    pub fn shutdown(&self) -> Result<()> {
        let handle = match self.handle.lock().take() {
            Some(handle) => handle,
            None => return Err(KvError::AlreadyClosed),
        };

        // The thread only exits after receiving Shutdown, so send cannot fail
        // unless it died; join reports that case.
        let _ = self.sender.send(WriteCommand::Shutdown);

        handle
            .join()
            .map_err(|_| KvError::WriterUnavailable("writer thread panicked".to_string()))
    }
}

/// Writer thread body: apply commands in arrival order until Shutdown
fn run(
    receiver: Receiver<WriteCommand>,
    store: Arc<RwLock<SegmentStore>>,
    policy: WritePolicy,
    merges: Arc<AtomicU64>,
) {
    tracing::debug!("Writer thread started");

    for command in receiver.iter() {
        match command {
            WriteCommand::Put { key, value, reply } => {
                let result = apply_put(&store, &key, &value, policy, &merges);
                if let Err(ref e) = result {
                    tracing::warn!("Put {:?} failed: {}", key, e);
                }
                let _ = reply.send(result);
            }
            WriteCommand::Compact { reply } => {
                let result = store.write().merge();
                if let Ok(Some(_)) = result {
                    merges.fetch_add(1, Ordering::Relaxed);
                }
                let _ = reply.send(result);
            }
            WriteCommand::Shutdown => break,
        }
    }

    tracing::debug!("Writer thread stopped");
}

/// Append, then rotate and merge if thresholds are crossed
///
/// The record stays durable even if rotation or merge fails afterwards.
fn apply_put(
    store: &RwLock<SegmentStore>,
    key: &str,
    value: &str,
    policy: WritePolicy,
    merges: &AtomicU64,
) -> Result<()> {
    let mut store = store.write();

    let offset = store.append(key, value)?;
    tracing::trace!("Appended {:?} at offset {}", key, offset);

    if store.tail().write_offset() < policy.segment_size_threshold {
        return Ok(());
    }

    store.rotate()?;

    if store.segment_count() > policy.merge_threshold && store.merge()?.is_some() {
        merges.fetch_add(1, Ordering::Relaxed);
    }

    Ok(())
}
