//! Merge Engine
//!
//! Folds every sealed segment into one, keeping each key's newest value.
//!
//! ## Protocol
//! 1. Write the merged records to `segment-merged.tmp`
//! 2. fsync it
//! 3. Rename it over the oldest mergee (atomic on the same filesystem)
//! 4. Swap the store prefix for the merged segment
//! 5. Delete the remaining mergee files, oldest first
//!
//! Any failure before step 3 deletes the temp file and leaves the store
//! untouched. If the rename fails the temp file is deleted and the store
//! is untouched as well. If a deletion in step 5 fails, that mergee and
//! every newer one stay in the store; they shadow the merged segment with
//! the same values it holds, so lookups stay correct across a restart.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::config::SyncStrategy;
use crate::error::{KvError, Result};
use crate::segment::{Segment, MERGE_TMP_NAME};

use super::SegmentStore;

/// Summary of a completed merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Number of sealed segments folded together
    pub mergees: usize,
    /// Distinct keys written to the merged segment
    pub keys: usize,
    /// Bytes held by the mergees before the merge
    pub bytes_before: u64,
    /// Size of the merged segment
    pub bytes_after: u64,
}

impl SegmentStore {
    /// Merge all segments except the tail
    ///
    /// Returns `Ok(None)` when there are fewer than two sealed segments.
    pub fn merge(&mut self) -> Result<Option<MergeOutcome>> {
        self.ensure_open()?;

        let count = self.segments.len() - 1;
        if count < 2 {
            return Ok(None);
        }

        let mergees = &self.segments[..count];
        let oldest_id = mergees[0].id();
        let oldest_path = mergees[0].path().to_path_buf();
        let bytes_before: u64 = mergees.iter().map(|s| s.write_offset()).sum();
        let tmp_path = self.dir.join(MERGE_TMP_NAME);

        tracing::info!(
            "Merging {} segments (segment{}..=segment{}, {} bytes)",
            count,
            oldest_id,
            mergees[count - 1].id(),
            bytes_before
        );

        // Step 1-2: build the merged file
        let mut merged = match build_merged(mergees, &tmp_path, oldest_id) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::error!("Merge aborted while writing {}: {}", tmp_path.display(), e);
                discard(&tmp_path);
                return Err(e);
            }
        };
        let keys = merged.key_count();
        let bytes_after = merged.write_offset();

        // Step 3: atomic replace of the oldest mergee
        if let Err(e) = fs::rename(&tmp_path, &oldest_path) {
            tracing::error!(
                "Merge aborted: rename {} → {} failed: {}",
                tmp_path.display(),
                oldest_path.display(),
                e
            );
            drop(merged);
            discard(&tmp_path);
            return Err(e.into());
        }
        sync_dir(&self.dir);

        if let Err(e) = merged.relocate(&oldest_path) {
            // The old handle still reads the replaced file, and the disk
            // state is valid, so keep the pre-merge list.
            tracing::error!("Merged segment written but could not be reopened: {}", e);
            return Err(e);
        }

        // Step 4: swap the prefix
        let mut retired: Vec<Segment> = self.segments.drain(..count).collect();
        let mut replaced = retired.remove(0);
        if let Err(e) = replaced.close() {
            tracing::warn!("Error closing replaced segment{}: {}", replaced.id(), e);
        }

        // Step 5: delete the other mergees, oldest first
        let mut kept = Vec::new();
        let mut failure = None;
        for mut segment in retired {
            if failure.is_some() {
                kept.push(segment);
                continue;
            }
            if let Err(e) = retire(&mut segment) {
                tracing::error!(
                    "Failed to delete merged segment {}: {}",
                    segment.path().display(),
                    e
                );
                failure = Some(e);
                kept.push(segment);
            }
        }

        let kept_count = kept.len();
        self.segments.splice(0..0, std::iter::once(merged).chain(kept));
        sync_dir(&self.dir);

        if let Some(e) = failure {
            tracing::warn!(
                "Merge committed with {} undeleted mergee(s) still in the store",
                kept_count
            );
            return Err(e);
        }

        tracing::info!(
            "Merge complete: {} segments → segment{} ({} keys, {} → {} bytes)",
            count,
            oldest_id,
            keys,
            bytes_before,
            bytes_after
        );

        Ok(Some(MergeOutcome {
            mergees: count,
            keys,
            bytes_before,
            bytes_after,
        }))
    }
}

/// Write each key's newest value across `mergees` to a new segment at `tmp`
///
/// Mergees are visited newest → oldest; a key emitted once is never
/// written again, so the newest value wins without timestamps.
fn build_merged(mergees: &[Segment], tmp: &Path, id: u64) -> Result<Segment> {
    discard(tmp);
    // Sealing below fsyncs once; per-append syncs would be wasted work.
    let mut merged = Segment::create(tmp, id, SyncStrategy::Never)?;
    let mut emitted: HashSet<&str> = HashSet::new();

    for mergee in mergees.iter().rev() {
        if mergee.unparsed_bytes() > 0 {
            tracing::warn!(
                "Merging {}: {} unparsed bytes after offset {} are not carried over",
                mergee.path().display(),
                mergee.unparsed_bytes(),
                mergee.write_offset()
            );
        }
        for (key, offset) in mergee.keys_by_offset() {
            if !emitted.insert(key) {
                continue;
            }
            let value = mergee.lookup(key)?.ok_or_else(|| {
                KvError::corrupt(mergee.path(), offset, format!("indexed key {:?} vanished", key))
            })?;
            merged.append(key, &value)?;
        }
    }

    merged.seal()?;
    Ok(merged)
}

/// Delete a merged-away segment's file, then close it
///
/// Unlinking first means a failed delete leaves the segment's handles
/// untouched, so it can stay in the store as is.
fn retire(segment: &mut Segment) -> Result<()> {
    match fs::remove_file(segment.path()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("Merged segment {} was already gone", segment.path().display());
        }
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = segment.close() {
        tracing::warn!("Error closing deleted segment{}: {}", segment.id(), e);
    }
    tracing::debug!("Deleted merged segment {}", segment.path().display());
    Ok(())
}

/// Best-effort removal of the temp file
fn discard(tmp: &Path) {
    match fs::remove_file(tmp) {
        Ok(()) => tracing::debug!("Removed merge temp file {}", tmp.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove {}: {}", tmp.display(), e),
    }
}

/// Persist directory entries (renames, deletes). Not supported everywhere.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!("Directory sync skipped for {}: {}", dir.display(), e);
    }
}
