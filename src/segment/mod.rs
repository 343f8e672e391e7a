//! Segment Module
//!
//! Append-only log files, each with an in-memory hash index.
//!
//! ## Responsibilities
//! - Encode/decode length-prefixed records
//! - Append records and index each key at its latest offset
//! - Rebuild the index by replaying the log on startup
//! - Tolerate a torn trailing record left by a crash
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Record 1                                         │
//! │ ┌────────────┬───────┬──────────────┬─────────┐ │
//! │ │KeyLen (4)  │  Key  │ ValueLen (4) │  Value  │ │
//! │ └────────────┴───────┴──────────────┴─────────┘ │
//! ├──────────────────────────────────────────────────┤
//! │ Record 2                                         │
//! │ ... repeated until EOF, no header or footer ...  │
//! └──────────────────────────────────────────────────┘
//! ```
//! Lengths are little-endian `u32`. Keys and values are UTF-8.
//!
//! ## Naming
//! Files are named `segment<N>`, `N` increasing with creation order. The
//! merge artifact lives at `segment-merged.tmp` until it is renamed over
//! the oldest merged segment.

mod iterator;
mod log;
mod record;

use std::path::{Path, PathBuf};

pub use iterator::{RecordLocation, RecordScanner};
pub use log::Segment;
pub use record::Record;

/// Prefix shared by every segment file name
pub const SEGMENT_PREFIX: &str = "segment";

/// File name of an in-progress merge
pub const MERGE_TMP_NAME: &str = "segment-merged.tmp";

/// Size of each length prefix in a record frame
pub const LEN_PREFIX_SIZE: u64 = 4;

/// Path of the segment with sequence number `id` inside `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{}", SEGMENT_PREFIX, id))
}

/// Parse the sequence number from a segment path
/// "segment42" → Some(42), "segment-merged.tmp" → None
///
/// Only the canonical spelling [`segment_path`] produces is accepted, so
/// "segment007" is not a segment and no two files share an id.
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix(SEGMENT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}
