//! Store Module
//!
//! The ordered set of segments that together hold the database.
//!
//! ## Responsibilities
//! - Recover every segment from disk on startup
//! - Newest-wins lookups across segments
//! - Tail rotation when the size threshold is crossed
//! - Merging sealed segments to reclaim space
//!
//! ## Layout
//! ```text
//!   oldest                                     newest
//! ┌──────────┬──────────┬──────────┬─────────────────┐
//! │ segment0 │ segment3 │ segment4 │ segment5 (tail) │
//! │ (merged) │ (sealed) │ (sealed) │   (appending)   │
//! └──────────┴──────────┴──────────┴─────────────────┘
//!        ◄──────────── lookups scan this way ───────
//! ```

mod manager;
mod merge;

pub use manager::{SegmentInfo, SegmentStore};
pub use merge::MergeOutcome;
