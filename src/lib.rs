//! # segkv
//!
//! A log-structured, append-only key-value storage engine with:
//! - Hash-indexed, append-only segment files
//! - Crash recovery by log replay, tolerating torn trailing writes
//! - Single-writer/multi-reader concurrency model
//! - Atomic merge (compaction) of sealed segments
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │              put / get / compact / close                    │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌─────────────────────────┐    ┌─────────────────────────┐
//!   │    Write Serializer     │    │        Read Gate        │
//!   │ (one thread, FIFO,      │    │ (bounded slots, shared  │
//!   │  exclusive lock)        │    │  lock)                  │
//!   └────────────┬────────────┘    └────────────┬────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │                    Segment Store                        │
//!   │   segment0 … segmentN-1 (sealed)   segmentN (tail)      │
//!   │              ▲                                          │
//!   │              └── Merge: sealed → one segment            │
//!   └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use segkv::Engine;
//!
//! # fn main() -> segkv::Result<()> {
//! let engine = Engine::open_with("./data", 10 * 1024 * 1024, 8)?;
//! engine.put("band", "reallygreat")?;
//! assert_eq!(engine.get("band")?, "reallygreat");
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod segment;
pub mod store;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::{Engine, EngineStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of segkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
