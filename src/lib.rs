//! # Strata
//!
//! Block and object storage substrate for an embedded triple store:
//! - Fixed-size block sources (memory, mapped file, cached direct file)
//! - Append-only object log with write-behind buffering and two-phase writes
//! - String codec with URI prefix abbreviation
//! - Reentrant multi-reader/single-writer access lock
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          B+Tree / node table / bulk loader (callers)         │
//! │                  hold AccessLock per operation               │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!                 ▼                             ▼
//!   ┌──────────────────────────┐     ┌──────────────────────────┐
//!   │       BlockSource        │     │   StringFile (codec)     │
//!   │  Sync → Caching → Direct │     └────────────┬─────────────┘
//!   │        or Mapped/Memory  │                  ▼
//!   └────────────┬─────────────┘     ┌──────────────────────────┐
//!                │                   │  ObjectFile (+ buffer)   │
//!                │                   └────────────┬─────────────┘
//!                ▼                                ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │           Files (block file / object file)                │
//!   └──────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod channel;
pub mod block;
pub mod object;
pub mod strings;
pub mod lock;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StrataError};
pub use config::{ByteOrder, FileMode, StoreConfig};
pub use block::{Block, BlockSource};
pub use object::{AllocatedWrite, ObjectFile};
pub use strings::StringFile;
pub use lock::{AccessLock, LockMode};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Strata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
