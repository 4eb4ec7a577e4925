//! Block Module
//!
//! Fixed-size block storage with interchangeable backing strategies.
//!
//! ## Responsibilities
//! - Hand out monotonically increasing block ids
//! - Fetch and store whole blocks by id
//! - Keep released ids for reuse
//! - Push dirty state to durable storage on `sync`/`close`
//!
//! ## Composition
//! ```text
//!   SynchronizingBlockSource      (mutex, shared handle)
//!            │
//!   LoggingBlockSource / ReadOnlyBlockSource   (optional decorators)
//!            │
//!   CachingBlockSource            (LRU read cache + dirty write cache)
//!            │
//!   ┌────────┴───────────┬──────────────────────┐
//!   ▼                    ▼                      ▼
//! MemoryBlockSource  DirectFileBlockSource  MappedFileBlockSource
//! ```
//!
//! ## File Format
//! A block file is the raw concatenation of blocks, no header:
//! block `id` lives at byte offset `id * block_size`.

mod caching;
mod direct;
mod factory;
mod logging;
mod mapped;
mod memory;
mod meta;
mod readonly;
mod synchronizing;

use std::collections::HashSet;

use bytes::{Bytes, BytesMut};

use crate::config::ByteOrder;
use crate::error::{Result, StrataError};

pub use caching::{CacheStats, CachingBlockSource};
pub use direct::DirectFileBlockSource;
pub use factory::{open_block_file, open_memory};
pub use logging::LoggingBlockSource;
pub use mapped::MappedFileBlockSource;
pub use memory::MemoryBlockSource;
pub use meta::{BlockFileMeta, META_EXTENSION};
pub use readonly::ReadOnlyBlockSource;
pub use synchronizing::SynchronizingBlockSource;

// =============================================================================
// Block
// =============================================================================

/// A block id plus its fixed-size bytes
///
/// Blocks handed out by a source are private copies: mutating one has no
/// effect on storage until it is passed back through `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: u64,
    data: BytesMut,
    byte_order: ByteOrder,
}

impl Block {
    pub fn new(id: u64, data: BytesMut, byte_order: ByteOrder) -> Self {
        Self {
            id,
            data,
            byte_order,
        }
    }

    /// A zero-filled block of `size` bytes
    pub fn zeroed(id: u64, size: usize, byte_order: ByteOrder) -> Self {
        Self::new(id, BytesMut::zeroed(size), byte_order)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read a u32 at `offset` in the block's declared byte order
    ///
    /// # Panics
    /// If `offset + 4` exceeds the block length.
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[offset..offset + 4]);
        match self.byte_order {
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
        }
    }

    /// Write a u32 at `offset` in the block's declared byte order
    ///
    /// # Panics
    /// If `offset + 4` exceeds the block length.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        let raw = match self.byte_order {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        self.data[offset..offset + 4].copy_from_slice(&raw);
    }

    /// Read a u64 at `offset` in the block's declared byte order
    ///
    /// # Panics
    /// If `offset + 8` exceeds the block length.
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[offset..offset + 8]);
        match self.byte_order {
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
        }
    }

    /// Write a u64 at `offset` in the block's declared byte order
    ///
    /// # Panics
    /// If `offset + 8` exceeds the block length.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        let raw = match self.byte_order {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        self.data[offset..offset + 8].copy_from_slice(&raw);
    }

    /// Consume the block, keeping only its bytes
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }
}

// =============================================================================
// BlockSource
// =============================================================================

/// Uniform contract for fixed-size block storage
///
/// Ids start at 0 and grow by one per allocation. `get` may log, `get_silent`
/// never does. All methods fail with `Protocol` once the source is closed.
pub trait BlockSource: Send {
    /// Bytes per block
    fn block_size(&self) -> usize;

    /// Byte order every stored block must declare
    fn byte_order(&self) -> ByteOrder;

    /// Number of ids handed out so far (the current extent)
    fn block_count(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    /// True if `id` is inside the current extent
    fn valid(&self, id: u64) -> bool {
        id < self.block_count()
    }

    /// Reserve a new id (reusing a released one if available)
    fn allocate_id(&mut self) -> Result<u64>;

    /// A writable, zero-initialised block for a freshly allocated id
    fn allocate_buffer(&mut self, id: u64) -> Result<Block>;

    /// Fetch a block
    fn get(&mut self, id: u64) -> Result<Block>;

    /// Fetch a block without logging
    fn get_silent(&mut self, id: u64) -> Result<Block>;

    /// Store or overwrite the block at `id`
    fn put(&mut self, id: u64, block: &Block) -> Result<()>;

    /// Return an id for reuse
    fn release(&mut self, id: u64) -> Result<()>;

    /// Push dirty state to the durable backing
    fn sync(&mut self, force: bool) -> Result<()>;

    /// Flush and release resources
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Human-readable name used in logs and errors
    fn label(&self) -> &str;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn byte_order(&self) -> ByteOrder {
        (**self).byte_order()
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn valid(&self, id: u64) -> bool {
        (**self).valid(id)
    }

    fn allocate_id(&mut self) -> Result<u64> {
        (**self).allocate_id()
    }

    fn allocate_buffer(&mut self, id: u64) -> Result<Block> {
        (**self).allocate_buffer(id)
    }

    fn get(&mut self, id: u64) -> Result<Block> {
        (**self).get(id)
    }

    fn get_silent(&mut self, id: u64) -> Result<Block> {
        (**self).get_silent(id)
    }

    fn put(&mut self, id: u64, block: &Block) -> Result<()> {
        (**self).put(id, block)
    }

    fn release(&mut self, id: u64) -> Result<()> {
        (**self).release(id)
    }

    fn sync(&mut self, force: bool) -> Result<()> {
        (**self).sync(force)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

// =============================================================================
// Shared Checks
// =============================================================================

/// Reject ids outside `[0, count)`
pub(crate) fn check_bounds(id: u64, count: u64) -> Result<()> {
    if id >= count {
        return Err(StrataError::bounds(id, count));
    }
    Ok(())
}

/// Reject a block whose id, size or byte order does not fit this source
pub(crate) fn check_put(
    id: u64,
    block: &Block,
    block_size: usize,
    byte_order: ByteOrder,
) -> Result<()> {
    if block.id() != id {
        return Err(StrataError::Format(format!(
            "block id mismatch: put at {} with block {}",
            id,
            block.id()
        )));
    }
    if block.len() != block_size {
        return Err(StrataError::Format(format!(
            "block {} has {} bytes, expected {}",
            id,
            block.len(),
            block_size
        )));
    }
    if block.byte_order() != byte_order {
        return Err(StrataError::Format(format!(
            "block {} declares {:?}, source uses {:?}",
            id,
            block.byte_order(),
            byte_order
        )));
    }
    Ok(())
}

/// Ids released back to a source, handed out again before the extent grows
///
/// The stack keeps reuse order; the set makes the double-release check
/// constant time.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    ids: Vec<u64>,
    members: HashSet<u64>,
}

impl FreeList {
    pub(crate) fn pop(&mut self) -> Option<u64> {
        let id = self.ids.pop()?;
        self.members.remove(&id);
        Some(id)
    }

    /// Record a released id; releasing an id twice is a misuse
    pub(crate) fn push(&mut self, id: u64) -> Result<()> {
        if !self.members.insert(id) {
            return Err(StrataError::Protocol(format!(
                "block {} released twice",
                id
            )));
        }
        self.ids.push(id);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
        self.members.clear();
    }
}
