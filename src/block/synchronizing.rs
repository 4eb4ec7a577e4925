//! Synchronizing Block Source
//!
//! Whole-call serialization around any other block source.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ByteOrder;
use crate::error::Result;

use super::{Block, BlockSource};

/// Cloneable handle that serializes every call on a shared source
///
/// Each clone refers to the same wrapped source; every method holds the
/// mutex for its whole body. Typical use is
/// `SynchronizingBlockSource::new(CachingBlockSource::new(..))` shared across
/// threads that do not hold a higher-level lock.
pub struct SynchronizingBlockSource<S: BlockSource> {
    inner: Arc<Mutex<S>>,
    label: String,
    block_size: usize,
    byte_order: ByteOrder,
}

impl<S: BlockSource> SynchronizingBlockSource<S> {
    pub fn new(inner: S) -> Self {
        let label = format!("sync({})", inner.label());
        let block_size = inner.block_size();
        let byte_order = inner.byte_order();
        Self {
            inner: Arc::new(Mutex::new(inner)),
            label,
            block_size,
            byte_order,
        }
    }

    /// Run `f` with exclusive access to the wrapped source
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl<S: BlockSource> Clone for SynchronizingBlockSource<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            label: self.label.clone(),
            block_size: self.block_size,
            byte_order: self.byte_order,
        }
    }
}

impl<S: BlockSource> BlockSource for SynchronizingBlockSource<S> {
    // Fixed at construction; no lock needed
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn block_count(&self) -> u64 {
        self.inner.lock().block_count()
    }

    fn valid(&self, id: u64) -> bool {
        self.inner.lock().valid(id)
    }

    fn allocate_id(&mut self) -> Result<u64> {
        self.inner.lock().allocate_id()
    }

    fn allocate_buffer(&mut self, id: u64) -> Result<Block> {
        self.inner.lock().allocate_buffer(id)
    }

    fn get(&mut self, id: u64) -> Result<Block> {
        self.inner.lock().get(id)
    }

    fn get_silent(&mut self, id: u64) -> Result<Block> {
        self.inner.lock().get_silent(id)
    }

    fn put(&mut self, id: u64, block: &Block) -> Result<()> {
        self.inner.lock().put(id, block)
    }

    fn release(&mut self, id: u64) -> Result<()> {
        self.inner.lock().release(id)
    }

    fn sync(&mut self, force: bool) -> Result<()> {
        self.inner.lock().sync(force)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().close()
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().is_closed()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
