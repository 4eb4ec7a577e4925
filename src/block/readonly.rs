//! Read-Only Block Source
//!
//! Rejects every mutating call with a protocol error; reads delegate.

use crate::config::ByteOrder;
use crate::error::{Result, StrataError};

use super::{Block, BlockSource};

pub struct ReadOnlyBlockSource<S: BlockSource> {
    inner: S,
}

impl<S: BlockSource> ReadOnlyBlockSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn refuse(&self, op: &str) -> StrataError {
        StrataError::Protocol(format!("{}: {} on a read-only source", self.inner.label(), op))
    }
}

impl<S: BlockSource> BlockSource for ReadOnlyBlockSource<S> {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn byte_order(&self) -> ByteOrder {
        self.inner.byte_order()
    }

    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn valid(&self, id: u64) -> bool {
        self.inner.valid(id)
    }

    fn allocate_id(&mut self) -> Result<u64> {
        Err(self.refuse("allocate_id"))
    }

    fn allocate_buffer(&mut self, _id: u64) -> Result<Block> {
        Err(self.refuse("allocate_buffer"))
    }

    fn get(&mut self, id: u64) -> Result<Block> {
        self.inner.get(id)
    }

    fn get_silent(&mut self, id: u64) -> Result<Block> {
        self.inner.get_silent(id)
    }

    fn put(&mut self, _id: u64, _block: &Block) -> Result<()> {
        Err(self.refuse("put"))
    }

    fn release(&mut self, _id: u64) -> Result<()> {
        Err(self.refuse("release"))
    }

    fn sync(&mut self, force: bool) -> Result<()> {
        self.inner.sync(force)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}
