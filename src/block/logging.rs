//! Logging Block Source
//!
//! Emits one `info` event per call, tagged with a label, then delegates.

use tracing::info;

use crate::config::ByteOrder;
use crate::error::Result;

use super::{Block, BlockSource};

pub struct LoggingBlockSource<S: BlockSource> {
    inner: S,
    label: String,
}

impl<S: BlockSource> LoggingBlockSource<S> {
    pub fn new(label: impl Into<String>, inner: S) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: BlockSource> BlockSource for LoggingBlockSource<S> {
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
        let id = self.inner.allocate_id()?;
        info!(source = %self.label, id, "allocate_id");
        Ok(id)
    }

    fn allocate_buffer(&mut self, id: u64) -> Result<Block> {
        info!(source = %self.label, id, "allocate_buffer");
        self.inner.allocate_buffer(id)
    }

    fn get(&mut self, id: u64) -> Result<Block> {
        info!(source = %self.label, id, "get");
        self.inner.get(id)
    }

    fn get_silent(&mut self, id: u64) -> Result<Block> {
        self.inner.get_silent(id)
    }

    fn put(&mut self, id: u64, block: &Block) -> Result<()> {
        info!(source = %self.label, id, "put");
        self.inner.put(id, block)
    }

    fn release(&mut self, id: u64) -> Result<()> {
        info!(source = %self.label, id, "release");
        self.inner.release(id)
    }

    fn sync(&mut self, force: bool) -> Result<()> {
        info!(source = %self.label, force, "sync");
        self.inner.sync(force)
    }

    fn close(&mut self) -> Result<()> {
        info!(source = %self.label, "close");
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
