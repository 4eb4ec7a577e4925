//! Memory Block Source
//!
//! Array-backed blocks with free-list reuse and no persistence.

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::config::{ByteOrder, StoreConfig};
use crate::error::{Result, StrataError};

use super::{check_bounds, check_put, Block, BlockSource, FreeList};

/// Blocks held in memory for the lifetime of the source
///
/// Every `get` returns a copy and every `put` stores a copy, so callers can
/// never alias the stored bytes.
pub struct MemoryBlockSource {
    label: String,
    block_size: usize,
    byte_order: ByteOrder,
    /// Slot per id; `None` once released
    blocks: Vec<Option<BytesMut>>,
    free: FreeList,
    closed: bool,
}

impl MemoryBlockSource {
    /// Create an empty source using the block size and byte order of `config`
    pub fn new(label: impl Into<String>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_block_size(label, config.block_size, config.byte_order))
    }

    pub fn with_block_size(label: impl Into<String>, block_size: usize, byte_order: ByteOrder) -> Self {
        Self {
            label: label.into(),
            block_size,
            byte_order,
            blocks: Vec::new(),
            free: FreeList::default(),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StrataError::closed(&self.label));
        }
        Ok(())
    }

    fn fetch(&self, id: u64) -> Result<Block> {
        self.check_open()?;
        check_bounds(id, self.block_count())?;
        match &self.blocks[id as usize] {
            Some(data) => Ok(Block::new(id, data.clone(), self.byte_order)),
            None => Err(StrataError::Protocol(format!(
                "{}: block {} has been released",
                self.label, id
            ))),
        }
    }
}

impl BlockSource for MemoryBlockSource {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn allocate_id(&mut self) -> Result<u64> {
        self.check_open()?;
        let zeroed = BytesMut::zeroed(self.block_size);

        if let Some(id) = self.free.pop() {
            self.blocks[id as usize] = Some(zeroed);
            debug!(source = %self.label, id, "reused released block");
            return Ok(id);
        }

        let id = self.blocks.len() as u64;
        self.blocks.push(Some(zeroed));
        Ok(id)
    }

    fn allocate_buffer(&mut self, id: u64) -> Result<Block> {
        self.check_open()?;
        check_bounds(id, self.block_count())?;
        Ok(Block::zeroed(id, self.block_size, self.byte_order))
    }

    fn get(&mut self, id: u64) -> Result<Block> {
        trace!(source = %self.label, id, "get");
        self.fetch(id)
    }

    fn get_silent(&mut self, id: u64) -> Result<Block> {
        self.fetch(id)
    }

    fn put(&mut self, id: u64, block: &Block) -> Result<()> {
        self.check_open()?;
        check_bounds(id, self.block_count())?;
        check_put(id, block, self.block_size, self.byte_order)?;
        self.blocks[id as usize] = Some(BytesMut::from(block.as_slice()));
        Ok(())
    }

    fn release(&mut self, id: u64) -> Result<()> {
        self.check_open()?;
        check_bounds(id, self.block_count())?;
        self.free.push(id)?;
        self.blocks[id as usize] = None;
        Ok(())
    }

    fn sync(&mut self, _force: bool) -> Result<()> {
        self.check_open()
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.closed = true;
        self.blocks.clear();
        self.free.clear();
        debug!(source = %self.label, "closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn label(&self) -> &str {
        &self.label
    }
}
