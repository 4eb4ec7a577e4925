//! Direct File Block Source
//!
//! File-backed blocks through explicit positioned reads and writes. There is
//! no caching here; the factory always wraps it in a `CachingBlockSource`.

use std::path::Path;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::channel::{Channel, FileChannel};
use crate::config::{ByteOrder, StoreConfig};
use crate::error::{Result, StrataError};

use super::{check_bounds, check_put, Block, BlockSource, FreeList};

/// Blocks stored by positioned I/O on a channel
pub struct DirectFileBlockSource<C: Channel = FileChannel> {
    channel: C,
    label: String,
    block_size: usize,
    byte_order: ByteOrder,
    /// Logical extent; may run ahead of the channel size until written
    num_blocks: u64,
    free: FreeList,
}

impl DirectFileBlockSource<FileChannel> {
    /// Open or create a block file
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let channel = FileChannel::open(path)?;
        Self::from_channel(channel, config.block_size, config.byte_order)
    }

    /// Open an existing block file without write access
    pub fn open_read_only(path: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let channel = FileChannel::open_read_only(path)?;
        Self::from_channel(channel, config.block_size, config.byte_order)
    }
}

impl<C: Channel> DirectFileBlockSource<C> {
    /// Build on any channel; its size must be a whole number of blocks
    pub fn from_channel(channel: C, block_size: usize, byte_order: ByteOrder) -> Result<Self> {
        let size = channel.size()?;
        if size % block_size as u64 != 0 {
            return Err(StrataError::Format(format!(
                "{}: length {} is not a multiple of block size {}",
                channel.label(),
                size,
                block_size
            )));
        }

        let num_blocks = size / block_size as u64;
        debug!(source = %channel.label(), num_blocks, "opened direct block file");

        Ok(Self {
            label: channel.label().to_string(),
            channel,
            block_size,
            byte_order,
            num_blocks,
            free: FreeList::default(),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.channel.is_closed() {
            return Err(StrataError::closed(&self.label));
        }
        Ok(())
    }

    fn offset(&self, id: u64) -> u64 {
        id * self.block_size as u64
    }

    fn fetch(&mut self, id: u64) -> Result<Block> {
        self.check_open()?;
        check_bounds(id, self.num_blocks)?;

        // Allocated-but-unwritten blocks past the end of the file read as zeros
        let mut data = BytesMut::zeroed(self.block_size);
        let offset = self.offset(id);
        self.channel.read_at(offset, &mut data)?;
        Ok(Block::new(id, data, self.byte_order))
    }

    /// Make the channel cover every allocated block
    fn ensure_extent(&mut self) -> Result<()> {
        let expected = self.offset(self.num_blocks);
        if self.channel.size()? < expected {
            self.channel.write_at(expected - 1, &[0u8])?;
        }
        Ok(())
    }
}

impl<C: Channel> BlockSource for DirectFileBlockSource<C> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn block_count(&self) -> u64 {
        self.num_blocks
    }

    fn allocate_id(&mut self) -> Result<u64> {
        self.check_open()?;
        if let Some(id) = self.free.pop() {
            debug!(source = %self.label, id, "reused released block");
            return Ok(id);
        }
        let id = self.num_blocks;
        self.num_blocks += 1;
        Ok(id)
    }

    fn allocate_buffer(&mut self, id: u64) -> Result<Block> {
        self.check_open()?;
        check_bounds(id, self.num_blocks)?;
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
        check_bounds(id, self.num_blocks)?;
        check_put(id, block, self.block_size, self.byte_order)?;
        let offset = self.offset(id);
        self.channel.write_at(offset, block.as_slice())
    }

    fn release(&mut self, id: u64) -> Result<()> {
        self.check_open()?;
        check_bounds(id, self.num_blocks)?;
        self.free.push(id)
    }

    fn sync(&mut self, _force: bool) -> Result<()> {
        self.check_open()?;
        self.ensure_extent()?;
        self.channel.sync()
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;

        // Best effort: the channel is closed even if the final sync fails
        let synced = self.ensure_extent().and_then(|_| self.channel.sync());
        self.channel.close()?;
        self.free.clear();
        debug!(source = %self.label, num_blocks = self.num_blocks, "closed");
        synced
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
