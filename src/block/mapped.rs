//! Mapped File Block Source
//!
//! File-backed blocks through segmented memory mapping.
//!
//! ## Layout
//! ```text
//! file:     | segment 0 (segment_size) | segment 1 | segment 2 | ...
//! segment:  | block 0 | block 1 | ... | block (blocks_per_segment - 1) |
//!
//! segment(id) = id / blocks_per_segment
//! offset(id)  = (id % blocks_per_segment) * block_size
//! ```
//!
//! A segment is mapped on first access to any block inside it and stays
//! mapped until `close`. Mapping a segment grows the file to cover it, so
//! while open the file is padded to a whole number of segments; `close`
//! trims the padding back to the logical block count.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, trace};

use crate::config::{ByteOrder, StoreConfig};
use crate::error::{Result, StrataError};

use super::{check_bounds, check_put, Block, BlockSource, FreeList};

/// One lazily mapped segment
struct Segment {
    map: MmapMut,
    /// Written since the last sync
    dirty: bool,
}

/// Blocks stored in memory-mapped segments of a file
pub struct MappedFileBlockSource {
    path: PathBuf,
    label: String,
    file: Option<File>,
    block_size: usize,
    byte_order: ByteOrder,
    segment_size: usize,
    blocks_per_segment: u64,
    /// Indexed by segment number; `None` until first touched
    segments: Vec<Option<Segment>>,
    num_blocks: u64,
    free: FreeList,
}

impl MappedFileBlockSource {
    /// Open or create a block file
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();
        if size % config.block_size as u64 != 0 {
            return Err(StrataError::Format(format!(
                "{}: length {} is not a multiple of block size {}",
                path.display(),
                size,
                config.block_size
            )));
        }

        let num_blocks = size / config.block_size as u64;
        debug!(path = %path.display(), num_blocks, "opened mapped block file");

        Ok(Self {
            path: path.to_path_buf(),
            label: path.display().to_string(),
            file: Some(file),
            block_size: config.block_size,
            byte_order: config.byte_order,
            segment_size: config.segment_size,
            blocks_per_segment: config.blocks_per_segment() as u64,
            segments: Vec::new(),
            num_blocks,
            free: FreeList::default(),
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of segments currently mapped
    pub fn mapped_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.is_some()).count()
    }

    fn check_open(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(StrataError::closed(&self.label));
        }
        Ok(())
    }

    /// (segment number, byte offset inside the segment) of a block
    fn locate(&self, id: u64) -> (usize, usize) {
        let segment = (id / self.blocks_per_segment) as usize;
        let offset = (id % self.blocks_per_segment) as usize * self.block_size;
        (segment, offset)
    }

    /// Map `index` if it is not mapped yet
    fn segment(&mut self, index: usize) -> Result<&mut Segment> {
        if index >= self.segments.len() {
            self.segments.resize_with(index + 1, || None);
        }

        if self.segments[index].is_none() {
            let file = self
                .file
                .as_ref()
                .ok_or_else(|| StrataError::closed(&self.label))?;

            let start = (index * self.segment_size) as u64;
            let end = start + self.segment_size as u64;
            if file.metadata()?.len() < end {
                file.set_len(end)?;
            }

            // SAFETY: the file is opened read/write by this source only and the
            // range [start, end) exists on disk (extended just above). The map
            // lives in `self.segments` and is dropped before the file is
            // trimmed in `close`, so no access can outlive the mapping.
            let map = unsafe {
                MmapOptions::new()
                    .offset(start)
                    .len(self.segment_size)
                    .map_mut(file)?
            };

            debug!(source = %self.label, segment = index, "mapped segment");
            self.segments[index] = Some(Segment { map, dirty: false });
        }

        match self.segments[index].as_mut() {
            Some(segment) => Ok(segment),
            None => Err(StrataError::Protocol(format!(
                "{}: segment {} missing after mapping",
                self.label, index
            ))),
        }
    }

    fn fetch(&mut self, id: u64) -> Result<Block> {
        self.check_open()?;
        check_bounds(id, self.num_blocks)?;

        let (index, offset) = self.locate(id);
        let block_size = self.block_size;
        let segment = self.segment(index)?;

        // Copy out: the mapped bytes change under later puts
        let data = BytesMut::from(&segment.map[offset..offset + block_size]);
        Ok(Block::new(id, data, self.byte_order))
    }

    /// Flush segments written since the last sync
    fn flush_dirty(&mut self) -> Result<()> {
        let mut flushed = 0;
        for segment in self.segments.iter_mut().flatten() {
            if segment.dirty {
                segment.map.flush()?;
                segment.dirty = false;
                flushed += 1;
            }
        }
        if flushed > 0 {
            debug!(source = %self.label, segments = flushed, "flushed dirty segments");
        }
        Ok(())
    }
}

impl BlockSource for MappedFileBlockSource {
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

        let (index, offset) = self.locate(id);
        let block_size = self.block_size;
        let segment = self.segment(index)?;
        segment.map[offset..offset + block_size].copy_from_slice(block.as_slice());
        segment.dirty = true;
        Ok(())
    }

    fn release(&mut self, id: u64) -> Result<()> {
        self.check_open()?;
        check_bounds(id, self.num_blocks)?;
        self.free.push(id)
    }

    fn sync(&mut self, force: bool) -> Result<()> {
        self.check_open()?;
        self.flush_dirty()?;
        if force {
            if let Some(file) = self.file.as_ref() {
                file.sync_all()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;

        // Best effort: unmap and release the file even if flushing fails
        let flushed = self.flush_dirty();
        self.segments.clear();

        let trimmed = match self.file.take() {
            Some(file) => {
                let logical = self.num_blocks * self.block_size as u64;
                file.set_len(logical)
                    .and_then(|_| file.sync_all())
                    .map_err(StrataError::from)
            }
            None => Ok(()),
        };

        self.free.clear();
        debug!(source = %self.label, num_blocks = self.num_blocks, "closed");
        flushed.and(trimmed)
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
