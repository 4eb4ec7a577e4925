//! Caching Block Source
//!
//! LRU read cache plus a bounded dirty write-back cache in front of any other
//! block source.
//!
//! ## Lookup Order
//! 1. Write cache (most recently written, most likely requested again)
//! 2. Read cache
//! 3. Wrapped source (result is added to the read cache)
//!
//! ## Write-Back
//! `put` fills both caches. When the write cache is full, the least recently
//! used dirty block is written to the wrapped source before its slot is
//! reused. `sync` and `close` write out the whole write cache. A dirty block
//! leaves the write cache only after the wrapped source accepted it, so a
//! failed write-back can be retried by a later `sync`.
//!
//! ## Concurrency
//! The caches are not synchronized. Share a caching source between threads
//! only behind `SynchronizingBlockSource` or an external `AccessLock`.

use std::num::NonZeroUsize;

use bytes::BytesMut;
use lru::LruCache;
use tracing::{debug, trace};

use crate::config::{ByteOrder, StoreConfig};
use crate::error::Result;

use super::{check_bounds, check_put, Block, BlockSource};

/// Read/write caching decorator
pub struct CachingBlockSource<S: BlockSource> {
    inner: S,
    label: String,
    /// `None` when the read cache is disabled
    read_cache: Option<LruCache<u64, BytesMut>>,
    /// `None` for write-through
    write_cache: Option<LruCache<u64, BytesMut>>,
    stats: CacheStats,
}

/// Hit/miss counters, for tests and diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub write_hits: u64,
    pub read_hits: u64,
    pub misses: u64,
    /// Dirty blocks written to the wrapped source on eviction
    pub evictions_flushed: u64,
}

impl<S: BlockSource> CachingBlockSource<S> {
    /// Wrap `inner` with the cache sizes from `config`
    pub fn new(inner: S, config: &StoreConfig) -> Self {
        Self::with_capacity(inner, config.read_cache_size, config.write_cache_size)
    }

    pub fn with_capacity(inner: S, read_cache_size: usize, write_cache_size: usize) -> Self {
        let label = format!("cache({})", inner.label());
        Self {
            inner,
            label,
            read_cache: NonZeroUsize::new(read_cache_size).map(LruCache::new),
            write_cache: NonZeroUsize::new(write_cache_size).map(LruCache::new),
            stats: CacheStats::default(),
        }
    }

    /// Number of dirty blocks waiting for write-back
    pub fn dirty_count(&self) -> usize {
        self.write_cache.as_ref().map_or(0, |c| c.len())
    }

    /// Number of blocks in the read cache
    pub fn cached_count(&self) -> usize {
        self.read_cache.as_ref().map_or(0, |c| c.len())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Access the wrapped source
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap, discarding caches. Call `sync` first to keep dirty blocks.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn fetch(&mut self, id: u64, silent: bool) -> Result<Block> {
        let byte_order = self.inner.byte_order();

        // Step 1: Write cache
        if let Some(data) = self.write_cache.as_mut().and_then(|c| c.get(&id)) {
            self.stats.write_hits += 1;
            return Ok(Block::new(id, data.clone(), byte_order));
        }

        // Step 2: Read cache
        if let Some(data) = self.read_cache.as_mut().and_then(|c| c.get(&id)) {
            self.stats.read_hits += 1;
            return Ok(Block::new(id, data.clone(), byte_order));
        }

        // Step 3: Wrapped source
        self.stats.misses += 1;
        let block = if silent {
            self.inner.get_silent(id)?
        } else {
            self.inner.get(id)?
        };
        if let Some(cache) = self.read_cache.as_mut() {
            cache.put(id, BytesMut::from(block.as_slice()));
        }
        Ok(block)
    }

    /// Write every dirty block to the wrapped source, in id order
    fn flush_write_cache(&mut self) -> Result<()> {
        let Some(cache) = self.write_cache.as_mut() else {
            return Ok(());
        };
        if cache.is_empty() {
            return Ok(());
        }

        // Each block leaves the cache only once the wrapped source accepted it
        let mut ids: Vec<u64> = cache.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();

        debug!(source = %self.label, blocks = ids.len(), "flushing write cache");
        let byte_order = self.inner.byte_order();
        for id in ids {
            let Some(data) = cache.peek(&id) else {
                continue;
            };
            self.inner.put(id, &Block::new(id, data.clone(), byte_order))?;
            cache.pop(&id);
        }
        Ok(())
    }
}

impl<S: BlockSource> BlockSource for CachingBlockSource<S> {
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
        self.inner.allocate_id()
    }

    fn allocate_buffer(&mut self, id: u64) -> Result<Block> {
        self.inner.allocate_buffer(id)
    }

    fn get(&mut self, id: u64) -> Result<Block> {
        trace!(source = %self.label, id, "get");
        self.fetch(id, false)
    }

    fn get_silent(&mut self, id: u64) -> Result<Block> {
        self.fetch(id, true)
    }

    fn put(&mut self, id: u64, block: &Block) -> Result<()> {
        if self.inner.is_closed() {
            // Let the wrapped source report the closed state
            return self.inner.put(id, block);
        }
        check_bounds(id, self.inner.block_count())?;
        check_put(id, block, self.inner.block_size(), self.inner.byte_order())?;

        let Some(cache) = self.write_cache.as_mut() else {
            // Write-through
            self.inner.put(id, block)?;
            if let Some(read_cache) = self.read_cache.as_mut() {
                read_cache.put(id, BytesMut::from(block.as_slice()));
            }
            return Ok(());
        };

        // Write back the LRU dirty block before its slot is reused. It stays
        // cached if the wrapped source refuses it.
        if !cache.contains(&id) && cache.len() == cache.cap().get() {
            if let Some((&evicted_id, data)) = cache.peek_lru() {
                trace!(source = %self.label, id = evicted_id, "write-back on eviction");
                let byte_order = self.inner.byte_order();
                self.inner
                    .put(evicted_id, &Block::new(evicted_id, data.clone(), byte_order))?;
                cache.pop_lru();
                self.stats.evictions_flushed += 1;
            }
        }
        cache.put(id, BytesMut::from(block.as_slice()));

        if let Some(read_cache) = self.read_cache.as_mut() {
            read_cache.put(id, BytesMut::from(block.as_slice()));
        }
        Ok(())
    }

    fn release(&mut self, id: u64) -> Result<()> {
        if let Some(cache) = self.read_cache.as_mut() {
            cache.pop(&id);
        }
        if let Some(cache) = self.write_cache.as_mut() {
            cache.pop(&id);
        }
        self.inner.release(id)
    }

    fn sync(&mut self, force: bool) -> Result<()> {
        self.flush_write_cache()?;
        self.inner.sync(force)
    }

    fn close(&mut self) -> Result<()> {
        // Best effort: close the wrapped source even if write-back fails
        let flushed = self.flush_write_cache();
        if let Some(cache) = self.read_cache.as_mut() {
            cache.clear();
        }
        let closed = self.inner.close();
        debug!(source = %self.label, stats = ?self.stats, "closed");
        flushed.and(closed)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
