//! Configuration for Strata
//!
//! Centralized configuration with sensible defaults. The storage core never
//! reads the environment itself; whoever assembles a store builds a
//! `StoreConfig` and passes it to the constructors in `block` and `object`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Default block size (8 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

/// Default mapped-file segment size (8 MiB)
pub const DEFAULT_SEGMENT_SIZE: usize = 8 * 1024 * 1024;

/// Main configuration for a block/object store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Block Configuration
    // -------------------------------------------------------------------------
    /// Bytes per block, fixed for the lifetime of a block file
    pub block_size: usize,

    /// Byte order every block declares
    pub byte_order: ByteOrder,

    /// Size of one memory-mapped segment (multiple of block_size)
    pub segment_size: usize,

    /// Mapped or direct backing for block files
    pub file_mode: FileMode,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of blocks kept in the read cache (0 disables it)
    pub read_cache_size: usize,

    /// Number of dirty blocks kept in the write cache (0 = write-through)
    pub write_cache_size: usize,

    // -------------------------------------------------------------------------
    // Object File Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the object file write buffer (in bytes)
    pub object_buffer_size: usize,

    /// Apply prefix abbreviation in string files
    pub abbreviate_strings: bool,
}

/// Byte order declared by a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// How block files are backed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Segmented memory mapping
    Mapped,

    /// Positioned reads/writes behind a block cache
    Direct,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            byte_order: ByteOrder::BigEndian,
            segment_size: DEFAULT_SEGMENT_SIZE,
            file_mode: FileMode::Mapped,
            read_cache_size: 1000,
            write_cache_size: 100,
            object_buffer_size: 8 * 1024,
            abbreviate_strings: true,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the invariants the storage layer relies on
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(StrataError::Config("block size must be non-zero".to_string()));
        }
        if self.block_size > u32::MAX as usize {
            return Err(StrataError::Config(format!(
                "block size {} too large",
                self.block_size
            )));
        }
        if self.segment_size < self.block_size || self.segment_size % self.block_size != 0 {
            return Err(StrataError::Config(format!(
                "segment size {} is not a multiple of block size {}",
                self.segment_size, self.block_size
            )));
        }
        if self.object_buffer_size < 4 {
            return Err(StrataError::Config(format!(
                "object buffer size {} cannot hold a length prefix",
                self.object_buffer_size
            )));
        }
        Ok(())
    }

    /// Number of blocks in one mapped segment
    pub fn blocks_per_segment(&self) -> usize {
        self.segment_size / self.block_size
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileMode::Mapped => write!(f, "mapped"),
            FileMode::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for FileMode {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mapped" | "mmap" => Ok(FileMode::Mapped),
            "direct" => Ok(FileMode::Direct),
            other => Err(StrataError::Config(format!("unknown file mode: {}", other))),
        }
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: StoreConfig,
}

impl ConfigBuilder {
    /// Set the block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the byte order blocks must declare
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.config.byte_order = order;
        self
    }

    /// Set the mapped segment size (in bytes)
    pub fn segment_size(mut self, size: usize) -> Self {
        self.config.segment_size = size;
        self
    }

    /// Choose mapped or direct file backing
    pub fn file_mode(mut self, mode: FileMode) -> Self {
        self.config.file_mode = mode;
        self
    }

    /// Set the read cache size (in blocks)
    pub fn read_cache_size(mut self, blocks: usize) -> Self {
        self.config.read_cache_size = blocks;
        self
    }

    /// Set the write cache size (in blocks)
    pub fn write_cache_size(mut self, blocks: usize) -> Self {
        self.config.write_cache_size = blocks;
        self
    }

    /// Set the object file write buffer size (in bytes)
    pub fn object_buffer_size(mut self, size: usize) -> Self {
        self.config.object_buffer_size = size;
        self
    }

    /// Enable or disable string prefix abbreviation
    pub fn abbreviate_strings(mut self, enabled: bool) -> Self {
        self.config.abbreviate_strings = enabled;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
