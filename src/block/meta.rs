//! Block File Metadata
//!
//! A small sidecar file, `<block file>.meta`, records the block size and byte
//! order a block file was created with. The block file itself has no header,
//! so this is the only way to catch a store reopened with the wrong geometry.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ByteOrder, StoreConfig};
use crate::error::{Result, StrataError};

/// Extension appended to the block file name
pub const META_EXTENSION: &str = "meta";

/// Magic bytes identifying a metadata sidecar
const MAGIC: [u8; 4] = *b"STBM";

/// Current metadata format version
const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFileMeta {
    magic: [u8; 4],
    pub version: u16,
    pub block_size: u32,
    pub byte_order: ByteOrder,
}

impl BlockFileMeta {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            block_size: config.block_size as u32,
            byte_order: config.byte_order,
        }
    }

    /// Sidecar path for a block file: `data.idx` → `data.idx.meta`
    pub fn path_for(block_file: &Path) -> PathBuf {
        let mut name = block_file.as_os_str().to_os_string();
        name.push(".");
        name.push(META_EXTENSION);
        PathBuf::from(name)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StrataError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let meta: Self =
            bincode::deserialize(bytes).map_err(|e| StrataError::Serialization(e.to_string()))?;
        if meta.magic != MAGIC {
            return Err(StrataError::Format(format!(
                "invalid metadata magic: {:?}",
                meta.magic
            )));
        }
        if meta.version != VERSION {
            return Err(StrataError::Format(format!(
                "unsupported metadata version: {}",
                meta.version
            )));
        }
        Ok(meta)
    }

    /// Read the sidecar for `block_file`, if one exists
    pub fn load(block_file: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(block_file);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Self::decode(&bytes).map(Some)
    }

    /// Write the sidecar for `block_file`
    pub fn store(&self, block_file: &Path) -> Result<()> {
        let path = Self::path_for(block_file);
        fs::write(&path, self.encode()?)?;
        debug!(path = %path.display(), block_size = self.block_size, "wrote block file metadata");
        Ok(())
    }

    /// Fail if `config` disagrees with the recorded geometry
    pub fn check(&self, config: &StoreConfig) -> Result<()> {
        if self.block_size as usize != config.block_size {
            return Err(StrataError::Format(format!(
                "block file was created with block size {}, configured {}",
                self.block_size, config.block_size
            )));
        }
        if self.byte_order != config.byte_order {
            return Err(StrataError::Format(format!(
                "block file was created as {:?}, configured {:?}",
                self.byte_order, config.byte_order
            )));
        }
        Ok(())
    }
}
