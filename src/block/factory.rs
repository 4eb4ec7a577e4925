//! Block source construction from a `StoreConfig`.

use std::path::Path;

use tracing::info;

use crate::config::{FileMode, StoreConfig};
use crate::error::Result;

use super::{
    BlockFileMeta, BlockSource, CachingBlockSource, DirectFileBlockSource, MappedFileBlockSource,
    MemoryBlockSource,
};

/// An in-memory block source
pub fn open_memory(label: &str, config: &StoreConfig) -> Result<Box<dyn BlockSource>> {
    Ok(Box::new(MemoryBlockSource::new(label, config)?))
}

/// Open or create a block file with the backing chosen by `config.file_mode`
///
/// - `Mapped` → `MappedFileBlockSource`
/// - `Direct` → `CachingBlockSource` over `DirectFileBlockSource`
///
/// The metadata sidecar is written on first creation and checked on reopen.
pub fn open_block_file(path: &Path, config: &StoreConfig) -> Result<Box<dyn BlockSource>> {
    config.validate()?;

    match BlockFileMeta::load(path)? {
        Some(meta) => meta.check(config)?,
        None => BlockFileMeta::from_config(config).store(path)?,
    }

    info!(
        path = %path.display(),
        mode = %config.file_mode,
        block_size = config.block_size,
        "opening block file"
    );

    let source: Box<dyn BlockSource> = match config.file_mode {
        FileMode::Mapped => Box::new(MappedFileBlockSource::open(path, config)?),
        FileMode::Direct => {
            let direct = DirectFileBlockSource::open(path, config)?;
            Box::new(CachingBlockSource::new(direct, config))
        }
    };
    Ok(source)
}
