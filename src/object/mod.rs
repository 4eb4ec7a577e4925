//! Object File Module
//!
//! Append-only log of variable-length byte records, addressed by offset.
//!
//! ## Responsibilities
//! - Append records and return their byte offset as a stable id
//! - Buffer small appends in memory (write-behind)
//! - Two-phase allocate/complete/abort writes for payloads sized late
//! - Length-checked reads from the buffer or the file
//!
//! ## File Format
//! ```text
//! ┌───────────────┬──────────────────────┬───────────────┬─────────
//! │ Len (4, BE)   │ Payload (Len bytes)  │ Len (4, BE)   │ ...
//! └───────────────┴──────────────────────┴───────────────┴─────────
//! ^ id of entry 0                        ^ id of entry 1
//! ```
//! No header, no footer, no checksum. An entry's id is the offset of its
//! length field from the start of the file.
//!
//! ## Logical Length
//! ```text
//! length() = filesize + committed bytes in the write buffer
//! id <  filesize  → read from the file
//! id >= filesize  → read from the write buffer
//! ```

mod logging;
mod storage;

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};

use crate::channel::{FileChannel, MemChannel};
use crate::config::StoreConfig;
use crate::error::{Result, StrataError};

pub use logging::LoggingObjectFile;
pub use storage::{ObjectFileStorage, ObjectIterator};

/// Size of the length prefix in front of every entry
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Iterator over every committed `(id, bytes)` entry
pub type ObjectEntries<'a> = Box<dyn Iterator<Item = Result<(u64, Bytes)>> + 'a>;

// =============================================================================
// ObjectFile
// =============================================================================

/// Append/read log of variable-length records
///
/// At most one two-phase write may be outstanding. While it is, every
/// mutating call (`write`, `alloc_write`, `reposition`, `truncate`, `sync`,
/// `close`) fails with `Protocol`.
pub trait ObjectFile: Send {
    /// Append `bytes` as a new entry; returns its id
    fn write(&mut self, bytes: &[u8]) -> Result<u64>;

    /// Reserve room for an entry of up to `max_len` bytes
    fn alloc_write(&mut self, max_len: usize) -> Result<AllocatedWrite>;

    /// Commit a reservation with however many bytes were written into it
    fn complete_write(&mut self, slot: AllocatedWrite) -> Result<u64>;

    /// Drop a reservation; no entry is recorded
    fn abort_write(&mut self, slot: AllocatedWrite) -> Result<()>;

    /// Read the entry at `id`
    fn read(&mut self, id: u64) -> Result<Bytes>;

    /// Logical length: file bytes plus committed buffered bytes
    fn length(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Move the append point back to `id`
    fn reposition(&mut self, id: u64) -> Result<()>;

    /// Cut the log down to `size` bytes
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Scan every committed entry, file first then buffer
    fn all(&mut self) -> ObjectEntries<'_>;

    /// Flush the buffer and sync the file
    fn sync(&mut self) -> Result<()>;

    /// Flush the buffer and close the file
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Human-readable name used in logs and errors
    fn label(&self) -> &str;
}

impl<F: ObjectFile + ?Sized> ObjectFile for Box<F> {
    fn write(&mut self, bytes: &[u8]) -> Result<u64> {
        (**self).write(bytes)
    }

    fn alloc_write(&mut self, max_len: usize) -> Result<AllocatedWrite> {
        (**self).alloc_write(max_len)
    }

    fn complete_write(&mut self, slot: AllocatedWrite) -> Result<u64> {
        (**self).complete_write(slot)
    }

    fn abort_write(&mut self, slot: AllocatedWrite) -> Result<()> {
        (**self).abort_write(slot)
    }

    fn read(&mut self, id: u64) -> Result<Bytes> {
        (**self).read(id)
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn reposition(&mut self, id: u64) -> Result<()> {
        (**self).reposition(id)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        (**self).truncate(size)
    }

    fn all(&mut self) -> ObjectEntries<'_> {
        (**self).all()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

// =============================================================================
// AllocatedWrite
// =============================================================================

/// A reservation handed out by `alloc_write`
///
/// Fill it with `put_slice`, then pass it back to `complete_write` (the
/// number of bytes written becomes the entry length) or `abort_write`.
#[derive(Debug)]
pub struct AllocatedWrite {
    id: u64,
    capacity: usize,
    /// Identifies the allocation this slot belongs to
    ticket: u64,
    buf: BytesMut,
}

impl AllocatedWrite {
    pub(crate) fn new(id: u64, capacity: usize, ticket: u64, buf: BytesMut) -> Self {
        Self {
            id,
            capacity,
            ticket,
            buf,
        }
    }

    /// Id the entry will have once completed
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Maximum number of bytes that may be written
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Append bytes; fails if they would overrun the reservation
    pub fn put_slice(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(StrataError::Protocol(format!(
                "write of {} bytes overruns reservation ({} of {} used)",
                data.len(),
                self.buf.len(),
                self.capacity
            )));
        }
        self.buf.put_slice(data);
        Ok(())
    }

    /// Shrink the written region to `len` bytes
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    pub(crate) fn into_buf(self) -> BytesMut {
        self.buf
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Open or create an object file on disk
pub fn open_object_file(path: &Path, config: &StoreConfig) -> Result<ObjectFileStorage<FileChannel>> {
    config.validate()?;
    let channel = FileChannel::open(path)?;
    ObjectFileStorage::from_channel(channel, config.object_buffer_size)
}

/// An object file held entirely in memory
pub fn open_memory_object_file(label: &str, config: &StoreConfig) -> Result<ObjectFileStorage<MemChannel>> {
    config.validate()?;
    ObjectFileStorage::from_channel(MemChannel::new(label), config.object_buffer_size)
}
