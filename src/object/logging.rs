//! Logging Object File
//!
//! Emits one `info` event per call, tagged with a label, then delegates.

use bytes::Bytes;
use tracing::info;

use crate::error::Result;

use super::{AllocatedWrite, ObjectEntries, ObjectFile};

pub struct LoggingObjectFile<F: ObjectFile> {
    inner: F,
    label: String,
}

impl<F: ObjectFile> LoggingObjectFile<F> {
    pub fn new(label: impl Into<String>, inner: F) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: ObjectFile> ObjectFile for LoggingObjectFile<F> {
    fn write(&mut self, bytes: &[u8]) -> Result<u64> {
        let id = self.inner.write(bytes)?;
        info!(file = %self.label, id, len = bytes.len(), "write");
        Ok(id)
    }

    fn alloc_write(&mut self, max_len: usize) -> Result<AllocatedWrite> {
        let slot = self.inner.alloc_write(max_len)?;
        info!(file = %self.label, id = slot.id(), max_len, "alloc_write");
        Ok(slot)
    }

    fn complete_write(&mut self, slot: AllocatedWrite) -> Result<u64> {
        let len = slot.len();
        let id = self.inner.complete_write(slot)?;
        info!(file = %self.label, id, len, "complete_write");
        Ok(id)
    }

    fn abort_write(&mut self, slot: AllocatedWrite) -> Result<()> {
        info!(file = %self.label, id = slot.id(), "abort_write");
        self.inner.abort_write(slot)
    }

    fn read(&mut self, id: u64) -> Result<Bytes> {
        let bytes = self.inner.read(id)?;
        info!(file = %self.label, id, len = bytes.len(), "read");
        Ok(bytes)
    }

    fn length(&self) -> u64 {
        self.inner.length()
    }

    fn reposition(&mut self, id: u64) -> Result<()> {
        info!(file = %self.label, id, "reposition");
        self.inner.reposition(id)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        info!(file = %self.label, size, "truncate");
        self.inner.truncate(size)
    }

    fn all(&mut self) -> ObjectEntries<'_> {
        info!(file = %self.label, "all");
        self.inner.all()
    }

    fn sync(&mut self) -> Result<()> {
        info!(file = %self.label, "sync");
        self.inner.sync()
    }

    fn close(&mut self) -> Result<()> {
        info!(file = %self.label, "close");
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
