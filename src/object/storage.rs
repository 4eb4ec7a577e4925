//! Object File Storage
//!
//! The object log proper: a channel plus a single in-memory write buffer.
//!
//! ## Write Paths
//! - Buffered: the entry fits in the remaining buffer; it is appended there
//! - Flush-then-buffer: it fits an empty buffer; flush first, then append
//! - Raw: it is larger than the whole buffer; flush, then write straight
//!   to the channel
//!
//! ## Two-Phase Writes
//! A buffered reservation writes a placeholder length prefix into the
//! buffer, then splits the buffer's spare capacity off as the caller's
//! slot. Completing patches the prefix and rejoins the slot (no copy while
//! the slot stayed within its reservation). Aborting drops the slot and cuts
//! the buffer back to where it was.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::error::{Result, StrataError};

use super::{AllocatedWrite, ObjectEntries, ObjectFile, LENGTH_PREFIX_SIZE};

/// Allocation tickets are unique across every object file in the process,
/// so a slot can only ever match the reservation that produced it
static NEXT_TICKET: AtomicU64 = AtomicU64::new(0);

/// Where an outstanding reservation lives
#[derive(Debug, Clone, Copy)]
enum PendingLocation {
    /// Inside the write buffer; the buffer held `saved_len` committed bytes
    Buffered { saved_len: usize },
    /// A separate buffer, written raw on completion
    Standalone,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    ticket: u64,
    id: u64,
    location: PendingLocation,
}

/// Object log over a channel
pub struct ObjectFileStorage<C: Channel> {
    channel: C,
    label: String,
    /// Bytes already handed to the channel
    filesize: u64,
    /// Entries not yet flushed, logically following `filesize`
    buffer: BytesMut,
    buffer_size: usize,
    pending: Option<PendingWrite>,
}

impl<C: Channel> ObjectFileStorage<C> {
    /// Build over a channel, appending after its current contents
    pub fn from_channel(channel: C, buffer_size: usize) -> Result<Self> {
        let filesize = channel.size()?;
        debug!(file = %channel.label(), filesize, buffer_size, "opened object file");

        Ok(Self {
            label: channel.label().to_string(),
            channel,
            filesize,
            buffer: BytesMut::with_capacity(buffer_size),
            buffer_size,
            pending: None,
        })
    }

    /// Bytes handed to the channel (excludes the write buffer)
    pub fn file_size(&self) -> u64 {
        self.filesize
    }

    /// Committed bytes currently held in the write buffer
    pub fn buffered(&self) -> usize {
        match self.pending {
            Some(PendingWrite {
                location: PendingLocation::Buffered { saved_len },
                ..
            }) => saved_len,
            _ => self.buffer.len(),
        }
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending.is_some()
    }

    /// Restartable scan over every committed entry
    pub fn iter(&mut self) -> ObjectIterator<'_, C> {
        ObjectIterator {
            file: self,
            next_id: 0,
            done: false,
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_open(&self) -> Result<()> {
        if self.channel.is_closed() {
            return Err(StrataError::closed(&self.label));
        }
        Ok(())
    }

    fn check_no_pending(&self, op: &str) -> Result<()> {
        if let Some(pending) = &self.pending {
            return Err(StrataError::Protocol(format!(
                "{}: {} while allocation at {} is outstanding",
                self.label, op, pending.id
            )));
        }
        Ok(())
    }

    fn length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
        let len = u32::try_from(len)
            .map_err(|_| StrataError::Format(format!("entry of {} bytes is too large", len)))?;
        Ok(len.to_be_bytes())
    }

    /// Hand the buffer to the channel and empty it
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.channel.write_at(self.filesize, &self.buffer)?;
        trace!(file = %self.label, bytes = self.buffer.len(), at = self.filesize, "flushed write buffer");
        self.filesize += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Write an entry straight to the channel; the buffer must be empty
    fn raw_write(&mut self, payload: &[u8]) -> Result<u64> {
        let prefix = Self::length_prefix(payload.len())?;
        let id = self.filesize;
        self.channel.write_at(id, &prefix)?;
        self.channel
            .write_at(id + LENGTH_PREFIX_SIZE as u64, payload)?;
        self.filesize += (LENGTH_PREFIX_SIZE + payload.len()) as u64;
        debug!(file = %self.label, id, len = payload.len(), "raw write");
        Ok(id)
    }

    /// Take the outstanding reservation if `slot` belongs to it
    fn take_pending(&mut self, slot: &AllocatedWrite, op: &str) -> Result<PendingWrite> {
        match self.pending {
            None => Err(StrataError::Protocol(format!(
                "{}: {} with no allocation outstanding",
                self.label, op
            ))),
            Some(pending) if pending.ticket != slot.ticket() || pending.id != slot.id() => {
                Err(StrataError::Protocol(format!(
                    "{}: {} with a buffer from a different allocation (expected {}, got {})",
                    self.label,
                    op,
                    pending.id,
                    slot.id()
                )))
            }
            Some(pending) => {
                self.pending = None;
                Ok(pending)
            }
        }
    }

    fn read_buffered(&self, id: u64) -> Result<Bytes> {
        let committed = self.buffered();
        let offset = (id - self.filesize) as usize;

        if offset + LENGTH_PREFIX_SIZE > committed {
            return Err(StrataError::Format(format!(
                "{}: truncated length prefix at {}",
                self.label, id
            )));
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&self.buffer[offset..offset + LENGTH_PREFIX_SIZE]);
        let len = u32::from_be_bytes(prefix) as usize;

        let start = offset + LENGTH_PREFIX_SIZE;
        if start + len > committed {
            return Err(StrataError::Format(format!(
                "{}: entry at {} claims {} bytes, only {} buffered",
                self.label,
                id,
                len,
                committed - start
            )));
        }

        // Copy out: the buffer is reused after the next flush
        Ok(Bytes::copy_from_slice(&self.buffer[start..start + len]))
    }

    fn read_file(&mut self, id: u64) -> Result<Bytes> {
        if id + LENGTH_PREFIX_SIZE as u64 > self.filesize {
            return Err(StrataError::Format(format!(
                "{}: truncated length prefix at {} (file size {})",
                self.label, id, self.filesize
            )));
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.channel.read_exact_at(id, &mut prefix)?;
        let len = u32::from_be_bytes(prefix) as u64;

        let start = id + LENGTH_PREFIX_SIZE as u64;
        let remaining = self.filesize - start;
        if len > remaining {
            return Err(StrataError::Format(format!(
                "{}: entry at {} claims {} bytes, only {} remain in file",
                self.label, id, len, remaining
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.channel.read_exact_at(start, &mut payload)?;
        Ok(Bytes::from(payload))
    }
}

impl<C: Channel> ObjectFile for ObjectFileStorage<C> {
    fn write(&mut self, bytes: &[u8]) -> Result<u64> {
        self.check_open()?;
        self.check_no_pending("write")?;
        let prefix = Self::length_prefix(bytes.len())?;

        let needed = LENGTH_PREFIX_SIZE + bytes.len();
        if self.buffer.len() + needed > self.buffer_size {
            self.flush_buffer()?;
        }

        // Too large even for an empty buffer
        if needed > self.buffer_size {
            return self.raw_write(bytes);
        }

        let id = self.filesize + self.buffer.len() as u64;
        self.buffer.put_slice(&prefix);
        self.buffer.put_slice(bytes);
        Ok(id)
    }

    fn alloc_write(&mut self, max_len: usize) -> Result<AllocatedWrite> {
        self.check_open()?;
        self.check_no_pending("alloc_write")?;
        Self::length_prefix(max_len)?;

        let needed = LENGTH_PREFIX_SIZE + max_len;
        if self.buffer.len() + needed > self.buffer_size {
            self.flush_buffer()?;
        }

        let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);

        if needed > self.buffer_size {
            let id = self.filesize;
            self.pending = Some(PendingWrite {
                ticket,
                id,
                location: PendingLocation::Standalone,
            });
            trace!(file = %self.label, id, max_len, "standalone allocation");
            return Ok(AllocatedWrite::new(
                id,
                max_len,
                ticket,
                BytesMut::with_capacity(max_len),
            ));
        }

        let saved_len = self.buffer.len();
        let id = self.filesize + saved_len as u64;

        // Placeholder prefix, patched on completion
        self.buffer.reserve(needed);
        self.buffer.put_u32(0);
        let slot = self.buffer.split_off(self.buffer.len());

        self.pending = Some(PendingWrite {
            ticket,
            id,
            location: PendingLocation::Buffered { saved_len },
        });
        trace!(file = %self.label, id, max_len, "buffered allocation");
        Ok(AllocatedWrite::new(id, max_len, ticket, slot))
    }

    fn complete_write(&mut self, slot: AllocatedWrite) -> Result<u64> {
        self.check_open()?;
        let pending = self.take_pending(&slot, "complete_write")?;

        match pending.location {
            PendingLocation::Buffered { saved_len } => {
                let prefix = Self::length_prefix(slot.len())?;
                self.buffer[saved_len..saved_len + LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
                // O(1) when the slot is still contiguous with the buffer
                self.buffer.unsplit(slot.into_buf());
                Ok(pending.id)
            }
            PendingLocation::Standalone => {
                let payload = slot.into_buf();
                self.raw_write(&payload)
            }
        }
    }

    fn abort_write(&mut self, slot: AllocatedWrite) -> Result<()> {
        self.check_open()?;
        let pending = self.take_pending(&slot, "abort_write")?;
        drop(slot);

        if let PendingLocation::Buffered { saved_len } = pending.location {
            self.buffer.truncate(saved_len);
        }
        trace!(file = %self.label, id = pending.id, "allocation aborted");
        Ok(())
    }

    fn read(&mut self, id: u64) -> Result<Bytes> {
        self.check_open()?;
        let length = self.length();
        if id >= length {
            return Err(StrataError::bounds(id, length));
        }

        if id >= self.filesize {
            self.read_buffered(id)
        } else {
            self.read_file(id)
        }
    }

    fn length(&self) -> u64 {
        self.filesize + self.buffered() as u64
    }

    fn reposition(&mut self, id: u64) -> Result<()> {
        self.truncate(id)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.check_open()?;
        self.check_no_pending("truncate")?;

        let length = self.length();
        if size > length {
            return Err(StrataError::bounds(size, length));
        }

        self.flush_buffer()?;
        self.channel.truncate(size)?;
        debug!(file = %self.label, from = self.filesize, to = size, "truncated");
        self.filesize = size;
        Ok(())
    }

    fn all(&mut self) -> ObjectEntries<'_> {
        Box::new(self.iter())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_open()?;
        self.check_no_pending("sync")?;
        self.flush_buffer()?;
        self.channel.sync()
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.check_no_pending("close")?;

        // Best effort: the channel is closed even if the final flush fails
        let flushed = self.flush_buffer().and_then(|_| self.channel.sync());
        if let Err(e) = &flushed {
            warn!(file = %self.label, error = %e, "flush on close failed");
        }
        self.channel.close()?;
        self.buffer = BytesMut::new();
        debug!(file = %self.label, filesize = self.filesize, "closed");
        flushed
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    fn label(&self) -> &str {
        &self.label
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// Forward scan over committed entries: file first, then the write buffer
///
/// Stops after the first error.
pub struct ObjectIterator<'a, C: Channel> {
    file: &'a mut ObjectFileStorage<C>,
    next_id: u64,
    done: bool,
}

impl<'a, C: Channel> Iterator for ObjectIterator<'a, C> {
    type Item = Result<(u64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_id >= self.file.length() {
            return None;
        }

        let id = self.next_id;
        match self.file.read(id) {
            Ok(bytes) => {
                self.next_id = id + (LENGTH_PREFIX_SIZE + bytes.len()) as u64;
                Some(Ok((id, bytes)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
