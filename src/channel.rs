//! Channel Module
//!
//! Positioned byte I/O over a file or an in-memory byte vector.
//!
//! ## Responsibilities
//! - Read and write at explicit byte positions (no shared cursor semantics)
//! - Report and truncate the current size
//! - Sync and close the underlying resource
//!
//! The object file and the direct block source are both written against the
//! `Channel` trait, so either can run over a real file or fully in memory.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};

/// Positioned byte storage
pub trait Channel: Send {
    /// Read up to `buf.len()` bytes at `pos`; returns the number of bytes read
    /// (short only at end of channel)
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data` at `pos`, extending the channel if needed
    fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<()>;

    /// Current size in bytes
    fn size(&self) -> Result<u64>;

    /// Cut the channel down to `size` bytes
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Push written data to durable storage
    fn sync(&mut self) -> Result<()>;

    /// Release the underlying resource; later calls fail
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Human-readable name used in logs and errors
    fn label(&self) -> &str;

    /// Read exactly `buf.len()` bytes at `pos`
    fn read_exact_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(pos, buf)?;
        if n < buf.len() {
            return Err(StrataError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{}: short read at {} ({} of {} bytes)",
                    self.label(),
                    pos,
                    n,
                    buf.len()
                ),
            )));
        }
        Ok(())
    }
}

// =============================================================================
// File Channel
// =============================================================================

/// Channel over an operating system file
pub struct FileChannel {
    path: PathBuf,
    label: String,
    file: Option<File>,
}

impl FileChannel {
    /// Open a file for read/write, creating it if missing
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            label: path.display().to_string(),
            file: Some(file),
        })
    }

    /// Open an existing file without write access
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            label: path.display().to_string(),
            file: Some(file),
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or_else(|| StrataError::closed(&self.label))
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(StrataError::closed(&self.label)),
        }
    }
}

impl Channel for FileChannel {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(pos))?;

        // A single read() may return fewer bytes than available
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(data)?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.file_mut()?.set_len(size)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let file = self.file_mut()?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes it; closing twice is a misuse
        match self.file.take() {
            Some(_) => Ok(()),
            None => Err(StrataError::closed(&self.label)),
        }
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn label(&self) -> &str {
        &self.label
    }
}

// =============================================================================
// Memory Channel
// =============================================================================

/// Channel over a growable in-memory byte vector
pub struct MemChannel {
    label: String,
    data: Vec<u8>,
    closed: bool,
}

impl MemChannel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: Vec::new(),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StrataError::closed(&self.label));
        }
        Ok(())
    }
}

impl Channel for MemChannel {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let pos = pos as usize;
        if pos >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - pos);
        buf[..n].copy_from_slice(&self.data[pos..pos + n]);
        Ok(n)
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        self.check_open()?;
        let start = pos as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.data.len() as u64)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.check_open()?;
        self.data.truncate(size as usize);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_open()
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.closed = true;
        self.data = Vec::new();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn label(&self) -> &str {
        &self.label
    }
}
