//! String File Module
//!
//! Strings stored as UTF-8 entries of an object file, optionally with
//! well-known URI prefixes replaced by a one-byte tag.
//!
//! ## Entry Payload
//! ```text
//! abbreviation on:   [tag (1)][UTF-8 remainder]
//! abbreviation off:  [UTF-8 string]
//! ```
//! A file must always be read with the same setting it was written with.

mod prefix;

use crate::config::StoreConfig;
use crate::error::{Result, StrataError};
use crate::object::ObjectFile;

pub use prefix::{PrefixTable, MAX_PREFIXES, NO_PREFIX};

/// String codec over an object file
pub struct StringFile<F: ObjectFile> {
    file: F,
    prefixes: Option<PrefixTable>,
}

impl<F: ObjectFile> StringFile<F> {
    /// Wrap `file`; `None` stores strings verbatim
    pub fn new(file: F, prefixes: Option<PrefixTable>) -> Self {
        Self { file, prefixes }
    }

    /// Wrap `file`, abbreviating with the RDF table if `config` asks for it
    pub fn from_config(file: F, config: &StoreConfig) -> Self {
        let prefixes = config.abbreviate_strings.then(PrefixTable::rdf);
        Self::new(file, prefixes)
    }

    /// Store a string; returns its id
    ///
    /// Encodes straight into a reservation sized for the worst case, then
    /// commits only the bytes actually used.
    pub fn write(&mut self, s: &str) -> Result<u64> {
        let (tag, body) = match &self.prefixes {
            Some(table) => {
                let (tag, rest) = table.compress(s);
                (Some(tag), rest)
            }
            None => (None, s),
        };

        let mut slot = self.file.alloc_write(1 + s.len())?;
        let filled = match tag {
            Some(tag) => slot
                .put_slice(&[tag])
                .and_then(|_| slot.put_slice(body.as_bytes())),
            None => slot.put_slice(body.as_bytes()),
        };

        match filled {
            Ok(()) => self.file.complete_write(slot),
            Err(e) => {
                self.file.abort_write(slot)?;
                Err(e)
            }
        }
    }

    /// Read the string stored at `id`
    pub fn read(&mut self, id: u64) -> Result<String> {
        let bytes = self.file.read(id)?;
        decode(self.prefixes.as_ref(), &bytes)
    }

    /// Scan every string, in id order
    pub fn all(&mut self) -> impl Iterator<Item = Result<(u64, String)>> + '_ {
        let prefixes = self.prefixes.as_ref();
        self.file.all().map(move |entry| {
            entry.and_then(|(id, bytes)| decode(prefixes, &bytes).map(|s| (id, s)))
        })
    }

    pub fn length(&self) -> u64 {
        self.file.length()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.close()
    }

    pub fn prefixes(&self) -> Option<&PrefixTable> {
        self.prefixes.as_ref()
    }

    /// Access the underlying object file
    pub fn file(&self) -> &F {
        &self.file
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

fn decode(prefixes: Option<&PrefixTable>, bytes: &[u8]) -> Result<String> {
    let utf8 = |raw: &[u8]| {
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| StrataError::Format(format!("invalid UTF-8 in string entry: {}", e)))
    };

    match prefixes {
        None => utf8(bytes),
        Some(table) => {
            let (&tag, rest) = bytes.split_first().ok_or_else(|| {
                StrataError::Format("string entry is missing its abbreviation tag".to_string())
            })?;
            table.expand(tag, &utf8(rest)?)
        }
    }
}
