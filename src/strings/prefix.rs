//! Prefix abbreviation table
//!
//! Maps well-known URI prefixes to a one-byte tag. Encoded payloads always
//! start with the tag: `0` means no prefix was stripped, `k` means prefix
//! `k - 1` was. The longest matching prefix wins.

use crate::error::{Result, StrataError};

/// Maximum number of prefixes (tags 1..=255)
pub const MAX_PREFIXES: usize = u8::MAX as usize;

/// Tag for strings stored verbatim
pub const NO_PREFIX: u8 = 0;

/// Namespaces common in RDF data
const RDF_PREFIXES: &[&str] = &[
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
    "http://www.w3.org/2000/01/rdf-schema#",
    "http://www.w3.org/2002/07/owl#",
    "http://www.w3.org/2001/XMLSchema#",
    "http://www.w3.org/2004/02/skos/core#",
    "http://xmlns.com/foaf/0.1/",
    "http://purl.org/dc/elements/1.1/",
    "http://purl.org/dc/terms/",
    "http://schema.org/",
    "http://dbpedia.org/resource/",
    "http://dbpedia.org/ontology/",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "urn:",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTable {
    prefixes: Vec<String>,
}

impl PrefixTable {
    /// Build a table; prefixes must be non-empty and distinct
    pub fn new<I, S>(prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();

        if prefixes.len() > MAX_PREFIXES {
            return Err(StrataError::Config(format!(
                "prefix table holds at most {} entries, got {}",
                MAX_PREFIXES,
                prefixes.len()
            )));
        }
        for (i, prefix) in prefixes.iter().enumerate() {
            if prefix.is_empty() {
                return Err(StrataError::Config(format!("prefix {} is empty", i)));
            }
            if prefixes[..i].contains(prefix) {
                return Err(StrataError::Config(format!("duplicate prefix: {}", prefix)));
            }
        }

        Ok(Self { prefixes })
    }

    /// Table of common RDF namespaces
    pub fn rdf() -> Self {
        Self {
            prefixes: RDF_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Split `s` into a tag and the remainder to store
    pub fn compress<'a>(&self, s: &'a str) -> (u8, &'a str) {
        let best = self
            .prefixes
            .iter()
            .enumerate()
            .filter(|(_, p)| s.starts_with(p.as_str()))
            .max_by_key(|(_, p)| p.len());

        match best {
            Some((index, prefix)) => ((index + 1) as u8, &s[prefix.len()..]),
            None => (NO_PREFIX, s),
        }
    }

    /// Rebuild the original string from a tag and remainder
    pub fn expand(&self, tag: u8, rest: &str) -> Result<String> {
        if tag == NO_PREFIX {
            return Ok(rest.to_string());
        }
        let prefix = self.prefixes.get(tag as usize - 1).ok_or_else(|| {
            StrataError::Format(format!("unknown abbreviation tag {}", tag))
        })?;

        let mut out = String::with_capacity(prefix.len() + rest.len());
        out.push_str(prefix);
        out.push_str(rest);
        Ok(out)
    }
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self::rdf()
    }
}
