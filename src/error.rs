//! Error types for Strata
//!
//! One error enum for the whole storage core. Every variant maps to a class
//! of failure that callers handle differently:
//! - `Bounds`, `Format`, `Protocol`, `Lock`: caller bugs or corruption, never retried
//! - `Io`: operating system failures, propagated untouched

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for Strata operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Addressing Errors
    // -------------------------------------------------------------------------
    #[error("Id {id} out of bounds (limit {limit})")]
    Bounds { id: u64, limit: u64 },

    // -------------------------------------------------------------------------
    // Format / Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    // -------------------------------------------------------------------------
    // Misuse Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Lock error: {0}")]
    Lock(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StrataError {
    /// Shorthand for a bounds violation
    pub(crate) fn bounds(id: u64, limit: u64) -> Self {
        StrataError::Bounds { id, limit }
    }

    /// Shorthand for an operation attempted on a closed resource
    pub(crate) fn closed(label: &str) -> Self {
        StrataError::Protocol(format!("{} is closed", label))
    }
}
