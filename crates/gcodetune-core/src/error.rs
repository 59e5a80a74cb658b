//! Error handling for gcodetune-core
//!
//! Codec and pipeline errors use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Core error type
///
/// Represents errors raised while parsing G-code text or while driving a
/// filter across a document.
#[derive(Error, Debug)]
pub enum Error {
    /// A physical line could not be tokenized
    #[error("Parse error at line {line_number}: {reason}")]
    Parse {
        /// 1-based number of the offending physical line.
        line_number: usize,
        /// What went wrong.
        reason: String,
    },

    /// The document contains no parseable content
    #[error("Document is empty")]
    EmptyDocument,

    /// The document is structurally unusable for the requested operation
    #[error("Invalid document: {reason}")]
    InvalidDocument {
        /// Why the document cannot be processed.
        reason: String,
    },

    /// A filter could not make forward progress
    #[error("Filter '{filter}' failed: {reason}")]
    Filter {
        /// Name of the failing filter.
        filter: String,
        /// Why the filter gave up.
        reason: String,
    },

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
