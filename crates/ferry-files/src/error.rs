//! File handling errors.

use thiserror::Error;

/// Errors produced while naming, reading or staging files
#[derive(Debug, Error)]
pub enum FileError {
    /// File name is empty, a path, or otherwise unsafe to create
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// Source ended before the declared size was read
    #[error("local file changed: expected {expected} bytes, read {actual}")]
    SourceChanged {
        /// Declared size
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Source is not a regular file
    #[error("not a regular file: {0}")]
    NotAFile(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
