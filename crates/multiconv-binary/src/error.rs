//! Error types for the multiconv-binary crate.

use thiserror::Error;

/// Errors raised while decoding or encoding binary data.
#[derive(Error, Debug)]
pub enum BinaryError {
    /// The data does not match the expected structure.
    #[error("Parse error at offset {offset}: expected {expected}, found {found}")]
    Parse {
        offset: usize,
        expected: String,
        found: String,
    },

    /// The data ended before a value could be read completely.
    #[error("Unexpected end of data at offset {offset}: {needed} more bytes required")]
    UnexpectedEof { offset: usize, needed: usize },

    /// A compressed stream could not be decompressed.
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// A value cannot be represented in the target encoding.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BinaryError {
    /// Build a [`BinaryError::Parse`] from anything printable.
    pub fn parse(offset: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Result type alias using BinaryError.
pub type Result<T> = std::result::Result<T, BinaryError>;
