use std::io;
use thiserror::Error;

/// Errors that can occur during SFZ parsing
///
/// SFZ errors fall into a few categories:
///
/// - File access errors: problems reading the SFZ file itself
/// - Syntax errors: content that does not follow the header/opcode grammar
/// - Value errors: valid syntax but a value that cannot be converted
///
/// Missing or unreadable sample files are not parser errors. They are
/// reported per region by the reader, which skips the region and continues.
#[derive(Error, Debug)]
pub enum Error {
    /// Input/Output error when reading the SFZ file
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// Parse error with line and column information
    ///
    /// Raised for unterminated headers and block comments, and for
    /// `#define` directives without a variable name.
    #[error("Failed to parse SFZ at line {line}, column {column}: {message}")]
    ParseAt {
        /// Line number where the error occurred (1-based)
        line: usize,
        /// Column position where the error occurred (1-based)
        column: usize,
        /// Error message describing the problem
        message: String,
    },

    /// Invalid opcode value for a particular type
    ///
    /// For example `key=foo`, where a number or note name is expected.
    #[error("Invalid value '{0}' for type {1}")]
    InvalidOpcodeValue(String, String),

    /// Missing required opcode
    #[error("Opcode '{0}' not found")]
    MissingOpcode(String),
}

impl Error {
    /// Build a [`Error::ParseAt`] for byte `offset` of `content`.
    pub fn at(content: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(content.len());
        let before = &content[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map(|p| offset - p).unwrap_or(offset + 1);
        Error::ParseAt {
            line,
            column,
            message: message.into(),
        }
    }
}
