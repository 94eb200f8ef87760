//! Error types shared by all readers and writers.
//!
//! The variants follow the failure policy of the converters:
//! - `Structural` / `Binary`: the file being parsed is malformed, only that file is aborted
//! - `MissingData`: a mandatory value is absent, the instrument is skipped
//! - `Resource`: a referenced sample is missing or unreadable, the zone is skipped
//! - `Encrypted`: a sub-tree could not be decompressed, skipped with a notice
//! - `DestinationExists` / `Io`: the output cannot be written, nothing is produced
//!
//! Capability limits of a destination format are not errors; they are reported
//! through the [`Notifier`](crate::Notifier) and the write continues.

use std::path::PathBuf;

use multiconv_binary::BinaryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    /// Malformed container, wrong magic or missing mandatory chunk
    #[error("Structural error in {file}: {message}")]
    Structural { file: String, message: String },

    /// Low-level decoding failure
    #[error("Binary data error: {0}")]
    Binary(#[from] BinaryError),

    /// A mandatory field is absent after all fallbacks
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A referenced sample file is missing or unreadable
    #[error("Sample {} is not available: {message}", path.display())]
    Resource { path: PathBuf, message: String },

    /// The content could not be decompressed and is most likely encrypted
    #[error("Encrypted content: {0}")]
    Encrypted(String),

    /// The file is recognised but its variant is not supported
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// The output target already exists and is not empty
    #[error("Destination already exists and is not empty: {}", .0.display())]
    DestinationExists(PathBuf),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// WAV encoding or decoding error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub fn structural(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structural {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn resource(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Resource {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for errors that only concern one zone and allow the instrument to continue.
    pub fn is_zone_local(&self) -> bool {
        matches!(self, Self::Resource { .. } | Self::Wav(_))
    }
}

/// Result type alias using ConversionError.
pub type Result<T> = std::result::Result<T, ConversionError>;
