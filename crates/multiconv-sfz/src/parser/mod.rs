//! SFZ parser
//!
//! Type-safe parser for SFZ format files.

use std::fs;
use std::path::Path;

mod error;
mod parse;
mod types;
pub mod opcodes;
pub mod path_utils;

pub use error::Error;
pub use opcodes::{
    Direction, FilterFamily, FilterKind, LoopDirection, LoopMode, Note, OpcodeValue, SfzOpcodes, TriggerMode,
};
pub use path_utils::{combine_sample_path, normalize_path, resolve_sample_path};
pub use types::{SfzFile, SfzSection, SfzSectionType};

pub type Result<T> = std::result::Result<T, Error>;

/// Parse an SFZ file from a string
pub fn parse_sfz_str(content: &str) -> Result<SfzFile> {
    parse::parse_sfz(content)
}

/// Parse an SFZ file from a file path
///
/// The file is decoded leniently: invalid UTF-8 sequences, common in files
/// written with legacy code pages, are replaced.
pub fn parse_sfz_file<P: AsRef<Path>>(path: P) -> Result<SfzFile> {
    let bytes = fs::read(path.as_ref())?;
    let content = String::from_utf8_lossy(&bytes);
    let text = content.strip_prefix('\u{feff}').unwrap_or(&*content);
    let mut sfz = parse_sfz_str(text)?;

    // Use the absolute path for resolving sample paths
    let absolute_path = fs::canonicalize(path.as_ref()).unwrap_or_else(|_| path.as_ref().to_path_buf());

    sfz.source_file = Some(absolute_path);
    Ok(sfz)
}
