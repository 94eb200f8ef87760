//! Typed access to SFZ opcodes.
//!
//! Opcodes are `name=value` pairs that control sample playback:
//!
//! - **Sound source**: `sample`, `default_path`, `offset`, `end`, `direction`
//! - **Region logic**: `key`, `lokey`, `hikey`, `lovel`, `hivel`, `trigger`, `seq_position`
//! - **Performance**: `volume`, `pan`, `tune`, `transpose`, `pitch_keytrack`
//! - **Envelopes**: `ampeg_*`, `fileg_*`, `pitcheg_*`
//! - **Filter**: `fil_type`, `cutoff`, `resonance`
//! - **Loops**: `loop_mode`, `loop_start`, `loop_end`, `loop_type`, `loop_crossfade`

mod values;

pub use self::values::*;

use std::result::Result as StdResult;

use crate::parser::error::Error;
use crate::parser::types::SfzSection;

type Result<T> = StdResult<T, Error>;

/// Trait for type-safe access to SFZ opcodes
///
/// Implemented by single sections and by [`crate::scope::Scope`], which
/// resolves opcodes through the section hierarchy.
pub trait SfzOpcodes {
    /// Get an opcode value as a string
    fn get_opcode_str(&self, name: &str) -> Option<&str>;

    /// Get a typed opcode value
    ///
    /// # Example
    ///
    /// ```
    /// use multiconv_sfz::parser::{Note, SfzOpcodes, SfzSection, SfzSectionType};
    ///
    /// let mut section = SfzSection::new(SfzSectionType::Region);
    /// section.add_opcode("lokey".to_string(), "c4".to_string());
    ///
    /// let key: Note = section.get_opcode("lokey").unwrap();
    /// assert_eq!(key, Note(60));
    /// ```
    fn get_opcode<T: OpcodeValue>(&self, name: &str) -> Result<T> {
        match self.get_opcode_str(name) {
            Some(value_str) => OpcodeValue::parse_opcode(value_str),
            None => Err(Error::MissingOpcode(name.to_string())),
        }
    }

    /// Get a typed opcode value, treating absent and invalid values alike.
    ///
    /// Invalid values are logged.
    fn opcode<T: OpcodeValue>(&self, name: &str) -> Option<T> {
        match self.get_opcode(name) {
            Ok(value) => Some(value),
            Err(Error::MissingOpcode(_)) => None,
            Err(e) => {
                log::warn!("Ignoring opcode {}: {}", name, e);
                None
            }
        }
    }
}

impl SfzOpcodes for SfzSection {
    fn get_opcode_str(&self, name: &str) -> Option<&str> {
        self.opcodes.get(name).map(|s| s.as_str())
    }
}
