//! The closed set of readable and writable formats.

use std::fmt;
use std::str::FromStr;

use multiconv_model::{ConversionError, Creator, Detector};
use multiconv_sfz::{SfzCreator, SfzDetector};

use crate::bitwig::{BitwigCreator, BitwigDetector};
use crate::kontakt::KontaktDetector;
use crate::korg::{KorgCreator, KorgDetector};
use crate::mpc::MpcCreator;
use crate::sf2::{Sf2Creator, Sf2Detector};
use crate::tal::TalCreator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Sfz,
    SoundFont,
    Kontakt,
    Korg,
    Bitwig,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 5] = [Self::Sfz, Self::SoundFont, Self::Kontakt, Self::Korg, Self::Bitwig];

    /// Short name used on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Self::Sfz => "sfz",
            Self::SoundFont => "sf2",
            Self::Kontakt => "kontakt",
            Self::Korg => "korg",
            Self::Bitwig => "bitwig",
        }
    }

    pub fn detector(self) -> Box<dyn Detector> {
        match self {
            Self::Sfz => Box::new(SfzDetector),
            Self::SoundFont => Box::new(Sf2Detector),
            Self::Kontakt => Box::new(KontaktDetector),
            Self::Korg => Box::new(KorgDetector),
            Self::Bitwig => Box::new(BitwigDetector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationFormat {
    Sfz,
    SoundFont,
    Korg,
    Bitwig,
    Mpc,
    Tal,
}

impl DestinationFormat {
    pub const ALL: [DestinationFormat; 6] =
        [Self::Sfz, Self::SoundFont, Self::Korg, Self::Bitwig, Self::Mpc, Self::Tal];

    pub fn id(self) -> &'static str {
        match self {
            Self::Sfz => "sfz",
            Self::SoundFont => "sf2",
            Self::Korg => "korg",
            Self::Bitwig => "bitwig",
            Self::Mpc => "mpc",
            Self::Tal => "tal",
        }
    }

    pub fn creator(self) -> Box<dyn Creator> {
        match self {
            Self::Sfz => Box::new(SfzCreator),
            Self::SoundFont => Box::new(Sf2Creator),
            Self::Korg => Box::new(KorgCreator),
            Self::Bitwig => Box::new(BitwigCreator),
            Self::Mpc => Box::new(MpcCreator),
            Self::Tal => Box::new(TalCreator),
        }
    }
}

fn parse_id<T: Copy>(value: &str, all: &[T], id: impl Fn(T) -> &'static str, kind: &str) -> Result<T, ConversionError> {
    all.iter()
        .copied()
        .find(|format| id(*format).eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| {
            let known: Vec<&str> = all.iter().map(|f| id(*f)).collect();
            ConversionError::Unsupported(format!("unknown {} format '{}', expected one of {}", kind, value, known.join(", ")))
        })
}

impl FromStr for SourceFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id(s, &Self::ALL, Self::id, "source")
    }
}

impl FromStr for DestinationFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id(s, &Self::ALL, Self::id, "destination")
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl fmt::Display for DestinationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
