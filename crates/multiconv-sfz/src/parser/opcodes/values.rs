use std::path::PathBuf;
use std::str::FromStr;

use super::Result;
use crate::parser::error::Error;
use crate::parser::path_utils::normalize_path;

/// Trait for parsing opcode values
///
/// In SFZ all values are strings in the file, but every opcode expects a
/// particular type:
///
/// - **Strings**: sample paths, labels (`sample=piano_C4.wav`)
/// - **Integers**: key numbers, frame offsets (`key=60`, `offset=200`)
/// - **Floats**: levels and times (`volume=-6.5`, `ampeg_attack=0.01`)
/// - **Notes**: numbers or note names (`lokey=c#3`)
/// - **Enums**: one of a fixed set of words (`trigger=release`)
pub trait OpcodeValue: Sized {
    /// Parse an opcode value from string
    fn parse_opcode(s: &str) -> Result<Self>;
}

impl OpcodeValue for String {
    fn parse_opcode(s: &str) -> Result<Self> {
        Ok(s.to_string())
    }
}

impl OpcodeValue for i32 {
    /// Integers may be written with a fraction (`offset=100.0`), which is truncated.
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse::<i32>()
            .or_else(|_| s.parse::<f64>().map(|v| v as i32))
            .map_err(|_| Error::InvalidOpcodeValue(s.to_string(), "integer".to_string()))
    }
}

impl OpcodeValue for u32 {
    fn parse_opcode(s: &str) -> Result<Self> {
        let value = i32::parse_opcode(s)?;
        u32::try_from(value).map_err(|_| Error::InvalidOpcodeValue(s.to_string(), "unsigned integer".to_string()))
    }
}

impl OpcodeValue for f64 {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse::<f64>()
            .map_err(|_| Error::InvalidOpcodeValue(s.to_string(), "float".to_string()))
    }
}

impl OpcodeValue for bool {
    fn parse_opcode(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yes" | "true" | "1" | "on" => Ok(true),
            "no" | "false" | "0" | "off" => Ok(false),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "boolean".to_string())),
        }
    }
}

impl OpcodeValue for PathBuf {
    /// Backslashes are turned into the separator of the current OS.
    fn parse_opcode(s: &str) -> Result<Self> {
        Ok(PathBuf::from(normalize_path(s)))
    }
}

/// A MIDI note given as number or as note name
///
/// Note names are a letter, an optional `#` or `b` and an octave, with
/// `c4` being note 60 and `c-1` note 0.
///
/// ```text
/// lokey=36
/// hikey=c#4
/// pitch_keycenter=Eb3
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note(pub i32);

impl FromStr for Note {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(number) = i32::parse_opcode(s) {
            return Ok(Note(number));
        }
        let invalid = || Error::InvalidOpcodeValue(s.to_string(), "note".to_string());
        let lower = s.trim().to_ascii_lowercase();
        let mut chars = lower.chars();
        let base = match chars.next().ok_or_else(invalid)? {
            'c' => 0,
            'd' => 2,
            'e' => 4,
            'f' => 5,
            'g' => 7,
            'a' => 9,
            'b' => 11,
            _ => return Err(invalid()),
        };
        let rest = chars.as_str();
        let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
            (1, octave)
        } else if let Some(octave) = rest.strip_prefix('b') {
            (-1, octave)
        } else {
            (0, rest)
        };
        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        Ok(Note((octave + 1) * 12 + base + accidental))
    }
}

impl OpcodeValue for Note {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Loop modes for sample playback
///
/// - **no_loop**: the sample plays once and stops
/// - **one_shot**: the sample plays to its end, ignoring note-off
/// - **loop_continuous**: the sample loops until the voice ends
/// - **loop_sustain**: the sample loops until note-off, then plays to the end
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum LoopMode {
    NoLoop,
    OneShot,
    LoopContinuous,
    LoopSustain,
}

impl LoopMode {
    /// True if the mode plays loops at all.
    pub fn is_looped(self) -> bool {
        matches!(self, LoopMode::LoopContinuous | LoopMode::LoopSustain)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopMode::NoLoop => "no_loop",
            LoopMode::OneShot => "one_shot",
            LoopMode::LoopContinuous => "loop_continuous",
            LoopMode::LoopSustain => "loop_sustain",
        }
    }
}

impl FromStr for LoopMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "no_loop" | "noloop" => Ok(LoopMode::NoLoop),
            "one_shot" | "oneshot" => Ok(LoopMode::OneShot),
            "loop" | "loop_continuous" => Ok(LoopMode::LoopContinuous),
            "loop_sustain" => Ok(LoopMode::LoopSustain),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "LoopMode".to_string())),
        }
    }
}

impl OpcodeValue for LoopMode {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Direction of the loop (`loop_type`)
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum LoopDirection {
    Forward,
    Backward,
    Alternate,
}

impl LoopDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopDirection::Forward => "forward",
            LoopDirection::Backward => "backward",
            LoopDirection::Alternate => "alternate",
        }
    }
}

impl FromStr for LoopDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(LoopDirection::Forward),
            "backward" => Ok(LoopDirection::Backward),
            "alternate" => Ok(LoopDirection::Alternate),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "LoopDirection".to_string())),
        }
    }
}

impl OpcodeValue for LoopDirection {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Trigger modes for region playback
///
/// - **attack**: plays when a key is pressed
/// - **release**: plays when a key is released
/// - **first**: plays only on the first note of a legato phrase
/// - **legato**: plays only on legato transitions
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum TriggerMode {
    Attack,
    Release,
    First,
    Legato,
}

impl TriggerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerMode::Attack => "attack",
            TriggerMode::Release => "release",
            TriggerMode::First => "first",
            TriggerMode::Legato => "legato",
        }
    }
}

impl FromStr for TriggerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "attack" => Ok(TriggerMode::Attack),
            "release" | "release_key" => Ok(TriggerMode::Release),
            "first" => Ok(TriggerMode::First),
            "legato" => Ok(TriggerMode::Legato),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "TriggerMode".to_string())),
        }
    }
}

impl OpcodeValue for TriggerMode {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Playback direction (`direction`)
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Direction {
    Forward,
    Reverse,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "reverse" => Ok(Direction::Reverse),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "Direction".to_string())),
        }
    }
}

impl OpcodeValue for Direction {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse()
    }
}

/// Filter kind and slope from `fil_type`, e.g. `lpf_2p` or `hpf_1p`
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct FilterKind {
    pub kind: FilterFamily,
    pub poles: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum FilterFamily {
    LowPass,
    HighPass,
    BandPass,
    BandReject,
}

impl FilterKind {
    pub fn to_opcode(self) -> String {
        let family = match self.kind {
            FilterFamily::LowPass => "lpf",
            FilterFamily::HighPass => "hpf",
            FilterFamily::BandPass => "bpf",
            FilterFamily::BandReject => "brf",
        };
        let poles = match self.kind {
            FilterFamily::LowPass | FilterFamily::HighPass => self.poles.clamp(1, 4),
            _ => 2,
        };
        format!("{}_{}p", family, poles)
    }
}

impl Default for FilterKind {
    fn default() -> Self {
        FilterKind {
            kind: FilterFamily::LowPass,
            poles: 2,
        }
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        let invalid = || Error::InvalidOpcodeValue(s.to_string(), "FilterKind".to_string());
        let (family, poles) = lower.split_once('_').ok_or_else(invalid)?;
        let kind = match family {
            "lpf" => FilterFamily::LowPass,
            "hpf" => FilterFamily::HighPass,
            "bpf" => FilterFamily::BandPass,
            "brf" => FilterFamily::BandReject,
            _ => return Err(invalid()),
        };
        let poles: u8 = poles
            .strip_suffix('p')
            .and_then(|p| p.parse().ok())
            .unwrap_or(2);
        Ok(FilterKind {
            kind,
            poles: poles.clamp(1, 4),
        })
    }
}

impl OpcodeValue for FilterKind {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.parse()
    }
}
