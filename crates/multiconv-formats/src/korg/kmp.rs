//! Korg multisample files (`.KMP`).
//!
//! ```text
//! MSP1  name[16] | u8 split count | u8 attributes
//! NAME  long name[24]
//! RLP1  per split: u8 original key | u8 top key | i8 tune | i8 level | u8 pan | i8 cutoff | file name[12]
//! MNO1  u32 multisample number
//! ```
//!
//! Bit 7 of the original key marks a split that does not follow the keyboard.
//! Splits are sorted by top key; a split starts one key above the highest
//! lower top key of the splits before it.

use multiconv_binary::riff::{find_chunk, parse_chunks, write_chunks, ChunkNode};
use multiconv_binary::{ByteReader, ByteWriter, Endian};
use multiconv_model::{ConversionError, Result};

pub const MSP1: [u8; 4] = *b"MSP1";
pub const NAME: [u8; 4] = *b"NAME";
pub const RLP1: [u8; 4] = *b"RLP1";
pub const MNO1: [u8; 4] = *b"MNO1";

pub const NAME_LENGTH: usize = 16;
pub const LONG_NAME_LENGTH: usize = 24;
pub const FILE_NAME_LENGTH: usize = 12;
const SPLIT_SIZE: usize = 6 + FILE_NAME_LENGTH;

pub const MAX_SPLITS: usize = 255;

/// Flag in the original key for splits with a fixed pitch.
pub const FIXED_PITCH: u8 = 0x80;

/// Pan value of the center position.
pub const PAN_CENTER: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub original_key: u8,
    pub fixed_pitch: bool,
    pub top_key: u8,
    /// Cents.
    pub tune: i8,
    /// dB.
    pub level: i8,
    /// 0 (left) to 127 (right), centered at [`PAN_CENTER`].
    pub pan: u8,
    pub cutoff: i8,
    pub file_name: String,
}

impl Default for Split {
    fn default() -> Self {
        Self {
            original_key: 60,
            fixed_pitch: false,
            top_key: 127,
            tune: 0,
            level: 0,
            pan: PAN_CENTER,
            cutoff: 0,
            file_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KmpFile {
    pub name: String,
    pub long_name: Option<String>,
    pub attributes: u8,
    pub splits: Vec<Split>,
    pub number: Option<u32>,
}

impl KmpFile {
    /// The display name, preferring the long one.
    pub fn display_name(&self) -> &str {
        match &self.long_name {
            Some(name) if !name.is_empty() => name,
            _ => &self.name,
        }
    }

    /// The lowest key of every split.
    pub fn low_keys(&self) -> Vec<u8> {
        self.splits
            .iter()
            .enumerate()
            .map(|(index, split)| {
                self.splits[..index]
                    .iter()
                    .map(|s| s.top_key)
                    .filter(|top| *top < split.top_key)
                    .max()
                    .map_or(0, |top| top + 1)
            })
            .collect()
    }

    pub fn parse(data: &[u8], file: &str) -> Result<Self> {
        let chunks = parse_chunks(data, Endian::Big)?;
        let header = find_chunk(&chunks, &MSP1).ok_or_else(|| ConversionError::structural(file, "missing MSP1 chunk"))?;
        let mut reader = ByteReader::new(header, Endian::Big);
        let name = reader.read_fixed_ascii(NAME_LENGTH)?;
        let count = usize::from(reader.read_u8()?);
        let attributes = reader.read_u8()?;

        let long_name = match find_chunk(&chunks, &NAME) {
            Some(data) => Some(ByteReader::new(data, Endian::Big).read_fixed_ascii(LONG_NAME_LENGTH)?),
            None => None,
        };

        let splits_data =
            find_chunk(&chunks, &RLP1).ok_or_else(|| ConversionError::structural(file, "missing RLP1 chunk"))?;
        if splits_data.len() < count * SPLIT_SIZE {
            return Err(ConversionError::structural(
                file,
                format!("RLP1 holds {} bytes, {} splits need {}", splits_data.len(), count, count * SPLIT_SIZE),
            ));
        }
        let mut reader = ByteReader::new(splits_data, Endian::Big);
        let mut splits = Vec::with_capacity(count);
        for _ in 0..count {
            let key = reader.read_u8()?;
            splits.push(Split {
                original_key: key & !FIXED_PITCH,
                fixed_pitch: key & FIXED_PITCH != 0,
                top_key: reader.read_u8()?.min(127),
                tune: reader.read_i8()?,
                level: reader.read_i8()?,
                pan: reader.read_u8()?.min(127),
                cutoff: reader.read_i8()?,
                file_name: reader.read_fixed_ascii(FILE_NAME_LENGTH)?,
            });
        }

        let number = match find_chunk(&chunks, &MNO1) {
            Some(data) => Some(ByteReader::new(data, Endian::Big).read_u32()?),
            None => None,
        };
        Ok(Self {
            name,
            long_name,
            attributes,
            splits,
            number,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let count = self.splits.len().min(MAX_SPLITS);
        let mut header = ByteWriter::new(Endian::Big);
        header.write_fixed_ascii(&self.name, NAME_LENGTH);
        header.write_u8(count as u8);
        header.write_u8(self.attributes);
        let mut chunks = vec![ChunkNode::chunk(&MSP1, header.into_inner())];

        if let Some(long_name) = &self.long_name {
            let mut writer = ByteWriter::new(Endian::Big);
            writer.write_fixed_ascii(long_name, LONG_NAME_LENGTH);
            chunks.push(ChunkNode::chunk(&NAME, writer.into_inner()));
        }

        let mut writer = ByteWriter::new(Endian::Big);
        for split in &self.splits[..count] {
            let flag = if split.fixed_pitch { FIXED_PITCH } else { 0 };
            writer.write_u8((split.original_key & !FIXED_PITCH) | flag);
            writer.write_u8(split.top_key);
            writer.write_i8(split.tune);
            writer.write_i8(split.level);
            writer.write_u8(split.pan);
            writer.write_i8(split.cutoff);
            writer.write_fixed_ascii(&split.file_name, FILE_NAME_LENGTH);
        }
        chunks.push(ChunkNode::chunk(&RLP1, writer.into_inner()));

        if let Some(number) = self.number {
            chunks.push(ChunkNode::chunk(&MNO1, number.to_be_bytes().to_vec()));
        }
        let mut writer = ByteWriter::new(Endian::Big);
        write_chunks(&mut writer, &chunks);
        writer.into_inner()
    }
}
