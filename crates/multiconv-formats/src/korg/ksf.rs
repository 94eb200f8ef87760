//! Korg sample files (`.KSF`).
//!
//! A headerless big-endian chunk stream:
//!
//! ```text
//! SMP1  name[16] | u8 bank | u24 start | u32 loop start | u32 end
//! SMD1  u32 rate | u8 attributes | i8 loop tune | u8 channels | u8 bits | u32 frames | PCM
//! SMF1  name of an external sample file
//! SNO1  u32 sample number
//! ```
//!
//! `end` is the last frame played, inclusive.

use multiconv_binary::riff::{find_chunk, parse_chunks, write_chunks, ChunkNode};
use multiconv_binary::{ByteReader, ByteWriter, Endian};
use multiconv_model::{ConversionError, PcmSampleData, Result};

pub const SMP1: [u8; 4] = *b"SMP1";
pub const SMD1: [u8; 4] = *b"SMD1";
pub const SMF1: [u8; 4] = *b"SMF1";
pub const SNO1: [u8; 4] = *b"SNO1";

pub const NAME_LENGTH: usize = 16;

pub const ATTRIBUTE_NO_LOOP: u8 = 0x01;
pub const ATTRIBUTE_REVERSE: u8 = 0x10;

#[derive(Debug, Clone, PartialEq)]
pub struct KsfFile {
    pub name: String,
    pub bank: u8,
    pub start: u32,
    pub loop_start: u32,
    pub end: u32,
    pub sample_rate: u32,
    pub attributes: u8,
    pub loop_tune: i8,
    pub channels: u8,
    pub bits: u8,
    /// Interleaved samples.
    pub samples: Vec<i32>,
    pub number: Option<u32>,
}

impl KsfFile {
    /// A looping 16-bit sample covering all frames of `pcm`.
    pub fn from_pcm(name: &str, pcm: &PcmSampleData) -> Self {
        let pcm = pcm.to_bits(16);
        let frames = pcm.frames();
        Self {
            name: name.to_string(),
            bank: 0,
            start: 0,
            loop_start: 0,
            end: frames.saturating_sub(1),
            sample_rate: pcm.sample_rate,
            attributes: ATTRIBUTE_NO_LOOP,
            loop_tune: 0,
            channels: pcm.channels as u8,
            bits: 16,
            samples: pcm.samples,
            number: None,
        }
    }

    pub fn frames(&self) -> u32 {
        (self.samples.len() / usize::from(self.channels.max(1))) as u32
    }

    pub fn is_looped(&self) -> bool {
        self.attributes & ATTRIBUTE_NO_LOOP == 0
    }

    pub fn is_reversed(&self) -> bool {
        self.attributes & ATTRIBUTE_REVERSE != 0
    }

    pub fn to_pcm(&self) -> PcmSampleData {
        PcmSampleData::new(
            self.name.clone(),
            u16::from(self.channels),
            self.sample_rate,
            u16::from(self.bits),
            self.samples.clone(),
        )
    }

    pub fn parse(data: &[u8], file: &str) -> Result<Self> {
        let chunks = parse_chunks(data, Endian::Big)?;
        let header = find_chunk(&chunks, &SMP1).ok_or_else(|| ConversionError::structural(file, "missing SMP1 chunk"))?;
        let mut reader = ByteReader::new(header, Endian::Big);
        let name = reader.read_fixed_ascii(NAME_LENGTH)?;
        let bank = reader.read_u8()?;
        let start = reader.read_u24()?;
        let loop_start = reader.read_u32()?;
        let end = reader.read_u32()?;

        let Some(body) = find_chunk(&chunks, &SMD1) else {
            return Err(match find_chunk(&chunks, &SMF1) {
                Some(external) => ConversionError::Unsupported(format!(
                    "{} references the external sample '{}'",
                    file,
                    multiconv_binary::reader::ascii_field(external)
                )),
                None => ConversionError::structural(file, "missing SMD1 chunk"),
            });
        };
        let mut reader = ByteReader::new(body, Endian::Big);
        let sample_rate = reader.read_u32()?;
        let attributes = reader.read_u8()?;
        let loop_tune = reader.read_i8()?;
        let channels = reader.read_u8()?.max(1);
        let bits = reader.read_u8()?;
        let frames = reader.read_u32()? as usize;
        let count = frames * usize::from(channels);
        let samples = match bits {
            8 => (0..count).map(|_| reader.read_i8().map(i32::from)).collect::<std::result::Result<Vec<_>, _>>()?,
            16 => (0..count).map(|_| reader.read_i16().map(i32::from)).collect::<std::result::Result<Vec<_>, _>>()?,
            other => {
                return Err(ConversionError::Unsupported(format!("{} uses {} bits per sample", file, other)));
            }
        };
        let number = match find_chunk(&chunks, &SNO1) {
            Some(data) => Some(ByteReader::new(data, Endian::Big).read_u32()?),
            None => None,
        };

        Ok(Self {
            name,
            bank,
            start,
            loop_start,
            end,
            sample_rate,
            attributes,
            loop_tune,
            channels,
            bits,
            samples,
            number,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let mut header = ByteWriter::new(Endian::Big);
        header.write_fixed_ascii(&self.name, NAME_LENGTH);
        header.write_u8(self.bank);
        header.write_u24(self.start);
        header.write_u32(self.loop_start);
        header.write_u32(self.end);

        let mut body = ByteWriter::new(Endian::Big);
        body.write_u32(self.sample_rate);
        body.write_u8(self.attributes);
        body.write_i8(self.loop_tune);
        body.write_u8(self.channels);
        body.write_u8(self.bits);
        body.write_u32(self.frames());
        for &sample in &self.samples {
            if self.bits == 8 {
                body.write_i8(sample as i8);
            } else {
                body.write_i16(sample as i16);
            }
        }

        let mut chunks = vec![
            ChunkNode::chunk(&SMP1, header.into_inner()),
            ChunkNode::chunk(&SMD1, body.into_inner()),
        ];
        if let Some(number) = self.number {
            chunks.push(ChunkNode::chunk(&SNO1, number.to_be_bytes().to_vec()));
        }
        let mut writer = ByteWriter::new(Endian::Big);
        write_chunks(&mut writer, &chunks);
        writer.into_inner()
    }
}
