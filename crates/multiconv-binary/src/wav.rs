//! WAV metadata chunks.
//!
//! Only the chunks relevant for multi-sample mapping are decoded:
//! - `fmt `: channel count, sample rate and bit depth
//! - `data`: the raw PCM payload
//! - `smpl`: root note, pitch fraction and loops
//! - `inst`: root note, fine tune, gain and key/velocity range
//! - `bext`: Broadcast Audio Extension (description, originator, date)
//!
//! Everything else is preserved verbatim so that re-writing a file keeps it intact.

use crate::error::{BinaryError, Result};
use crate::reader::{ByteReader, Endian};
use crate::riff::{self, ChunkNode, RiffFile};
use crate::writer::ByteWriter;

pub const WAVE_FORM: [u8; 4] = *b"WAVE";
pub const FMT_ID: [u8; 4] = *b"fmt ";
pub const DATA_ID: [u8; 4] = *b"data";
pub const SMPL_ID: [u8; 4] = *b"smpl";
pub const INST_ID: [u8; 4] = *b"inst";
pub const BEXT_ID: [u8; 4] = *b"bext";

pub const FORMAT_PCM: u16 = 1;
pub const FORMAT_IEEE_FLOAT: u16 = 3;
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const BEXT_FIXED_SIZE: usize = 602;

/// The `fmt ` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Extension bytes after the 16 byte base structure.
    pub extension: Vec<u8>,
}

impl FormatChunk {
    pub fn pcm(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            format_tag: FORMAT_PCM,
            channels,
            sample_rate,
            bits_per_sample,
            extension: Vec::new(),
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample.div_ceil(8)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data, Endian::Little);
        let format_tag = reader.read_u16()?;
        let channels = reader.read_u16()?;
        let sample_rate = reader.read_u32()?;
        let _byte_rate = reader.read_u32()?;
        let _block_align = reader.read_u16()?;
        let bits_per_sample = reader.read_u16()?;
        if channels == 0 {
            return Err(BinaryError::parse(2, "at least one channel", "0"));
        }
        Ok(Self {
            format_tag,
            channels,
            sample_rate,
            bits_per_sample,
            extension: reader.take_rest().to_vec(),
        })
    }

    fn write(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_u16(self.format_tag);
        writer.write_u16(self.channels);
        writer.write_u32(self.sample_rate);
        writer.write_u32(self.sample_rate * self.block_align() as u32);
        writer.write_u16(self.block_align());
        writer.write_u16(self.bits_per_sample);
        writer.write_bytes(&self.extension);
        writer.into_inner()
    }
}

/// Loop types of the `smpl` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmplLoopType {
    Forward,
    Alternating,
    Backward,
}

impl SmplLoopType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Alternating,
            2 => Self::Backward,
            _ => Self::Forward,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Forward => 0,
            Self::Alternating => 1,
            Self::Backward => 2,
        }
    }
}

/// One loop of the `smpl` chunk. `end` is the last frame played (inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmplLoop {
    pub cue_id: u32,
    pub loop_type: SmplLoopType,
    pub start: u32,
    pub end: u32,
    pub fraction: u32,
    pub play_count: u32,
}

/// The `smpl` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleChunk {
    pub manufacturer: u32,
    pub product: u32,
    pub sample_period: u32,
    pub midi_unity_note: u32,
    pub midi_pitch_fraction: u32,
    pub smpte_format: u32,
    pub smpte_offset: u32,
    pub loops: Vec<SmplLoop>,
}

impl SampleChunk {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data, Endian::Little);
        let mut chunk = SampleChunk {
            manufacturer: reader.read_u32()?,
            product: reader.read_u32()?,
            sample_period: reader.read_u32()?,
            midi_unity_note: reader.read_u32()?,
            midi_pitch_fraction: reader.read_u32()?,
            smpte_format: reader.read_u32()?,
            smpte_offset: reader.read_u32()?,
            loops: Vec::new(),
        };
        let loop_count = reader.read_u32()? as usize;
        let _sampler_data = reader.read_u32()?;
        // Some writers announce more loops than they store
        let available = reader.remaining() / 24;
        if loop_count > available {
            log::warn!("smpl chunk announces {} loops but only contains {}", loop_count, available);
        }
        for _ in 0..loop_count.min(available) {
            chunk.loops.push(SmplLoop {
                cue_id: reader.read_u32()?,
                loop_type: SmplLoopType::from_u32(reader.read_u32()?),
                start: reader.read_u32()?,
                end: reader.read_u32()?,
                fraction: reader.read_u32()?,
                play_count: reader.read_u32()?,
            });
        }
        Ok(chunk)
    }

    fn write(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_u32(self.manufacturer);
        writer.write_u32(self.product);
        writer.write_u32(self.sample_period);
        writer.write_u32(self.midi_unity_note);
        writer.write_u32(self.midi_pitch_fraction);
        writer.write_u32(self.smpte_format);
        writer.write_u32(self.smpte_offset);
        writer.write_u32(self.loops.len() as u32);
        writer.write_u32(0);
        for l in &self.loops {
            writer.write_u32(l.cue_id);
            writer.write_u32(l.loop_type.as_u32());
            writer.write_u32(l.start);
            writer.write_u32(l.end);
            writer.write_u32(l.fraction);
            writer.write_u32(l.play_count);
        }
        writer.into_inner()
    }

    /// The pitch fraction expressed in cents (0..100).
    pub fn pitch_fraction_cents(&self) -> f64 {
        self.midi_pitch_fraction as f64 / 4_294_967_296.0 * 100.0
    }
}

/// The `inst` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentChunk {
    pub unshifted_note: u8,
    /// Fine tune in cents (-50..50).
    pub fine_tune: i8,
    /// Gain in dB.
    pub gain: i8,
    pub low_note: u8,
    pub high_note: u8,
    pub low_velocity: u8,
    pub high_velocity: u8,
}

impl InstrumentChunk {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data, Endian::Little);
        Ok(Self {
            unshifted_note: reader.read_u8()?,
            fine_tune: reader.read_i8()?,
            gain: reader.read_i8()?,
            low_note: reader.read_u8()?,
            high_note: reader.read_u8()?,
            low_velocity: reader.read_u8()?,
            high_velocity: reader.read_u8()?,
        })
    }

    fn write(&self) -> Vec<u8> {
        vec![
            self.unshifted_note,
            self.fine_tune as u8,
            self.gain as u8,
            self.low_note,
            self.high_note,
            self.low_velocity,
            self.high_velocity,
        ]
    }
}

/// The Broadcast Audio Extension chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BroadcastChunk {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    /// `yyyy-mm-dd`
    pub origination_date: String,
    /// `hh:mm:ss`
    pub origination_time: String,
    /// Bytes following the text fields, kept as is.
    pub remainder: Vec<u8>,
}

impl BroadcastChunk {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data, Endian::Little);
        Ok(Self {
            description: reader.read_fixed_ascii(256)?,
            originator: reader.read_fixed_ascii(32)?,
            originator_reference: reader.read_fixed_ascii(32)?,
            origination_date: reader.read_fixed_ascii(10)?,
            origination_time: reader.read_fixed_ascii(8)?,
            remainder: reader.take_rest().to_vec(),
        })
    }

    fn write(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new(Endian::Little);
        writer.write_fixed_ascii(&self.description, 256);
        writer.write_fixed_ascii(&self.originator, 32);
        writer.write_fixed_ascii(&self.originator_reference, 32);
        writer.write_fixed_ascii(&self.origination_date, 10);
        writer.write_fixed_ascii(&self.origination_time, 8);
        writer.write_bytes(&self.remainder);
        let fixed = 256 + 32 + 32 + 10 + 8;
        if fixed + self.remainder.len() < BEXT_FIXED_SIZE {
            writer.write_zeros(BEXT_FIXED_SIZE - fixed - self.remainder.len());
        }
        writer.into_inner()
    }
}

/// A WAV file split into its known chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveFile {
    pub format: FormatChunk,
    pub data: Vec<u8>,
    pub sample: Option<SampleChunk>,
    pub instrument: Option<InstrumentChunk>,
    pub broadcast: Option<BroadcastChunk>,
    /// Unknown chunks in their original order.
    pub other_chunks: Vec<ChunkNode>,
}

impl WaveFile {
    pub fn new(format: FormatChunk, data: Vec<u8>) -> Self {
        Self {
            format,
            data,
            sample: None,
            instrument: None,
            broadcast: None,
            other_chunks: Vec::new(),
        }
    }

    /// Parse a complete WAV image.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let riff = riff::parse_riff(bytes, &WAVE_FORM)?;

        let mut format = None;
        let mut data = None;
        let mut sample = None;
        let mut instrument = None;
        let mut broadcast = None;
        let mut other_chunks = Vec::new();

        for node in riff.chunks {
            match node {
                ChunkNode::Chunk { id, data: payload } => match &id {
                    b"fmt " => format = Some(FormatChunk::parse(&payload)?),
                    b"data" => data = Some(payload),
                    b"smpl" => match SampleChunk::parse(&payload) {
                        Ok(chunk) => sample = Some(chunk),
                        Err(e) => log::warn!("Ignoring broken smpl chunk: {}", e),
                    },
                    b"inst" => match InstrumentChunk::parse(&payload) {
                        Ok(chunk) => instrument = Some(chunk),
                        Err(e) => log::warn!("Ignoring broken inst chunk: {}", e),
                    },
                    b"bext" => match BroadcastChunk::parse(&payload) {
                        Ok(chunk) => broadcast = Some(chunk),
                        Err(e) => log::warn!("Ignoring broken bext chunk: {}", e),
                    },
                    _ => other_chunks.push(ChunkNode::Chunk { id, data: payload }),
                },
                list => other_chunks.push(list),
            }
        }

        let format = format.ok_or_else(|| BinaryError::parse(12, "fmt chunk", "no fmt chunk"))?;
        let data = data.ok_or_else(|| BinaryError::parse(12, "data chunk", "no data chunk"))?;

        Ok(Self {
            format,
            data,
            sample,
            instrument,
            broadcast,
            other_chunks,
        })
    }

    /// Serialize into a WAV image: `fmt `, metadata chunks, unknown chunks, `data`.
    pub fn write(&self) -> Vec<u8> {
        let mut file = RiffFile::new(&WAVE_FORM);
        file.chunks.push(ChunkNode::chunk(&FMT_ID, self.format.write()));
        if let Some(bext) = &self.broadcast {
            file.chunks.push(ChunkNode::chunk(&BEXT_ID, bext.write()));
        }
        if let Some(smpl) = &self.sample {
            file.chunks.push(ChunkNode::chunk(&SMPL_ID, smpl.write()));
        }
        if let Some(inst) = &self.instrument {
            file.chunks.push(ChunkNode::chunk(&INST_ID, inst.write()));
        }
        file.chunks.extend(self.other_chunks.iter().cloned());
        file.chunks.push(ChunkNode::chunk(&DATA_ID, self.data.clone()));
        riff::write_riff(&file)
    }

    /// Number of sample frames in the data chunk.
    pub fn frames(&self) -> u32 {
        let align = self.format.block_align() as usize;
        if align == 0 {
            0
        } else {
            (self.data.len() / align) as u32
        }
    }
}
