//! References to sample audio.
//!
//! A zone never owns its audio. It holds an `Arc<dyn SampleData>` that knows
//! how to produce a WAV image on demand: from a file on disk, from an entry of
//! an archive, from an in-memory WAV image or from decoded PCM frames. Every
//! call reopens the underlying resource, so no file handle outlives a call.

use std::fmt::Debug;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use multiconv_binary::wav::{SampleChunk, WaveFile};

use crate::error::{ConversionError, Result};

/// Basic properties of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioMetadata {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Number of sample frames.
    pub frames: u32,
}

impl AudioMetadata {
    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

/// Audio that can be written as a WAV file.
pub trait SampleData: Send + Sync + Debug {
    fn audio_metadata(&self) -> Result<AudioMetadata>;

    /// Write the sample as a complete WAV file.
    fn write_sample(&self, out: &mut dyn Write) -> Result<()>;

    /// The sample as parsed WAV chunks.
    fn wave_file(&self) -> Result<WaveFile> {
        let mut bytes = Vec::new();
        self.write_sample(&mut bytes)?;
        Ok(WaveFile::parse(&bytes)?)
    }

    /// Human readable origin, used in messages.
    fn description(&self) -> String;
}

/// A WAV file on disk.
#[derive(Debug, Clone)]
pub struct FileSampleData {
    path: PathBuf,
}

impl FileSampleData {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| ConversionError::resource(&self.path, e))
    }
}

impl SampleData for FileSampleData {
    fn audio_metadata(&self) -> Result<AudioMetadata> {
        let reader = WavReader::open(&self.path).map_err(|e| ConversionError::resource(&self.path, e))?;
        Ok(metadata_from_spec(reader.spec(), reader.duration()))
    }

    fn write_sample(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(&self.read_bytes()?)?;
        Ok(())
    }

    fn wave_file(&self) -> Result<WaveFile> {
        WaveFile::parse(&self.read_bytes()?).map_err(|e| ConversionError::resource(&self.path, e))
    }

    fn description(&self) -> String {
        self.path.display().to_string()
    }
}

/// A complete WAV image held in memory.
#[derive(Debug, Clone)]
pub struct WavBytesSampleData {
    name: String,
    bytes: Arc<Vec<u8>>,
}

impl WavBytesSampleData {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }
}

impl SampleData for WavBytesSampleData {
    fn audio_metadata(&self) -> Result<AudioMetadata> {
        let reader = WavReader::new(Cursor::new(self.bytes.as_slice()))?;
        Ok(metadata_from_spec(reader.spec(), reader.duration()))
    }

    fn write_sample(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(&self.bytes)?;
        Ok(())
    }

    fn description(&self) -> String {
        self.name.clone()
    }
}

/// Decoded integer PCM with interleaved channels.
///
/// Used by formats that embed raw sample frames (SoundFont, Korg) and for
/// stereo combination.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmSampleData {
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Interleaved samples, each within the range of `bits_per_sample`.
    pub samples: Vec<i32>,
    /// Root note and loops to embed when writing.
    pub sample_chunk: Option<SampleChunk>,
}

impl PcmSampleData {
    pub fn new(name: impl Into<String>, channels: u16, sample_rate: u32, bits_per_sample: u16, samples: Vec<i32>) -> Self {
        Self {
            name: name.into(),
            channels: channels.max(1),
            sample_rate,
            bits_per_sample,
            samples,
            sample_chunk: None,
        }
    }

    pub fn frames(&self) -> u32 {
        (self.samples.len() / self.channels as usize) as u32
    }

    /// The samples of one channel.
    pub fn channel(&self, index: u16) -> Vec<i32> {
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }

    /// Build a stereo sample from two mono channels.
    ///
    /// The shorter channel is padded with silence. Both channels must use the
    /// same bit depth; the right channel is rescaled otherwise.
    pub fn interleave(name: impl Into<String>, left: &PcmSampleData, right: &PcmSampleData) -> Self {
        let left_samples = left.channel(0);
        let right = right.to_bits(left.bits_per_sample);
        let right_samples = right.channel(0);
        let frames = left_samples.len().max(right_samples.len());
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            samples.push(left_samples.get(i).copied().unwrap_or(0));
            samples.push(right_samples.get(i).copied().unwrap_or(0));
        }
        let mut combined = Self::new(name, 2, left.sample_rate, left.bits_per_sample, samples);
        combined.sample_chunk = left.sample_chunk.clone();
        combined
    }

    /// Reinterpret the samples with another bit depth by shifting.
    pub fn to_bits(&self, bits: u16) -> Self {
        let mut converted = self.clone();
        if bits == self.bits_per_sample {
            return converted;
        }
        let from = self.bits_per_sample as i32;
        let to = bits as i32;
        converted.samples = self
            .samples
            .iter()
            .map(|&s| if to > from { s << (to - from) } else { s >> (from - to) })
            .collect();
        converted.bits_per_sample = bits;
        converted
    }

    /// Decode a WAV image. Float samples are converted to 24-bit integers.
    pub fn from_wav_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let mut reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let (bits, samples) = match spec.sample_format {
            SampleFormat::Int => {
                let samples = reader.samples::<i32>().collect::<std::result::Result<Vec<_>, _>>()?;
                (spec.bits_per_sample, samples)
            }
            SampleFormat::Float => {
                let samples = reader
                    .samples::<f32>()
                    .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) as f64 * 8_388_607.0).round() as i32))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                (24, samples)
            }
        };
        let mut pcm = Self::new(name, spec.channels, spec.sample_rate, bits, samples);
        // hound skips chunks it does not know, pick up the loops separately
        if let Ok(wave) = WaveFile::parse(bytes) {
            pcm.sample_chunk = wave.sample;
        }
        Ok(pcm)
    }

    /// Decode any sample reference.
    pub fn from_sample(sample: &dyn SampleData) -> Result<Self> {
        let mut bytes = Vec::new();
        sample.write_sample(&mut bytes)?;
        Self::from_wav_bytes(sample.description(), &bytes)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        let bytes = cursor.into_inner();
        match &self.sample_chunk {
            None => Ok(bytes),
            Some(chunk) => {
                let mut wave = WaveFile::parse(&bytes)?;
                wave.sample = Some(chunk.clone());
                Ok(wave.write())
            }
        }
    }
}

impl SampleData for PcmSampleData {
    fn audio_metadata(&self) -> Result<AudioMetadata> {
        Ok(AudioMetadata {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            frames: self.frames(),
        })
    }

    fn write_sample(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(&self.encode()?)?;
        Ok(())
    }

    fn description(&self) -> String {
        self.name.clone()
    }
}

/// Two mono samples played as one stereo sample.
///
/// The combination happens when the audio is requested. Loops and root note
/// come from the left channel.
#[derive(Debug, Clone)]
pub struct CombinedStereoSampleData {
    name: String,
    left: Arc<dyn SampleData>,
    right: Arc<dyn SampleData>,
}

impl CombinedStereoSampleData {
    pub fn new(name: impl Into<String>, left: Arc<dyn SampleData>, right: Arc<dyn SampleData>) -> Self {
        Self {
            name: name.into(),
            left,
            right,
        }
    }

    fn combine(&self) -> Result<PcmSampleData> {
        let left = PcmSampleData::from_sample(self.left.as_ref())?;
        let right = PcmSampleData::from_sample(self.right.as_ref())?;
        if left.sample_rate != right.sample_rate {
            log::warn!(
                "Combining {} with different sample rates ({} / {})",
                self.name,
                left.sample_rate,
                right.sample_rate
            );
        }
        Ok(PcmSampleData::interleave(self.name.clone(), &left, &right))
    }
}

impl SampleData for CombinedStereoSampleData {
    fn audio_metadata(&self) -> Result<AudioMetadata> {
        let left = self.left.audio_metadata()?;
        let right = self.right.audio_metadata()?;
        Ok(AudioMetadata {
            channels: 2,
            frames: left.frames.max(right.frames),
            ..left
        })
    }

    fn write_sample(&self, out: &mut dyn Write) -> Result<()> {
        self.combine()?.write_sample(out)
    }

    fn description(&self) -> String {
        format!("{} ({} + {})", self.name, self.left.description(), self.right.description())
    }
}

fn metadata_from_spec(spec: WavSpec, frames: u32) -> AudioMetadata {
    AudioMetadata {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        frames,
    }
}
