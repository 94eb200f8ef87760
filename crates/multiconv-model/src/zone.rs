//! Sample zones and loops.

use std::sync::Arc;

use multiconv_binary::wav::{SmplLoopType, WaveFile};

use crate::envelope::{Envelope, EnvelopeModulation, Filter};
use crate::error::Result;
use crate::sample_data::SampleData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopType {
    #[default]
    Forward,
    Backwards,
    Alternating,
}

impl From<SmplLoopType> for LoopType {
    fn from(value: SmplLoopType) -> Self {
        match value {
            SmplLoopType::Forward => Self::Forward,
            SmplLoopType::Alternating => Self::Alternating,
            SmplLoopType::Backward => Self::Backwards,
        }
    }
}

impl From<LoopType> for SmplLoopType {
    fn from(value: LoopType) -> Self {
        match value {
            LoopType::Forward => Self::Forward,
            LoopType::Alternating => Self::Alternating,
            LoopType::Backwards => Self::Backward,
        }
    }
}

/// A loop inside a sample. `end` is the last frame of the loop (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleLoop {
    pub loop_type: LoopType,
    pub start: u32,
    pub end: u32,
    /// Crossfade as fraction 0..1 of the loop length.
    pub crossfade: Option<f64>,
}

impl SampleLoop {
    pub fn new(loop_type: LoopType, start: u32, end: u32) -> Self {
        Self {
            loop_type,
            start,
            end,
            crossfade: None,
        }
    }

    pub fn length(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Crossfade length in frames.
    pub fn crossfade_frames(&self) -> u32 {
        (self.crossfade.unwrap_or(0.0).clamp(0.0, 1.0) * self.length() as f64).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayLogic {
    #[default]
    Always,
    RoundRobin,
}

/// The mapping of one sample to a key and velocity range.
#[derive(Debug, Clone)]
pub struct SampleZone {
    pub name: String,
    pub sample: Option<Arc<dyn SampleData>>,

    /// First frame to play.
    pub start: u32,
    /// Frame after the last one to play.
    pub stop: Option<u32>,

    pub key_low: u8,
    pub key_root: Option<u8>,
    pub key_high: u8,
    pub velocity_low: u8,
    pub velocity_high: u8,

    /// Crossfade widths, measured inward from the zone edges.
    pub note_crossfade_low: u8,
    pub note_crossfade_high: u8,
    pub velocity_crossfade_low: u8,
    pub velocity_crossfade_high: u8,

    /// Gain in dB.
    pub gain: f64,
    /// -1 (left) to 1 (right).
    pub pan: f64,
    /// Tuning in semitones, fractions are cents.
    pub tune: f64,
    /// 0 (fixed pitch) to 1 (one semitone per key).
    pub key_tracking: f64,
    /// Pitch bend range in cents.
    pub bend_up: i32,
    pub bend_down: i32,
    pub reversed: bool,

    pub play_logic: PlayLogic,
    /// 1-based position inside a round robin sequence.
    pub sequence_position: Option<u32>,
    pub filter: Option<Filter>,
    pub loops: Vec<SampleLoop>,
    pub amplitude_envelope: Envelope,
    pub pitch_modulation: Option<EnvelopeModulation>,
}

impl Default for SampleZone {
    fn default() -> Self {
        Self {
            name: String::new(),
            sample: None,
            start: 0,
            stop: None,
            key_low: 0,
            key_root: None,
            key_high: 127,
            velocity_low: 1,
            velocity_high: 127,
            note_crossfade_low: 0,
            note_crossfade_high: 0,
            velocity_crossfade_low: 0,
            velocity_crossfade_high: 0,
            gain: 0.0,
            pan: 0.0,
            tune: 0.0,
            key_tracking: 1.0,
            bend_up: 200,
            bend_down: -200,
            reversed: false,
            play_logic: PlayLogic::Always,
            sequence_position: None,
            filter: None,
            loops: Vec::new(),
            amplitude_envelope: Envelope::default(),
            pitch_modulation: None,
        }
    }
}

impl SampleZone {
    pub fn new(name: impl Into<String>, sample: Arc<dyn SampleData>) -> Self {
        Self {
            name: name.into(),
            sample: Some(sample),
            ..Default::default()
        }
    }

    /// The root key, falling back to the lowest key of the range.
    pub fn root_key(&self) -> u8 {
        self.key_root.unwrap_or(self.key_low)
    }

    /// True if the key and velocity ranges of both zones intersect.
    pub fn overlaps(&self, other: &SampleZone) -> bool {
        self.key_low <= other.key_high
            && other.key_low <= self.key_high
            && self.velocity_low <= other.velocity_high
            && other.velocity_low <= self.velocity_high
    }

    /// Check the ordering of the ranges.
    pub fn has_consistent_ranges(&self) -> bool {
        let keys = self.key_low <= self.key_high;
        let root = self.key_root.map_or(true, |r| self.key_low <= r && r <= self.key_high);
        let velocities = self.velocity_low <= self.velocity_high;
        let frames = self.stop.map_or(true, |stop| self.start < stop);
        keys && root && velocities && frames
    }

    /// Read values the source format left unset from the sample's own chunks.
    ///
    /// Only touches `stop`, `key_root` and `loops`, and only when they are
    /// unset. The sample is not opened if nothing is missing.
    pub fn backfill_from_sample(&mut self) -> Result<()> {
        let needs_stop = self.stop.is_none();
        let needs_root = self.key_root.is_none();
        let needs_loops = self.loops.is_empty();
        if !(needs_stop || needs_root || needs_loops) {
            return Ok(());
        }
        let Some(sample) = &self.sample else {
            return Ok(());
        };
        let wave = sample.wave_file()?;
        self.apply_wave_metadata(&wave, needs_stop, needs_root, needs_loops);
        Ok(())
    }

    fn apply_wave_metadata(&mut self, wave: &WaveFile, stop: bool, root: bool, loops: bool) {
        if stop {
            self.stop = Some(wave.frames());
        }
        if root {
            if let Some(smpl) = &wave.sample {
                if smpl.midi_unity_note <= 127 && (smpl.midi_unity_note > 0 || !smpl.loops.is_empty()) {
                    self.key_root = Some(smpl.midi_unity_note as u8);
                    if self.tune == 0.0 {
                        self.tune = smpl.pitch_fraction_cents() / 100.0;
                    }
                }
            }
            if self.key_root.is_none() {
                if let Some(inst) = &wave.instrument {
                    self.key_root = Some(inst.unshifted_note.min(127));
                    if self.tune == 0.0 {
                        self.tune = inst.fine_tune as f64 / 100.0;
                    }
                }
            }
        }
        if loops {
            if let Some(smpl) = &wave.sample {
                self.loops = smpl
                    .loops
                    .iter()
                    .map(|l| SampleLoop::new(l.loop_type.into(), l.start, l.end))
                    .collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_data::PcmSampleData;
    use multiconv_binary::wav::{SampleChunk, SmplLoop};

    fn looped_sample() -> Arc<dyn SampleData> {
        let mut pcm = PcmSampleData::new("s", 1, 44100, 16, vec![0; 200]);
        pcm.sample_chunk = Some(SampleChunk {
            midi_unity_note: 62,
            loops: vec![SmplLoop {
                cue_id: 0,
                loop_type: SmplLoopType::Backward,
                start: 20,
                end: 180,
                fraction: 0,
                play_count: 0,
            }],
            ..Default::default()
        });
        Arc::new(pcm)
    }

    #[test]
    fn test_backfill_fills_missing_fields() {
        let mut zone = SampleZone::new("z", looped_sample());
        zone.backfill_from_sample().unwrap();
        assert_eq!(zone.stop, Some(200));
        assert_eq!(zone.key_root, Some(62));
        assert_eq!(zone.loops, vec![SampleLoop::new(LoopType::Backwards, 20, 180)]);
    }

    #[test]
    fn test_backfill_keeps_explicit_values() {
        let mut zone = SampleZone::new("z", looped_sample());
        zone.stop = Some(100);
        zone.key_root = Some(48);
        zone.backfill_from_sample().unwrap();
        assert_eq!(zone.stop, Some(100));
        assert_eq!(zone.key_root, Some(48));
        assert_eq!(zone.loops.len(), 1);
    }

    #[test]
    fn test_ranges_and_overlap() {
        let mut a = SampleZone {
            key_low: 36,
            key_high: 48,
            key_root: Some(40),
            ..Default::default()
        };
        assert!(a.has_consistent_ranges());
        a.key_root = Some(50);
        assert!(!a.has_consistent_ranges());

        let b = SampleZone {
            key_low: 49,
            key_high: 60,
            ..Default::default()
        };
        assert!(!a.overlaps(&b));
        let c = SampleZone {
            key_low: 48,
            velocity_low: 100,
            ..Default::default()
        };
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_loop_crossfade_frames() {
        let mut l = SampleLoop::new(LoopType::Forward, 100, 300);
        assert_eq!(l.crossfade_frames(), 0);
        l.crossfade = Some(0.25);
        assert_eq!(l.crossfade_frames(), 50);
    }
}
