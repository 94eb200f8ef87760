//! Writing multi-samples as SoundFont 2.
//!
//! The result has one preset; every group becomes an instrument. Samples are
//! converted to 16 bit, stereo samples become a linked left/right pair.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use multiconv_model::destination::{reserve_output, single_file};
use multiconv_model::notifier::keys;
use multiconv_model::units::{db_to_centibels, denormalize_pan, hz_to_absolute_cents, linear_to_db, seconds_to_timecents};
use multiconv_model::{
    CreateContext, Creator, Envelope, MultisampleSource, PcmSampleData, Result, SampleData, SampleZone,
};

use super::file::*;
use super::generators::*;

/// Zero frames after every sample in the pool.
pub const SAMPLE_PADDING: usize = 46;

#[derive(Debug, Default, Clone, Copy)]
pub struct Sf2Creator;

impl Creator for Sf2Creator {
    fn name(&self) -> &'static str {
        "SoundFont 2"
    }

    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf> {
        let stem = reserve_output(folder, &source.name, single_file("sf2"), ctx.options)?;
        let path = folder.join(format!("{}.sf2", stem));
        ctx.notifier.log(keys::CREATING, &[&path.display()]);

        let sf = build_soundfont(source, ctx)?;
        fs::write(&path, sf.write())?;
        Ok(path)
    }
}

/// Position of one written sample (or channel pair) in the sample headers.
#[derive(Clone, Copy)]
struct WrittenSample {
    /// Header of the mono or left channel.
    first: usize,
    /// Header of the right channel.
    right: Option<usize>,
}

#[derive(Default)]
struct SampleTable {
    headers: Vec<SampleHeader>,
    pool: Vec<i16>,
    written: HashMap<usize, WrittenSample>,
}

impl SampleTable {
    fn push_channel(&mut self, name: &str, rate: u32, frames: &[i32], zone: &SampleZone, sample_type: u16) -> usize {
        let start = self.pool.len() as u32;
        self.pool.extend(frames.iter().map(|&s| s.clamp(i16::MIN as i32, i16::MAX as i32) as i16));
        let end = self.pool.len() as u32;
        self.pool.extend(std::iter::repeat(0).take(SAMPLE_PADDING));

        let (start_loop, end_loop) = zone
            .loops
            .first()
            .map(|l| (start + l.start, start + l.end + 1))
            .unwrap_or((start, end));
        self.headers.push(SampleHeader {
            name: name.to_string(),
            start,
            end,
            start_loop,
            end_loop: end_loop.min(end),
            sample_rate: rate,
            original_pitch: zone.root_key(),
            pitch_correction: 0,
            sample_link: 0,
            sample_type,
        });
        self.headers.len() - 1
    }

    /// Add the sample of `zone` unless it was written already.
    fn add(&mut self, zone: &SampleZone, sample: &Arc<dyn SampleData>) -> Result<WrittenSample> {
        let key = Arc::as_ptr(sample) as *const () as usize;
        if let Some(written) = self.written.get(&key) {
            return Ok(*written);
        }
        let pcm = PcmSampleData::from_sample(sample.as_ref())?.to_bits(16);
        let name = if zone.name.is_empty() { pcm.name.clone() } else { zone.name.clone() };
        let written = if pcm.channels >= 2 {
            let left = self.push_channel(&format!("{}-L", name), pcm.sample_rate, &pcm.channel(0), zone, SAMPLE_TYPE_LEFT);
            let right =
                self.push_channel(&format!("{}-R", name), pcm.sample_rate, &pcm.channel(1), zone, SAMPLE_TYPE_RIGHT);
            self.headers[left].sample_link = right as u16;
            self.headers[right].sample_link = left as u16;
            WrittenSample {
                first: left,
                right: Some(right),
            }
        } else {
            WrittenSample {
                first: self.push_channel(&name, pcm.sample_rate, &pcm.samples, zone, SAMPLE_TYPE_MONO),
                right: None,
            }
        };
        self.written.insert(key, written);
        Ok(written)
    }
}

fn timecents(envelope_value: Option<f64>) -> Option<i16> {
    envelope_value.map(|s| seconds_to_timecents(s) as i16)
}

fn push_envelope(records: &mut Vec<GeneratorRecord>, envelope: &Envelope, operators: [u16; 5]) {
    let [delay, attack, hold, decay, release] = operators;
    for (operator, value) in [
        (delay, envelope.delay),
        (attack, envelope.attack),
        (hold, envelope.hold),
        (decay, envelope.decay),
        (release, envelope.release),
    ] {
        if let Some(tc) = timecents(value) {
            records.push(GeneratorRecord::signed(operator, tc));
        }
    }
}

/// Generators of one instrument zone. Key and velocity range come first and
/// the sample ID last.
fn zone_generators(zone: &SampleZone, header: &SampleHeader, sample_id: usize, pan: f64) -> Vec<GeneratorRecord> {
    let mut records = vec![
        GeneratorRecord::range(KEY_RANGE, zone.key_low, zone.key_high),
        GeneratorRecord::range(VEL_RANGE, zone.velocity_low, zone.velocity_high),
    ];

    let frames = (header.end - header.start) as i64;
    push_offset(&mut records, START_ADDRS_OFFSET, START_ADDRS_COARSE_OFFSET, zone.start as i64);
    if let Some(stop) = zone.stop {
        push_offset(&mut records, END_ADDRS_OFFSET, END_ADDRS_COARSE_OFFSET, (stop as i64).min(frames) - frames);
    }

    let attenuation = db_to_centibels(zone.gain).round().clamp(0.0, 1440.0) as i16;
    if attenuation != 0 {
        records.push(GeneratorRecord::signed(INITIAL_ATTENUATION, attenuation));
    }
    let pan = denormalize_pan(pan, 500.0).round() as i16;
    if pan != 0 {
        records.push(GeneratorRecord::signed(PAN, pan));
    }

    let semitones = zone.tune.trunc();
    let cents = ((zone.tune - semitones) * 100.0).round();
    if semitones != 0.0 {
        records.push(GeneratorRecord::signed(COARSE_TUNE, semitones.clamp(-120.0, 120.0) as i16));
    }
    if cents != 0.0 {
        records.push(GeneratorRecord::signed(FINE_TUNE, cents.clamp(-99.0, 99.0) as i16));
    }
    let scale = (zone.key_tracking.clamp(0.0, 1.0) * 100.0).round() as i16;
    if scale != 100 {
        records.push(GeneratorRecord::signed(SCALE_TUNING, scale));
    }

    push_envelope(
        &mut records,
        &zone.amplitude_envelope,
        [DELAY_VOL_ENV, ATTACK_VOL_ENV, HOLD_VOL_ENV, DECAY_VOL_ENV, RELEASE_VOL_ENV],
    );
    if let Some(sustain) = zone.amplitude_envelope.sustain {
        let cb = db_to_centibels(linear_to_db(sustain.clamp(0.0, 1.0))).round().clamp(0.0, 1440.0);
        records.push(GeneratorRecord::signed(SUSTAIN_VOL_ENV, cb as i16));
    }

    let modulation = zone
        .filter
        .filter(|f| f.envelope_depth != 0.0)
        .map(|f| f.envelope)
        .or_else(|| zone.pitch_modulation.map(|m| m.envelope));
    if let Some(envelope) = modulation {
        push_envelope(
            &mut records,
            &envelope,
            [DELAY_MOD_ENV, ATTACK_MOD_ENV, HOLD_MOD_ENV, DECAY_MOD_ENV, RELEASE_MOD_ENV],
        );
        if let Some(sustain) = envelope.sustain {
            let decrease = ((1.0 - sustain.clamp(0.0, 1.0)) * 1000.0).round() as i16;
            records.push(GeneratorRecord::signed(SUSTAIN_MOD_ENV, decrease));
        }
    }
    if let Some(pitch) = zone.pitch_modulation {
        records.push(GeneratorRecord::signed(MOD_ENV_TO_PITCH, pitch.depth.round().clamp(-12000.0, 12000.0) as i16));
    }
    if let Some(filter) = zone.filter {
        let cents = hz_to_absolute_cents(filter.cutoff).round().clamp(1500.0, FILTER_OPEN as f64);
        records.push(GeneratorRecord::signed(INITIAL_FILTER_FC, cents as i16));
        records.push(GeneratorRecord::signed(INITIAL_FILTER_Q, (filter.resonance * 960.0).round() as i16));
        if filter.envelope_depth != 0.0 {
            records.push(GeneratorRecord::signed(
                MOD_ENV_TO_FILTER_FC,
                filter.envelope_depth.round().clamp(-12000.0, 12000.0) as i16,
            ));
        }
    }

    if let Some(first) = zone.loops.first() {
        let loop_start = header.start as i64 + first.start as i64;
        let loop_end = header.start as i64 + first.end as i64 + 1;
        push_offset(
            &mut records,
            START_LOOP_ADDRS_OFFSET,
            START_LOOP_ADDRS_COARSE_OFFSET,
            loop_start - header.start_loop as i64,
        );
        push_offset(
            &mut records,
            END_LOOP_ADDRS_OFFSET,
            END_LOOP_ADDRS_COARSE_OFFSET,
            loop_end.min(header.end as i64) - header.end_loop as i64,
        );
        records.push(GeneratorRecord::signed(SAMPLE_MODES, 1));
    }
    records.push(GeneratorRecord::signed(OVERRIDING_ROOT_KEY, zone.root_key() as i16));
    records.push(GeneratorRecord::unsigned(SAMPLE_ID, sample_id as u16));
    records
}

fn creation_date(source: &MultisampleSource) -> String {
    source
        .metadata
        .creation_time
        .unwrap_or_else(|| chrono::Local::now().naive_local())
        .format("%Y-%m-%d")
        .to_string()
}

/// Build the complete SoundFont for `source`.
pub fn build_soundfont(source: &MultisampleSource, ctx: &CreateContext) -> Result<SoundFont> {
    let mut samples = SampleTable::default();
    let mut instruments = Vec::new();
    let mut instrument_bags = Vec::new();
    let mut instrument_generators = Vec::new();

    for (group_index, group) in source.groups.iter().enumerate() {
        let name = if group.name.is_empty() {
            format!("{} {}", source.name, group_index + 1)
        } else {
            group.name.clone()
        };
        instruments.push(InstrumentHeader {
            name,
            bag_index: instrument_bags.len() as u16,
        });

        for zone in &group.zones {
            let Some(sample) = &zone.sample else {
                continue;
            };
            if zone.loops.len() > 1 {
                ctx.notifier.log(keys::LOOPS_TRUNCATED, &[&zone.name, &zone.loops.len()]);
            }
            if zone.reversed {
                log::warn!("{}: reversed playback is not available in SoundFonts", zone.name);
            }
            let written = match samples.add(zone, sample) {
                Ok(written) => written,
                Err(e) if e.is_zone_local() => {
                    ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&sample.description(), &e]);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let channels = match written.right {
                None => vec![(written.first, zone.pan)],
                Some(right) => vec![(written.first, -1.0), (right, 1.0)],
            };
            for (id, pan) in channels {
                let header = samples.headers[id].clone();
                instrument_bags.push(Bag {
                    generator_index: instrument_generators.len() as u16,
                    modulator_index: 0,
                });
                instrument_generators.extend(zone_generators(zone, &header, id, pan));
            }
        }
    }

    let instrument_count = instruments.len();
    instruments.push(InstrumentHeader {
        name: "EOI".to_string(),
        bag_index: instrument_bags.len() as u16,
    });
    instrument_bags.push(Bag {
        generator_index: instrument_generators.len() as u16,
        modulator_index: 0,
    });
    instrument_generators.push(GeneratorRecord::default());

    let mut preset_bags = Vec::new();
    let mut preset_generators = Vec::new();
    for instrument in 0..instrument_count {
        preset_bags.push(Bag {
            generator_index: preset_generators.len() as u16,
            modulator_index: 0,
        });
        preset_generators.push(GeneratorRecord::unsigned(INSTRUMENT, instrument as u16));
    }
    preset_bags.push(Bag {
        generator_index: preset_generators.len() as u16,
        modulator_index: 0,
    });
    preset_generators.push(GeneratorRecord::default());

    let mut headers = samples.headers;
    headers.push(SampleHeader {
        name: "EOS".to_string(),
        ..Default::default()
    });

    Ok(SoundFont {
        info: Sf2Info {
            name: source.name.clone(),
            creation_date: Some(creation_date(source)),
            engineer: source.metadata.creator.clone(),
            comment: source.metadata.description.clone(),
            software: Some("multiconv".to_string()),
            ..Default::default()
        },
        sample_pool: samples.pool,
        presets: vec![
            PresetHeader {
                name: source.name.clone(),
                ..Default::default()
            },
            PresetHeader {
                name: "EOP".to_string(),
                bag_index: instrument_count as u16,
                ..Default::default()
            },
        ],
        preset_bags,
        preset_modulators: vec![ModulatorRecord::default()],
        preset_generators,
        instruments,
        instrument_bags,
        instrument_modulators: vec![ModulatorRecord::default()],
        instrument_generators,
        samples: headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sf2::reader::read_presets;
    use multiconv_model::{
        CollectingNotifier, DestinationOptions, DetectContext, Group, LoopType, MetadataSettings, SampleLoop,
    };

    fn tone(name: &str, channels: u16) -> Arc<dyn SampleData> {
        let samples = (0..100 * channels as i32).map(|i| (i % 50) * 100).collect();
        Arc::new(PcmSampleData::new(name, channels, 44100, 16, samples))
    }

    fn source() -> MultisampleSource {
        let mut source = MultisampleSource::new("Keys", "keys.sfz");
        let mut low = Group::new("Low");
        let mut zone = SampleZone::new("Keys C2", tone("Keys C2", 1));
        zone.key_low = 0;
        zone.key_high = 47;
        zone.key_root = Some(36);
        zone.gain = -6.0;
        zone.tune = 0.25;
        zone.loops.push(SampleLoop::new(LoopType::Forward, 10, 89));
        low.zones.push(zone);
        let mut high = Group::new("High");
        let mut zone = SampleZone::new("Keys C4", tone("Keys C4", 2));
        zone.key_low = 48;
        zone.key_high = 127;
        zone.key_root = Some(60);
        zone.velocity_low = 64;
        high.zones.push(zone);
        source.groups = vec![low, high];
        source
    }

    #[test]
    fn test_written_font_reads_back() {
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        let sf = build_soundfont(&source(), &ctx).unwrap();

        // 100 frames mono + 2 x 100 frames stereo, each padded
        assert_eq!(sf.sample_pool.len(), 3 * (100 + SAMPLE_PADDING));
        assert_eq!(sf.sample_count(), 3);
        assert_eq!(sf.instrument_count(), 2);

        let parsed = SoundFont::parse(&sf.write(), "keys.sf2").unwrap();
        let settings = MetadataSettings::default();
        let detect = DetectContext::new(&notifier, &settings);
        let sources = read_presets(&parsed, Path::new("keys.sf2"), &detect);
        assert_eq!(sources.len(), 1);
        let back = &sources[0];
        assert_eq!(back.name, "Keys");
        assert_eq!(back.groups.len(), 2);

        let low = &back.groups[0].zones[0];
        assert_eq!((low.key_low, low.key_high, low.key_root), (0, 47, Some(36)));
        assert!((low.gain + 6.0).abs() < 1e-9);
        assert!((low.tune - 0.25).abs() < 1e-9);
        assert_eq!(low.loops, vec![SampleLoop::new(LoopType::Forward, 10, 89)]);
        assert_eq!(low.stop, Some(100));

        let high = &back.groups[1].zones;
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].name, "Keys C4");
        assert_eq!(high[0].velocity_low, 64);
        let meta = high[0].sample.as_ref().unwrap().audio_metadata().unwrap();
        assert_eq!(meta.channels, 2);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Keys.sf2"), b"x").unwrap();
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        assert!(Sf2Creator.create(dir.path(), &source(), &ctx).is_err());
        assert_eq!(fs::read(dir.path().join("Keys.sf2")).unwrap(), b"x");
    }

    #[test]
    fn test_create_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        let path = Sf2Creator.create(dir.path(), &source(), &ctx).unwrap();
        assert_eq!(path, dir.path().join("Keys.sf2"));
        assert!(SoundFont::parse(&fs::read(&path).unwrap(), "Keys.sf2").is_ok());
        assert!(notifier.contains(keys::CREATING));
    }
}
