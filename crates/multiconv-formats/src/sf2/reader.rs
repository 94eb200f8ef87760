//! Mapping of SoundFont presets to multi-samples.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use multiconv_model::notifier::keys;
use multiconv_model::stereo::split_channel_name;
use multiconv_model::units::{absolute_cents_to_hz, centibels_to_db, db_to_linear, normalize_pan, timecents_to_seconds};
use multiconv_model::{
    ConversionError, DetectContext, Detector, Envelope, EnvelopeModulation, Filter, FilterType, Group, LoopType,
    MultisampleSource, PcmSampleData, Result, SampleData, SampleLoop, SampleZone,
};

use super::file::{SampleHeader, SoundFont};
use super::generators::*;

/// Reads `.sf2` files, one multi-sample per preset.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sf2Detector;

impl Detector for Sf2Detector {
    fn name(&self) -> &'static str {
        "SoundFont 2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["sf2"]
    }

    fn read_file(&self, path: &Path, ctx: &DetectContext) -> Result<Vec<MultisampleSource>> {
        let data = fs::read(path)?;
        let file = path.display().to_string();
        let sf = SoundFont::parse(&data, &file)?;
        Ok(read_presets(&sf, path, ctx))
    }
}

/// Convert every preset of `sf`. A preset that cannot be mapped is reported
/// and skipped.
pub fn read_presets(sf: &SoundFont, path: &Path, ctx: &DetectContext) -> Vec<MultisampleSource> {
    let mut mapper = PresetMapper::new(sf);
    let mut sources = Vec::new();
    for index in 0..sf.preset_count() {
        let preset_name = sf.presets[index].name.clone();
        match mapper.map_preset(index, path) {
            Ok(mut source) => {
                source.metadata.creator = sf.info.engineer.clone();
                source.metadata.description = sf.info.comment.clone();
                sources.push(source);
            }
            Err(e) => ctx.notifier.log_error(keys::PRESET_FAILED, &[&preset_name, &e]),
        }
    }
    sources
}

/// One instrument zone resolved against its sample header.
struct ResolvedZone {
    zone: SampleZone,
    sample_index: usize,
}

struct PresetMapper<'a> {
    sf: &'a SoundFont,
    /// Samples shared by all zones that reference the same header.
    samples: HashMap<usize, Arc<PcmSampleData>>,
}

impl<'a> PresetMapper<'a> {
    fn new(sf: &'a SoundFont) -> Self {
        Self {
            sf,
            samples: HashMap::new(),
        }
    }

    fn map_preset(&mut self, index: usize, path: &Path) -> Result<MultisampleSource> {
        let sf = self.sf;
        let header = &sf.presets[index];
        let name = if header.name.is_empty() {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("Preset {}", index + 1))
        } else {
            header.name.clone()
        };
        let mut source = MultisampleSource::new(name, path);

        let zones = sf.preset_zones(index);
        let (global, zones) = split_global(&zones, INSTRUMENT);
        for preset_zone in zones {
            let preset = preset_zone.with_defaults(&global);
            let Some(instrument) = preset.raw(INSTRUMENT).map(usize::from) else {
                continue;
            };
            if instrument >= sf.instrument_count() {
                return Err(ConversionError::MissingData(format!(
                    "preset {} references instrument {} of {}",
                    header.name,
                    instrument,
                    sf.instrument_count()
                )));
            }
            let mut group = Group::new(sf.instruments[instrument].name.clone());
            group.zones = self.map_instrument(instrument, &preset)?;
            source.groups.push(group);
        }
        Ok(source)
    }

    fn map_instrument(&mut self, instrument: usize, preset: &Generators) -> Result<Vec<SampleZone>> {
        let sf = self.sf;
        let zones = sf.instrument_zones(instrument);
        let (global, zones) = split_global(&zones, SAMPLE_ID);

        let mut resolved = Vec::new();
        for instrument_zone in zones {
            let generators = instrument_zone.with_defaults(&global).apply_preset(preset);
            let Some(sample_index) = generators.raw(SAMPLE_ID).map(usize::from) else {
                continue;
            };
            let Some(header) = sf.samples.get(sample_index).filter(|_| sample_index < sf.sample_count()) else {
                return Err(ConversionError::MissingData(format!(
                    "instrument {} references sample {}",
                    sf.instruments[instrument].name, sample_index
                )));
            };
            if header.is_rom() {
                log::warn!("Skipping ROM sample {}", header.name);
                continue;
            }
            let sample = self.sample(sample_index, header);
            let zone = map_zone(&generators, header, sample);
            if zone.key_low > zone.key_high || zone.velocity_low > zone.velocity_high {
                log::debug!("Skipping zone {} outside the preset range", zone.name);
                continue;
            }
            resolved.push(ResolvedZone { zone, sample_index });
        }
        Ok(self.combine_linked(resolved))
    }

    fn sample(&mut self, index: usize, header: &SampleHeader) -> Arc<PcmSampleData> {
        let sf = self.sf;
        self.samples
            .entry(index)
            .or_insert_with(|| {
                let frames: Vec<i32> = sf.sample_frames(header.start, header.end).iter().map(|&s| s as i32).collect();
                Arc::new(PcmSampleData::new(header.name.clone(), 1, header.sample_rate, 16, frames))
            })
            .clone()
    }

    /// Merge left zones with the zone of their linked right sample.
    fn combine_linked(&self, resolved: Vec<ResolvedZone>) -> Vec<SampleZone> {
        let mut consumed = vec![false; resolved.len()];
        let mut zones = Vec::with_capacity(resolved.len());
        for i in 0..resolved.len() {
            if consumed[i] {
                continue;
            }
            let left_header = &self.sf.samples[resolved[i].sample_index];
            let mut zone = resolved[i].zone.clone();
            if left_header.is_left() {
                let link = left_header.sample_link as usize;
                let partner = (0..resolved.len()).find(|&j| {
                    !consumed[j]
                        && j != i
                        && resolved[j].sample_index == link
                        && resolved[j].zone.key_low == zone.key_low
                        && resolved[j].zone.key_high == zone.key_high
                        && resolved[j].zone.velocity_low == zone.velocity_low
                        && resolved[j].zone.velocity_high == zone.velocity_high
                });
                if let (Some(j), Some(left), Some(right)) = (
                    partner,
                    self.samples.get(&resolved[i].sample_index),
                    self.samples.get(&link),
                ) {
                    consumed[j] = true;
                    let name = split_channel_name(&zone.name)
                        .map(|(stem, _)| stem)
                        .unwrap_or_else(|| zone.name.clone());
                    let stereo: Arc<dyn SampleData> = Arc::new(PcmSampleData::interleave(name.clone(), left, right));
                    zone.sample = Some(stereo);
                    zone.name = name;
                    zone.pan = 0.0;
                }
            }
            consumed[i] = true;
            zones.push(zone);
        }
        zones
    }
}

/// Split off the global zone: the first zone if it lacks the terminal operator.
fn split_global(zones: &[&[super::file::GeneratorRecord]], terminal: u16) -> (Generators, Vec<Generators>) {
    let mut sets: Vec<Generators> = zones.iter().map(|z| Generators::from_records(z)).collect();
    let global = match sets.first() {
        Some(first) if !first.contains(terminal) => sets.remove(0),
        _ => Generators::default(),
    };
    (global, sets)
}

fn seconds(generators: &Generators, operator: u16) -> Option<f64> {
    generators
        .signed(operator)
        .filter(|&tc| tc > INSTANT)
        .map(|tc| timecents_to_seconds(tc as i32))
}

fn envelope(generators: &Generators, operators: [u16; 6]) -> Envelope {
    let [delay, attack, hold, decay, sustain, release] = operators;
    Envelope {
        delay: seconds(generators, delay),
        start: None,
        attack: seconds(generators, attack),
        hold: seconds(generators, hold),
        decay: seconds(generators, decay),
        sustain: generators.signed(sustain).map(f64::from),
        release: seconds(generators, release),
    }
}

fn map_zone(generators: &Generators, header: &SampleHeader, sample: Arc<PcmSampleData>) -> SampleZone {
    let frames = header.end.saturating_sub(header.start) as i64;
    let sample: Arc<dyn SampleData> = sample;
    let mut zone = SampleZone::new(header.name.clone(), sample);

    let start = generators.address_offset(START_ADDRS_OFFSET, START_ADDRS_COARSE_OFFSET).clamp(0, frames);
    let stop = (frames + generators.address_offset(END_ADDRS_OFFSET, END_ADDRS_COARSE_OFFSET)).clamp(start, frames);
    zone.start = start as u32;
    zone.stop = Some(stop as u32);

    if let Some((low, high)) = generators.range(KEY_RANGE) {
        zone.key_low = low.min(127);
        zone.key_high = high.min(127);
    }
    if let Some((low, high)) = generators.range(VEL_RANGE) {
        zone.velocity_low = low.clamp(1, 127);
        zone.velocity_high = high.clamp(1, 127);
    }

    let root = generators.value(OVERRIDING_ROOT_KEY);
    zone.key_root = Some(if (0..=127).contains(&root) {
        root as u8
    } else if header.original_pitch <= 127 {
        header.original_pitch
    } else {
        60
    });

    zone.tune = generators.value(COARSE_TUNE) as f64
        + generators.value(FINE_TUNE) as f64 / 100.0
        + header.pitch_correction as f64 / 100.0;
    zone.key_tracking = (generators.value(SCALE_TUNING) as f64 / 100.0).clamp(0.0, 1.0);
    zone.gain = centibels_to_db(generators.value(INITIAL_ATTENUATION).max(0) as f64);
    zone.pan = normalize_pan(generators.value(PAN) as f64, 500.0);

    let mode = generators.value(SAMPLE_MODES) & 3;
    if mode == 1 || mode == 3 {
        let loop_start = header.start_loop as i64 - header.start as i64
            + generators.address_offset(START_LOOP_ADDRS_OFFSET, START_LOOP_ADDRS_COARSE_OFFSET);
        let loop_end = header.end_loop as i64 - header.start as i64
            + generators.address_offset(END_LOOP_ADDRS_OFFSET, END_LOOP_ADDRS_COARSE_OFFSET);
        if loop_start >= 0 && loop_end > loop_start && loop_end <= frames {
            zone.loops.push(SampleLoop::new(LoopType::Forward, loop_start as u32, (loop_end - 1) as u32));
        } else {
            log::warn!("Ignoring invalid loop {}..{} of {}", loop_start, loop_end, header.name);
        }
    }

    let mut amplitude = envelope(
        generators,
        [DELAY_VOL_ENV, ATTACK_VOL_ENV, HOLD_VOL_ENV, DECAY_VOL_ENV, SUSTAIN_VOL_ENV, RELEASE_VOL_ENV],
    );
    // sustain is an attenuation in centibels
    amplitude.sustain = amplitude
        .sustain
        .map(|cb| db_to_linear(centibels_to_db(cb.clamp(0.0, 1440.0))));
    zone.amplitude_envelope = amplitude;

    let mut modulation = envelope(
        generators,
        [DELAY_MOD_ENV, ATTACK_MOD_ENV, HOLD_MOD_ENV, DECAY_MOD_ENV, SUSTAIN_MOD_ENV, RELEASE_MOD_ENV],
    );
    // sustain is a decrease in 0.1 %
    modulation.sustain = modulation.sustain.map(|v| 1.0 - v.clamp(0.0, 1000.0) / 1000.0);

    if let Some(depth) = generators.signed(MOD_ENV_TO_PITCH).filter(|&d| d != 0) {
        zone.pitch_modulation = Some(EnvelopeModulation {
            depth: depth as f64,
            envelope: modulation,
        });
    }

    let cutoff = generators.value(INITIAL_FILTER_FC);
    if cutoff < FILTER_OPEN {
        let resonance = generators.value(INITIAL_FILTER_Q).max(0) as f64 / 960.0;
        let mut filter = Filter::new(FilterType::LowPass, 2, absolute_cents_to_hz(cutoff as f64), resonance);
        if let Some(depth) = generators.signed(MOD_ENV_TO_FILTER_FC).filter(|&d| d != 0) {
            filter.envelope_depth = depth as f64;
            filter.envelope = modulation;
        }
        zone.filter = Some(filter);
    }
    zone
}
