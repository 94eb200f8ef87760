//! Writes multi-samples as SFZ file plus a folder of WAV samples.

use std::fmt::{Display, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use multiconv_model::destination::{file_and_folder, reserve_output, write_sample_file, SampleFileNames};
use multiconv_model::envelope::{Envelope, FilterType};
use multiconv_model::error::Result;
use multiconv_model::naming;
use multiconv_model::notifier::keys;
use multiconv_model::source::{Group, MultisampleSource, TriggerType};
use multiconv_model::zone::{LoopType, PlayLogic, SampleZone};
use multiconv_model::{limit_crossfades, CreateContext, Creator, Crossfades};

use crate::parser::{FilterFamily, FilterKind, LoopDirection, LoopMode, TriggerMode};

/// Writer for `.sfz` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfzCreator;

impl Creator for SfzCreator {
    fn name(&self) -> &'static str {
        "SFZ"
    }

    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf> {
        let stem = reserve_output(folder, &source.name, file_and_folder("sfz"), ctx.options)?;
        ctx.notifier.log(keys::CREATING, &[&stem]);
        let sample_folder = folder.join(&stem);
        fs::create_dir_all(&sample_folder)?;

        let mut text = String::new();
        write_header(&mut text, source, &stem);

        let mut files = SampleFileNames::new();
        for (group_index, group) in source.groups.iter().enumerate() {
            write_group(&mut text, group);
            let crossfades = limit_crossfades(&group.zones);
            for (zone_index, (zone, crossfade)) in group.zones.iter().zip(&crossfades).enumerate() {
                let Some(sample) = &zone.sample else {
                    continue;
                };
                let wanted = naming::sample_file_name(&source.name, &zone.name, group_index, zone_index, None);
                let (file_name, is_new) = files.name_for(sample, &wanted);
                let file_name = format!("{}.wav", file_name);
                if is_new {
                    if let Err(e) = write_sample_file(sample.as_ref(), &sample_folder.join(&file_name)) {
                        if !e.is_zone_local() {
                            return Err(e);
                        }
                        ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&sample.description(), &e]);
                        files.forget(sample);
                        continue;
                    }
                }
                if zone.loops.len() > 1 {
                    ctx.notifier.log(keys::LOOPS_TRUNCATED, &[&zone.name, &zone.loops.len()]);
                }
                let sample_rate = sample.audio_metadata().map(|m| m.sample_rate).unwrap_or(0);
                write_region(&mut text, zone, group, crossfade, &file_name, sample_rate);
            }
        }

        let path = folder.join(format!("{}.sfz", stem));
        fs::write(&path, text)?;
        log::info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Format a number without trailing zeros.
fn number(value: f64) -> String {
    if value.abs() < 5e-7 {
        return "0".to_string();
    }
    let formatted = format!("{:.6}", value);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn opcode(text: &mut String, name: &str, value: impl Display) {
    let _ = writeln!(text, "{}={}", name, value);
}

fn write_header(text: &mut String, source: &MultisampleSource, stem: &str) {
    let _ = writeln!(text, "// {}", source.name);
    let metadata = &source.metadata;
    if let Some(creator) = &metadata.creator {
        let _ = writeln!(text, "// Creator: {}", creator);
    }
    if let Some(category) = &metadata.category {
        let _ = writeln!(text, "// Category: {}", category);
    }
    if let Some(description) = &metadata.description {
        for line in description.lines() {
            let _ = writeln!(text, "// {}", line);
        }
    }
    if !metadata.keywords.is_empty() {
        let _ = writeln!(text, "// Keywords: {}", metadata.keywords.join(", "));
    }
    text.push_str("\n<control>\n");
    opcode(text, "default_path", format!("{}/", stem));
}

fn write_group(text: &mut String, group: &Group) {
    text.push_str("\n<group>\n");
    if !group.name.is_empty() {
        opcode(text, "group_label", &group.name);
    }
    let trigger = match group.trigger {
        TriggerType::Attack => None,
        TriggerType::Release => Some(TriggerMode::Release),
        TriggerType::First => Some(TriggerMode::First),
        TriggerType::Legato => Some(TriggerMode::Legato),
    };
    if let Some(trigger) = trigger {
        opcode(text, "trigger", trigger.as_str());
    }
}

/// Number of round robin zones sharing the ranges of `zone`.
fn sequence_length(zone: &SampleZone, group: &Group) -> usize {
    group
        .zones
        .iter()
        .filter(|z| {
            z.play_logic == PlayLogic::RoundRobin
                && z.key_low == zone.key_low
                && z.key_high == zone.key_high
                && z.velocity_low == zone.velocity_low
                && z.velocity_high == zone.velocity_high
        })
        .count()
}

fn write_envelope(text: &mut String, prefix: &str, envelope: &Envelope) {
    let stages = [
        ("delay", envelope.delay, 1.0),
        ("start", envelope.start, 100.0),
        ("attack", envelope.attack, 1.0),
        ("hold", envelope.hold, 1.0),
        ("decay", envelope.decay, 1.0),
        ("sustain", envelope.sustain, 100.0),
        ("release", envelope.release, 1.0),
    ];
    for (stage, value, scale) in stages {
        if let Some(value) = value {
            opcode(text, &format!("{}_{}", prefix, stage), number(value * scale));
        }
    }
}

fn write_region(
    text: &mut String,
    zone: &SampleZone,
    group: &Group,
    crossfade: &Crossfades,
    file_name: &str,
    sample_rate: u32,
) {
    text.push_str("\n<region>\n");
    opcode(text, "sample", file_name);
    opcode(text, "pitch_keycenter", zone.root_key());
    opcode(text, "lokey", zone.key_low);
    opcode(text, "hikey", zone.key_high);
    opcode(text, "lovel", zone.velocity_low);
    opcode(text, "hivel", zone.velocity_high);

    if crossfade.note_low > 0 {
        opcode(text, "xfin_lokey", zone.key_low);
        opcode(text, "xfin_hikey", zone.key_low as u16 + crossfade.note_low as u16);
    }
    if crossfade.note_high > 0 {
        opcode(text, "xfout_lokey", zone.key_high.saturating_sub(crossfade.note_high));
        opcode(text, "xfout_hikey", zone.key_high);
    }
    if crossfade.velocity_low > 0 {
        opcode(text, "xfin_lovel", zone.velocity_low);
        opcode(text, "xfin_hivel", zone.velocity_low as u16 + crossfade.velocity_low as u16);
    }
    if crossfade.velocity_high > 0 {
        opcode(text, "xfout_lovel", zone.velocity_high.saturating_sub(crossfade.velocity_high));
        opcode(text, "xfout_hivel", zone.velocity_high);
    }

    if zone.gain != 0.0 {
        opcode(text, "volume", number(zone.gain));
    }
    if zone.pan != 0.0 {
        opcode(text, "pan", number(zone.pan * 100.0));
    }
    if zone.tune != 0.0 {
        opcode(text, "tune", number(zone.tune * 100.0));
    }
    if zone.key_tracking != 1.0 {
        opcode(text, "pitch_keytrack", number(zone.key_tracking * 100.0));
    }
    opcode(text, "bend_up", zone.bend_up);
    opcode(text, "bend_down", zone.bend_down);

    if zone.start > 0 {
        opcode(text, "offset", zone.start);
    }
    if let Some(stop) = zone.stop {
        if stop > 1 {
            opcode(text, "end", stop - 1);
        }
    }
    if zone.reversed {
        opcode(text, "direction", "reverse");
    }
    if zone.play_logic == PlayLogic::RoundRobin {
        let length = sequence_length(zone, group);
        opcode(text, "seq_length", length);
        opcode(text, "seq_position", zone.sequence_position.unwrap_or(1));
    }

    match zone.loops.first() {
        Some(sample_loop) => {
            opcode(text, "loop_mode", LoopMode::LoopContinuous.as_str());
            opcode(text, "loop_start", sample_loop.start);
            opcode(text, "loop_end", sample_loop.end);
            let direction = match sample_loop.loop_type {
                LoopType::Forward => LoopDirection::Forward,
                LoopType::Backwards => LoopDirection::Backward,
                LoopType::Alternating => LoopDirection::Alternate,
            };
            if direction != LoopDirection::Forward {
                opcode(text, "loop_type", direction.as_str());
            }
            if let Some(fraction) = sample_loop.crossfade {
                if fraction > 0.0 && sample_rate > 0 {
                    let seconds = fraction * sample_loop.length() as f64 / sample_rate as f64;
                    opcode(text, "loop_crossfade", number(seconds));
                }
            }
        }
        None => opcode(text, "loop_mode", LoopMode::NoLoop.as_str()),
    }

    write_envelope(text, "ampeg", &zone.amplitude_envelope);

    if let Some(filter) = &zone.filter {
        let kind = FilterKind {
            kind: match filter.filter_type {
                FilterType::LowPass => FilterFamily::LowPass,
                FilterType::HighPass => FilterFamily::HighPass,
                FilterType::BandPass => FilterFamily::BandPass,
                FilterType::BandRejection => FilterFamily::BandReject,
            },
            poles: filter.poles,
        };
        opcode(text, "fil_type", kind.to_opcode());
        opcode(text, "cutoff", number(filter.cutoff));
        opcode(text, "resonance", number(filter.resonance * 40.0));
        if filter.envelope_depth != 0.0 {
            opcode(text, "fileg_depth", number(filter.envelope_depth));
        }
        write_envelope(text, "fileg", &filter.envelope);
    }

    if let Some(pitch) = &zone.pitch_modulation {
        opcode(text, "pitcheg_depth", number(pitch.depth));
        write_envelope(text, "pitcheg", &pitch.envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SfzDetector;
    use multiconv_model::notifier::CollectingNotifier;
    use multiconv_model::sample_data::{FileSampleData, PcmSampleData, SampleData};
    use multiconv_model::zone::SampleLoop;
    use multiconv_model::{
        ConversionError, DestinationOptions, DetectContext, Detector, EnvelopeModulation, Filter, MetadataSettings,
    };
    use std::sync::Arc;

    fn source() -> MultisampleSource {
        let sample: Arc<dyn SampleData> = Arc::new(PcmSampleData::new("s", 1, 44100, 16, vec![0; 1000]));

        let mut low = SampleZone::new("Low", sample.clone());
        low.key_low = 36;
        low.key_root = Some(40);
        low.key_high = 48;
        low.velocity_high = 100;
        low.note_crossfade_low = 6;
        low.gain = -3.5;
        low.pan = 0.25;
        low.tune = 0.1;
        low.stop = Some(1000);
        let mut sample_loop = SampleLoop::new(LoopType::Alternating, 100, 899);
        sample_loop.crossfade = Some(0.5);
        low.loops.push(sample_loop);
        low.amplitude_envelope.attack = Some(0.02);
        low.amplitude_envelope.sustain = Some(0.8);
        let mut filter = Filter::new(FilterType::LowPass, 4, 2000.0, 0.25);
        filter.envelope.release = Some(0.3);
        low.filter = Some(filter);
        low.pitch_modulation = Some(EnvelopeModulation {
            depth: 1200.0,
            envelope: Envelope {
                decay: Some(1.5),
                ..Default::default()
            },
        });

        let mut high = SampleZone::new("High", sample);
        high.key_low = 49;
        high.key_root = Some(55);
        high.key_high = 60;
        high.stop = Some(800);
        high.reversed = true;

        let mut group = Group::new("Soft");
        group.zones = vec![low, high];
        let mut release = Group::new("Release");
        release.trigger = TriggerType::Release;
        let mut rr = SampleZone::new(
            "Tail",
            Arc::new(PcmSampleData::new("t", 2, 48000, 24, vec![0; 200])) as Arc<dyn SampleData>,
        );
        rr.play_logic = PlayLogic::RoundRobin;
        rr.sequence_position = Some(1);
        release.zones.push(rr);

        let mut source = MultisampleSource::new("Grand", "/in/Grand.sfz");
        source.groups = vec![group, release];
        source
    }

    #[test]
    fn test_written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let path = SfzCreator
            .create(dir.path(), &source(), &CreateContext::new(&notifier, &options))
            .unwrap();
        assert_eq!(path, dir.path().join("Grand.sfz"));
        // the two zones of the first group share one sample file
        assert_eq!(fs::read_dir(dir.path().join("Grand")).unwrap().count(), 2);

        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let read = SfzDetector.read_file(&path, &ctx).unwrap().remove(0);
        assert_eq!(read.name, "Grand");
        assert_eq!(read.groups.len(), 2);
        assert_eq!(read.groups[0].name, "Soft");
        assert_eq!(read.groups[1].trigger, TriggerType::Release);

        let low = &read.groups[0].zones[0];
        assert_eq!((low.key_low, low.key_root, low.key_high), (36, Some(40), 48));
        assert_eq!((low.velocity_low, low.velocity_high), (1, 100));
        assert_eq!(low.note_crossfade_low, 6);
        assert!((low.gain + 3.5).abs() < 1e-6);
        assert!((low.pan - 0.25).abs() < 1e-6);
        assert!((low.tune - 0.1).abs() < 1e-6);
        assert_eq!(low.stop, Some(1000));
        assert_eq!((low.loops[0].start, low.loops[0].end), (100, 899));
        assert_eq!(low.loops[0].loop_type, LoopType::Alternating);
        assert!((low.loops[0].crossfade.unwrap() - 0.5).abs() < 1e-4);
        assert_eq!(low.amplitude_envelope.attack, Some(0.02));
        assert_eq!(low.amplitude_envelope.sustain, Some(0.8));
        let filter = low.filter.unwrap();
        assert_eq!((filter.filter_type, filter.poles), (FilterType::LowPass, 4));
        assert!((filter.resonance - 0.25).abs() < 1e-9);
        assert_eq!(filter.envelope_depth, 0.0);
        assert_eq!(filter.envelope.release, Some(0.3));
        assert_eq!(low.pitch_modulation.unwrap().depth, 1200.0);

        let high = &read.groups[0].zones[1];
        assert!(high.reversed);
        assert!(high.loops.is_empty());
        assert_eq!(high.stop, Some(800));

        let tail = &read.groups[1].zones[0];
        assert_eq!(tail.play_logic, PlayLogic::RoundRobin);
        assert_eq!(tail.sample.as_ref().unwrap().audio_metadata().unwrap().channels, 2);
    }

    #[test]
    fn test_existing_output_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Grand.sfz"), "keep").unwrap();
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let err = SfzCreator
            .create(dir.path(), &source(), &CreateContext::new(&notifier, &options))
            .unwrap_err();
        assert!(matches!(err, ConversionError::DestinationExists(_)));
        assert_eq!(fs::read_to_string(dir.path().join("Grand.sfz")).unwrap(), "keep");
        assert!(!dir.path().join("Grand").exists());
    }

    #[test]
    fn test_unwritable_sample_is_not_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let lost: Arc<dyn SampleData> = Arc::new(FileSampleData::new(dir.path().join("lost.wav")));
        let mut group = Group::new("Main");
        group.zones = vec![SampleZone::new("A", lost.clone()), SampleZone::new("B", lost)];
        let mut source = MultisampleSource::new("Lost", "/in/Lost.sfz");
        source.groups.push(group);

        let out = dir.path().join("out");
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let path = SfzCreator
            .create(&out, &source, &CreateContext::new(&notifier, &options))
            .unwrap();
        assert!(!fs::read_to_string(path).unwrap().contains("sample="));
        assert_eq!(notifier.errors().len(), 2);
        assert_eq!(fs::read_dir(out.join("Lost")).unwrap().count(), 0);
    }

    #[test]
    fn test_number_format() {
        assert_eq!(number(-3.5), "-3.5");
        assert_eq!(number(2000.0), "2000");
        assert_eq!(number(-0.0000001), "0");
        assert_eq!(number(0.0090589), "0.009059");
    }
}
