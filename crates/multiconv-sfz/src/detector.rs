//! Reads SFZ files into multi-sample sources.

use std::path::Path;

use multiconv_model::envelope::{Envelope, EnvelopeModulation, Filter, FilterType};
use multiconv_model::error::{ConversionError, Result};
use multiconv_model::metadata;
use multiconv_model::notifier::keys;
use multiconv_model::source::{Group, MultisampleSource, TriggerType};
use multiconv_model::zone::{LoopType, PlayLogic, SampleLoop, SampleZone};
use multiconv_model::{DetectContext, Detector};

use crate::parser::path_utils::is_generator;
use crate::parser::{
    normalize_path, parse_sfz_file, resolve_sample_path, Direction, Error, FilterFamily, FilterKind, LoopDirection,
    LoopMode, Note, SfzFile, SfzOpcodes, SfzSection, TriggerMode,
};
use crate::scope::{ProcessedOpcodes, Scope};

/// Reader for `.sfz` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfzDetector;

impl Detector for SfzDetector {
    fn name(&self) -> &'static str {
        "SFZ"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["sfz"]
    }

    fn read_file(&self, path: &Path, ctx: &DetectContext) -> Result<Vec<MultisampleSource>> {
        let sfz = parse_sfz_file(path).map_err(|e| parse_error(path, e))?;
        Ok(vec![read_sfz(&sfz, path, ctx)])
    }
}

fn parse_error(path: &Path, error: Error) -> ConversionError {
    match error {
        Error::IO(e) => ConversionError::Io(e),
        other => ConversionError::structural(path.display().to_string(), other.to_string()),
    }
}

/// Map a parsed SFZ file to a multi-sample.
///
/// Regions are collected into one group per `<group>` header; regions outside
/// of any group share one group. Regions whose sample cannot be read are
/// reported and skipped. Opcodes that were never used are reported once.
pub fn read_sfz(sfz: &SfzFile, path: &Path, ctx: &DetectContext) -> MultisampleSource {
    let processed = ProcessedOpcodes::new();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let folder = path
        .parent()
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().to_string());
    let name = metadata::source_name(&stem, folder.as_deref(), ctx.metadata);
    let mut source = MultisampleSource::new(name, path);

    let mut group_indices: Vec<(Option<usize>, usize)> = Vec::new();
    for region in &sfz.regions {
        let scope = Scope::region(sfz, region, &processed);
        let Some(zone) = read_region(sfz, region, &scope, ctx) else {
            continue;
        };

        let index = match group_indices.iter().find(|(g, _)| *g == region.group) {
            Some((_, index)) => *index,
            None => {
                let trigger = scope.opcode::<TriggerMode>("trigger");
                source.groups.push(new_group(sfz, region, &processed, trigger, source.groups.len()));
                group_indices.push((region.group, source.groups.len() - 1));
                source.groups.len() - 1
            }
        };
        source.groups[index].zones.push(zone);
    }

    let unused = processed.unused(sfz);
    if !unused.is_empty() {
        ctx.notifier
            .log(keys::UNUSED_OPCODES, &[&path.display(), &unused.join(", ")]);
    }
    source
}

fn new_group(
    sfz: &SfzFile,
    region: &SfzSection,
    processed: &ProcessedOpcodes,
    trigger: Option<TriggerMode>,
    position: usize,
) -> Group {
    let label = match sfz.group_of(region) {
        Some(section) => Scope::group(sfz, section, processed).opcode::<String>("group_label"),
        None => Scope::outer(sfz, region.master, processed).opcode::<String>("group_label"),
    };
    let mut group = Group::new(label.unwrap_or_else(|| format!("Group {}", position + 1)));
    group.trigger = match trigger {
        Some(TriggerMode::Release) => TriggerType::Release,
        Some(TriggerMode::First) => TriggerType::First,
        Some(TriggerMode::Legato) => TriggerType::Legato,
        Some(TriggerMode::Attack) | None => TriggerType::Attack,
    };
    group
}

fn read_region(sfz: &SfzFile, region: &SfzSection, scope: &Scope, ctx: &DetectContext) -> Option<SampleZone> {
    let Some(sample_name) = scope.opcode::<String>("sample") else {
        log::warn!("Region at line {} has no sample, skipping it", region.line);
        return None;
    };
    if is_generator(&sample_name) {
        log::debug!("Skipping generated sample {}", sample_name);
        return None;
    }
    let sample_path = resolve_sample_path(&sample_name, sfz.default_path(), sfz.source_file.as_deref());
    let sample = ctx.open_sample(&sample_path)?;
    let zone_name = Path::new(&normalize_path(&sample_name))
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut zone = SampleZone::new(zone_name, sample);
    read_key_range(&mut zone, scope);
    read_velocity_range(&mut zone, scope);
    read_playback(&mut zone, scope);
    let loop_mode = read_loop(&mut zone, scope);
    read_envelopes(&mut zone, scope);

    if let Err(e) = zone.backfill_from_sample() {
        ctx.notifier
            .log_error(keys::SAMPLE_MISSING, &[&sample_path.display(), &e]);
        return None;
    }
    if loop_mode.map_or(false, |mode| !mode.is_looped()) {
        zone.loops.clear();
    }
    if let Some(first) = zone.loops.first_mut() {
        if let Some(direction) = scope.opcode::<LoopDirection>("loop_type") {
            first.loop_type = loop_type(direction);
        }
    }
    read_loop_crossfade(&mut zone, scope);
    if zone.key_root.is_none() {
        zone.key_root = Some(60);
    }
    Some(zone)
}

fn clamp_key(key: i32) -> u8 {
    key.clamp(0, 127) as u8
}

fn clamp_width(width: i32) -> u8 {
    width.clamp(0, 127) as u8
}

/// Key range and key crossfades.
///
/// `xfin_lokey..xfin_hikey` is the fade-in range at the lower edge and becomes
/// the crossfade width `xfin_hikey - xfin_lokey`; `xfout_*` likewise at the
/// upper edge. The fade ranges only define the zone range when `lokey` or
/// `hikey` are absent.
fn read_key_range(zone: &mut SampleZone, scope: &Scope) {
    let note = |name: &str| scope.opcode::<Note>(name).map(|n| n.0);
    let offset = scope.opcode::<i32>("note_offset").unwrap_or(0) + 12 * scope.opcode::<i32>("octave_offset").unwrap_or(0);

    let key = note("key");
    let xfin = (note("xfin_lokey"), note("xfin_hikey"));
    let xfout = (note("xfout_lokey"), note("xfout_hikey"));

    let low = note("lokey").or(key).or(xfin.0).unwrap_or(0);
    let high = note("hikey").or(key).or(xfout.1).unwrap_or(127);
    zone.key_low = clamp_key(low + offset);
    zone.key_high = clamp_key(high + offset);

    zone.key_root = match scope.get_opcode_str("pitch_keycenter") {
        Some(value) if value.eq_ignore_ascii_case("sample") => None,
        _ => note("pitch_keycenter").or(key).map(|root| clamp_key(root + offset)),
    };

    if let (Some(from), Some(to)) = (xfin.0, xfin.1) {
        zone.note_crossfade_low = clamp_width(to - from);
    }
    if let (Some(from), Some(to)) = (xfout.0, xfout.1) {
        zone.note_crossfade_high = clamp_width(to - from);
    }
}

fn read_velocity_range(zone: &mut SampleZone, scope: &Scope) {
    let value = |name: &str| scope.opcode::<i32>(name);
    let xfin = (value("xfin_lovel"), value("xfin_hivel"));
    let xfout = (value("xfout_lovel"), value("xfout_hivel"));

    zone.velocity_low = value("lovel").or(xfin.0).unwrap_or(1).clamp(1, 127) as u8;
    zone.velocity_high = value("hivel").or(xfout.1).unwrap_or(127).clamp(1, 127) as u8;

    if let (Some(from), Some(to)) = (xfin.0, xfin.1) {
        zone.velocity_crossfade_low = clamp_width(to - from);
    }
    if let (Some(from), Some(to)) = (xfout.0, xfout.1) {
        zone.velocity_crossfade_high = clamp_width(to - from);
    }
}

fn read_playback(zone: &mut SampleZone, scope: &Scope) {
    let tune = scope.opcode::<f64>("tune").unwrap_or(0.0);
    let transpose = scope.opcode::<f64>("transpose").unwrap_or(0.0);
    zone.tune = transpose + tune / 100.0;
    if let Some(track) = scope.opcode::<f64>("pitch_keytrack") {
        zone.key_tracking = (track / 100.0).clamp(0.0, 1.0);
    }
    if let Some(up) = scope.opcode::<i32>("bend_up") {
        zone.bend_up = up;
    }
    if let Some(down) = scope.opcode::<i32>("bend_down") {
        zone.bend_down = down;
    }
    zone.gain = scope.opcode::<f64>("volume").unwrap_or(0.0);
    zone.pan = (scope.opcode::<f64>("pan").unwrap_or(0.0) / 100.0).clamp(-1.0, 1.0);

    zone.start = scope.opcode::<u32>("offset").unwrap_or(0);
    if let Some(end) = scope.opcode::<i32>("end") {
        if end > 0 {
            zone.stop = Some(end as u32 + 1);
        }
    }
    zone.reversed = scope.opcode::<Direction>("direction") == Some(Direction::Reverse);

    if scope.opcode::<u32>("seq_length").unwrap_or(1) > 1 {
        zone.play_logic = PlayLogic::RoundRobin;
        zone.sequence_position = Some(scope.opcode::<u32>("seq_position").unwrap_or(1).max(1));
    }
}

fn loop_type(direction: LoopDirection) -> LoopType {
    match direction {
        LoopDirection::Forward => LoopType::Forward,
        LoopDirection::Backward => LoopType::Backwards,
        LoopDirection::Alternate => LoopType::Alternating,
    }
}

/// Explicit loop points. Returns the loop mode if one is given.
fn read_loop(zone: &mut SampleZone, scope: &Scope) -> Option<LoopMode> {
    let mode = scope.opcode::<LoopMode>("loop_mode");
    let start = scope.opcode::<u32>("loop_start").or_else(|| scope.opcode("loopstart"));
    let end = scope.opcode::<u32>("loop_end").or_else(|| scope.opcode("loopend"));
    if let (Some(start), Some(end)) = (start, end) {
        if mode.map_or(true, LoopMode::is_looped) && start < end {
            zone.loops.push(SampleLoop::new(LoopType::Forward, start, end));
        }
    }
    mode
}

/// `loop_crossfade` is given in seconds and stored as a fraction of the loop.
fn read_loop_crossfade(zone: &mut SampleZone, scope: &Scope) {
    let Some(seconds) = scope.opcode::<f64>("loop_crossfade") else {
        return;
    };
    let Some(first) = zone.loops.first_mut() else {
        return;
    };
    let rate = zone
        .sample
        .as_ref()
        .and_then(|s| s.audio_metadata().ok())
        .map(|m| m.sample_rate)
        .unwrap_or(0);
    if rate == 0 || first.length() == 0 {
        return;
    }
    let loop_seconds = first.length() as f64 / rate as f64;
    first.crossfade = Some((seconds / loop_seconds).clamp(0.0, 1.0));
}

fn read_envelope(scope: &Scope, prefix: &str) -> Envelope {
    let time = |stage: &str| scope.opcode::<f64>(&format!("{}_{}", prefix, stage));
    let percent = |stage: &str| time(stage).map(|v| (v / 100.0).clamp(0.0, 1.0));
    Envelope {
        delay: time("delay"),
        start: percent("start"),
        attack: time("attack"),
        hold: time("hold"),
        decay: time("decay"),
        sustain: percent("sustain"),
        release: time("release"),
    }
}

fn read_envelopes(zone: &mut SampleZone, scope: &Scope) {
    zone.amplitude_envelope = read_envelope(scope, "ampeg");

    let pitch_envelope = read_envelope(scope, "pitcheg");
    let pitch_depth = scope.opcode::<f64>("pitcheg_depth").unwrap_or(0.0);
    if pitch_depth != 0.0 {
        zone.pitch_modulation = Some(EnvelopeModulation {
            depth: pitch_depth,
            envelope: pitch_envelope,
        });
    }

    let Some(cutoff) = scope.opcode::<f64>("cutoff") else {
        return;
    };
    let kind = scope.opcode::<FilterKind>("fil_type").unwrap_or_default();
    let filter_type = match kind.kind {
        FilterFamily::LowPass => FilterType::LowPass,
        FilterFamily::HighPass => FilterType::HighPass,
        FilterFamily::BandPass => FilterType::BandPass,
        FilterFamily::BandReject => FilterType::BandRejection,
    };
    let resonance = scope.opcode::<f64>("resonance").unwrap_or(0.0) / 40.0;
    let mut filter = Filter::new(filter_type, kind.poles, cutoff, resonance);
    filter.envelope_depth = scope.opcode::<f64>("fileg_depth").unwrap_or(0.0);
    filter.envelope = read_envelope(scope, "fileg");
    zone.filter = Some(filter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiconv_model::notifier::CollectingNotifier;
    use multiconv_model::sample_data::{PcmSampleData, SampleData};
    use multiconv_model::MetadataSettings;
    use std::fs::{self, File};

    fn write_wav(path: &Path, frames: usize) {
        let pcm = PcmSampleData::new("s", 1, 44100, 16, vec![0; frames]);
        let mut file = File::create(path).unwrap();
        pcm.write_sample(&mut file).unwrap();
    }

    fn read(content: &str, samples: &[&str]) -> (MultisampleSource, CollectingNotifier) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("samples")).unwrap();
        for sample in samples {
            write_wav(&dir.path().join("samples").join(sample), 44100);
        }
        let path = dir.path().join("Test.sfz");
        fs::write(&path, content).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let mut sources = SfzDetector.read_file(&path, &ctx).unwrap();
        (sources.remove(0), notifier)
    }

    #[test]
    fn test_crossfade_range_becomes_width() {
        let (source, _) = read(
            "<control> default_path=samples/\n<region> sample=a.wav lokey=36 hikey=48 xfin_lokey=30 xfin_hikey=36",
            &["a.wav"],
        );
        let zone = &source.groups[0].zones[0];
        assert_eq!(zone.key_low, 36);
        assert_eq!(zone.key_high, 48);
        assert_eq!(zone.note_crossfade_low, 6);
        assert_eq!(zone.note_crossfade_high, 0);
    }

    #[test]
    fn test_inheritance_and_mapping() {
        let content = r#"
            <control> default_path=samples/
            <global> volume=-6 ampeg_release=0.5 ampeg_sustain=50
            <group> group_label=Soft lovel=1 hivel=64 trigger=release
            <region> sample=Piano C4.wav key=c4 tune=-25 pan=-50 loop_mode=loop_continuous loop_start=100 loop_end=4509 loop_crossfade=0.01
            <region> sample=Piano D4.wav lokey=61 hikey=63 pitch_keycenter=62 volume=-3 direction=reverse cutoff=1000 fil_type=hpf_1p resonance=20
            <group> seq_length=2 seq_position=2
            <region> sample=Piano C4.wav offset=10 end=999
        "#;
        let (source, _) = read(content, &["Piano C4.wav", "Piano D4.wav"]);
        assert_eq!(source.name, "Test");
        assert_eq!(source.groups.len(), 2);

        let soft = &source.groups[0];
        assert_eq!(soft.name, "Soft");
        assert_eq!(soft.trigger, TriggerType::Release);
        let c4 = &soft.zones[0];
        assert_eq!(c4.name, "Piano C4");
        assert_eq!((c4.key_low, c4.key_root, c4.key_high), (60, Some(60), 60));
        assert_eq!((c4.velocity_low, c4.velocity_high), (1, 64));
        assert_eq!(c4.gain, -6.0);
        assert!((c4.tune + 0.25).abs() < 1e-9);
        assert!((c4.pan + 0.5).abs() < 1e-9);
        assert_eq!(c4.amplitude_envelope.release, Some(0.5));
        assert_eq!(c4.amplitude_envelope.sustain, Some(0.5));
        assert_eq!((c4.loops[0].start, c4.loops[0].end), (100, 4509));
        let crossfade = c4.loops[0].crossfade.unwrap();
        assert!((crossfade - 0.01 / (4409.0 / 44100.0)).abs() < 1e-9);

        let d4 = &soft.zones[1];
        assert_eq!((d4.key_low, d4.key_root, d4.key_high), (61, Some(62), 63));
        assert_eq!(d4.gain, -3.0);
        assert!(d4.reversed);
        let filter = d4.filter.unwrap();
        assert_eq!(filter.filter_type, FilterType::HighPass);
        assert_eq!(filter.poles, 1);
        assert!((filter.resonance - 0.5).abs() < 1e-9);

        let rr = &source.groups[1].zones[0];
        assert_eq!(source.groups[1].name, "Group 2");
        assert_eq!(rr.play_logic, PlayLogic::RoundRobin);
        assert_eq!(rr.sequence_position, Some(2));
        assert_eq!((rr.start, rr.stop), (10, Some(1000)));
        assert_eq!(rr.key_root, Some(60));
    }

    #[test]
    fn test_missing_sample_skips_region() {
        let (source, notifier) = read(
            "<region> sample=samples/gone.wav key=60 <region> sample=samples/a.wav key=62",
            &["a.wav"],
        );
        assert_eq!(source.zone_count(), 1);
        assert_eq!(source.groups[0].zones[0].key_low, 62);
        assert!(notifier.contains(keys::SAMPLE_MISSING));
    }

    #[test]
    fn test_unused_opcodes_are_reported() {
        let (_, notifier) = read(
            "<region> sample=samples/a.wav key=60 amp_velcurve_127=1 <region> sample=samples/a.wav amp_velcurve_127=1",
            &["a.wav"],
        );
        let messages = notifier.messages();
        let unused: Vec<_> = messages.iter().filter(|m| m.key == keys::UNUSED_OPCODES).collect();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].args[1], "amp_velcurve_127");
    }

    #[test]
    fn test_no_loop_clears_sample_loops() {
        let (source, _) = read(
            "<region> sample=samples/a.wav loop_mode=one_shot loop_start=10 loop_end=100",
            &["a.wav"],
        );
        assert!(source.groups[0].zones[0].loops.is_empty());
        assert_eq!(source.groups[0].zones[0].stop, Some(44100));
    }

    #[test]
    fn test_invalid_file_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.sfz");
        fs::write(&path, "<region> sample=a.wav <regi").unwrap();
        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let err = SfzDetector.read_file(&path, &ctx).unwrap_err();
        assert!(matches!(err, ConversionError::Structural { .. }));
    }
}
