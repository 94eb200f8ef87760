//! Korg multisamples: one `.KMP` file with the key splits and one `.KSF`
//! file per sample, all in the same folder.
//!
//! KSF files are mono or stereo, but many instruments only play mono files.
//! Stereo samples are therefore written as two mono files `<name>-L.KSF` and
//! `<name>-R.KSF` sharing one key range; the reader combines such pairs again.

pub mod kmp;
pub mod ksf;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use multiconv_model::destination::reserve_output;
use multiconv_model::naming::{ascii_file_name, sample_file_name};
use multiconv_model::notifier::keys;
use multiconv_model::stereo::{combine_split_stereo, Channel};
use multiconv_model::units::{denormalize_pan, normalize_pan};
use multiconv_model::{
    ConversionError, CreateContext, Creator, DetectContext, Detector, Group, LoopType, MultisampleSource,
    PcmSampleData, Result, SampleLoop, SampleZone,
};

use self::kmp::{KmpFile, Split, FILE_NAME_LENGTH, LONG_NAME_LENGTH, MAX_SPLITS, NAME_LENGTH, PAN_CENTER};
use self::ksf::{KsfFile, ATTRIBUTE_NO_LOOP, ATTRIBUTE_REVERSE};

const PAN_RANGE: f64 = 63.0;

/// Split file names that do not reference a sample.
const NO_SAMPLE: &[&str] = &["", "SKIPPEDSAMPL"];

/// Find `name` in `folder`, ignoring the case of the file name.
fn resolve_file(folder: &Path, name: &str) -> Option<PathBuf> {
    let direct = folder.join(name);
    if direct.is_file() {
        return Some(direct);
    }
    fs::read_dir(folder)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map_or(false, |n| n.to_string_lossy().eq_ignore_ascii_case(name))
        })
}

/// Reads `.KMP` files and the `.KSF` samples next to them.
#[derive(Debug, Default, Clone, Copy)]
pub struct KorgDetector;

impl Detector for KorgDetector {
    fn name(&self) -> &'static str {
        "Korg KMP/KSF"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["kmp"]
    }

    fn read_file(&self, path: &Path, ctx: &DetectContext) -> Result<Vec<MultisampleSource>> {
        let data = fs::read(path)?;
        let file = path.display().to_string();
        let kmp = KmpFile::parse(&data, &file)?;
        let folder = path.parent().unwrap_or_else(|| Path::new("."));

        let name = match kmp.display_name().trim() {
            "" => path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
            name => name.to_string(),
        };
        let mut source = MultisampleSource::new(name.clone(), path);

        let mut zones = Vec::new();
        for (split, low_key) in kmp.splits.iter().zip(kmp.low_keys()) {
            if NO_SAMPLE.contains(&split.file_name.as_str()) {
                continue;
            }
            let Some(ksf_path) = resolve_file(folder, &split.file_name) else {
                ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&folder.join(&split.file_name).display()]);
                continue;
            };
            let ksf = fs::read(&ksf_path)
                .map_err(ConversionError::from)
                .and_then(|data| KsfFile::parse(&data, &ksf_path.display().to_string()));
            match ksf {
                Ok(ksf) => zones.push(map_split(split, low_key, &ksf, &ksf_path)),
                Err(e) => ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&ksf_path.display(), &e]),
            }
        }

        let mut group = Group::new(name);
        group.zones = combine_split_stereo(zones);
        source.groups.push(group);
        Ok(vec![source])
    }
}

fn map_split(split: &Split, low_key: u8, ksf: &KsfFile, path: &Path) -> SampleZone {
    let name = if ksf.name.trim().is_empty() {
        path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
    } else {
        ksf.name.trim().to_string()
    };
    let mut zone = SampleZone::new(name, Arc::new(ksf.to_pcm()));
    zone.key_low = low_key.min(split.top_key);
    zone.key_high = split.top_key;
    zone.key_root = Some(split.original_key.min(127));
    if split.fixed_pitch {
        zone.key_tracking = 0.0;
    }
    zone.tune = f64::from(split.tune) / 100.0;
    zone.gain = f64::from(split.level);
    zone.pan = normalize_pan(f64::from(split.pan) - f64::from(PAN_CENTER), PAN_RANGE);
    zone.start = ksf.start;
    zone.stop = Some(ksf.end.saturating_add(1).min(ksf.frames()));
    zone.reversed = ksf.is_reversed();
    if ksf.is_looped() && ksf.loop_start <= ksf.end {
        zone.loops.push(SampleLoop::new(LoopType::Forward, ksf.loop_start, ksf.end));
    }
    if ksf.loop_tune != 0 {
        log::debug!("{}: ignoring loop tune of {} cents", zone.name, ksf.loop_tune);
    }
    zone
}

/// Writes a folder with one `.KMP` and its `.KSF` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct KorgCreator;

impl Creator for KorgCreator {
    fn name(&self) -> &'static str {
        "Korg KMP/KSF"
    }

    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf> {
        let stem = reserve_output(folder, &source.name, |s: &str| vec![PathBuf::from(s)], ctx.options)?;
        let out = folder.join(&stem);
        fs::create_dir_all(&out)?;
        let kmp_path = out.join(format!("{}.KMP", ascii_file_name(&stem, 8).to_uppercase()));
        ctx.notifier.log(keys::CREATING, &[&kmp_path.display()]);

        let mut writer = SplitWriter {
            out: &out,
            ctx,
            file_names: Vec::new(),
            splits: Vec::new(),
        };
        for (group_index, zone_index, zone) in playable_zones(source, ctx) {
            let name = sample_file_name(&source.name, &zone.name, group_index, zone_index, None);
            writer.write_zone(zone, &name)?;
        }
        if writer.splits.len() > MAX_SPLITS {
            ctx.notifier
                .log_error(keys::KEYGROUP_LIMIT, &[&source.name, &writer.splits.len(), &MAX_SPLITS]);
        }

        let kmp = KmpFile {
            name: truncate(&source.name, NAME_LENGTH),
            long_name: Some(truncate(&source.name, LONG_NAME_LENGTH)),
            attributes: 0,
            splits: writer.splits,
            number: None,
        };
        fs::write(&kmp_path, kmp.write())?;
        Ok(kmp_path)
    }
}

fn truncate(text: &str, length: usize) -> String {
    text.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).take(length).collect()
}

/// Zones of all groups ordered by key range. Korg splits cannot overlap, so
/// of overlapping zones only the first is kept.
fn playable_zones<'a>(source: &'a MultisampleSource, ctx: &CreateContext) -> Vec<(usize, usize, &'a SampleZone)> {
    let mut zones: Vec<(usize, usize, &SampleZone)> = source
        .groups
        .iter()
        .enumerate()
        .flat_map(|(gi, group)| group.zones.iter().enumerate().map(move |(zi, zone)| (gi, zi, zone)))
        .collect();
    zones.sort_by_key(|(_, _, zone)| (zone.key_high, zone.key_low));

    let mut kept: Vec<(usize, usize, &SampleZone)> = Vec::with_capacity(zones.len());
    for entry in zones {
        let zone = entry.2;
        let overlapping = kept
            .iter()
            .any(|(_, _, other)| zone.key_low <= other.key_high && other.key_low <= zone.key_high);
        if overlapping {
            ctx.notifier.log_error(keys::LAYER_OVERLAP, &[&zone.name, &zone.key_low, &zone.key_high]);
            continue;
        }
        kept.push(entry);
    }
    kept
}

struct SplitWriter<'a> {
    out: &'a Path,
    ctx: &'a CreateContext<'a>,
    file_names: Vec<String>,
    splits: Vec<Split>,
}

impl SplitWriter<'_> {
    /// A free 8.3 file name based on `name`.
    fn file_name(&mut self, name: &str, suffix: &str) -> String {
        let max = FILE_NAME_LENGTH - ".KSF".len() - suffix.len();
        let base = ascii_file_name(name, max).to_uppercase();
        let mut candidate = format!("{}{}.KSF", base, suffix);
        let mut counter = self.file_names.len();
        while self.file_names.iter().any(|n| n.eq_ignore_ascii_case(&candidate)) {
            let digits = counter.to_string();
            let kept: String = base.chars().take(max.saturating_sub(digits.len())).collect();
            candidate = format!("{}{}{}.KSF", kept, digits, suffix);
            counter += 1;
        }
        self.file_names.push(candidate.clone());
        candidate
    }

    fn write_zone(&mut self, zone: &SampleZone, name: &str) -> Result<()> {
        let Some(sample) = &zone.sample else {
            self.ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&name]);
            return Ok(());
        };
        let pcm = match PcmSampleData::from_sample(sample.as_ref()) {
            Ok(pcm) => pcm,
            Err(e) if e.is_zone_local() => {
                self.ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&sample.description(), &e]);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if zone.loops.len() > 1 {
            self.ctx.notifier.log(keys::LOOPS_TRUNCATED, &[&zone.name, &zone.loops.len()]);
        }

        if pcm.channels >= 2 {
            self.ctx.notifier.log(keys::STEREO_SPLIT, &[&name]);
            for (index, channel) in [Channel::Left, Channel::Right].into_iter().enumerate() {
                let mono = PcmSampleData::new(name, 1, pcm.sample_rate, pcm.bits_per_sample, pcm.channel(index as u16));
                self.write_split(zone, name, &mono, Some(channel))?;
            }
            Ok(())
        } else {
            self.write_split(zone, name, &pcm, None)
        }
    }

    fn write_split(&mut self, zone: &SampleZone, name: &str, pcm: &PcmSampleData, channel: Option<Channel>) -> Result<()> {
        let suffix = channel.map_or("", Channel::suffix);
        let sample_name = format!("{}{}", truncate(name, ksf::NAME_LENGTH - suffix.len()), suffix);
        let mut ksf = KsfFile::from_pcm(&sample_name, pcm);
        let frames = ksf.frames();
        ksf.start = zone.start.min(frames.saturating_sub(1));
        if let Some(stop) = zone.stop {
            ksf.end = stop.saturating_sub(1).min(ksf.end);
        }
        if let Some(sample_loop) = zone.loops.first() {
            ksf.attributes &= !ATTRIBUTE_NO_LOOP;
            ksf.loop_start = sample_loop.start.min(ksf.end);
            ksf.end = sample_loop.end.min(ksf.end);
        }
        if zone.reversed {
            ksf.attributes |= ATTRIBUTE_REVERSE;
        }

        let file_name = self.file_name(name, suffix);
        fs::write(self.out.join(&file_name), ksf.write())?;

        self.splits.push(Split {
            original_key: zone.root_key(),
            fixed_pitch: zone.key_tracking == 0.0,
            top_key: zone.key_high,
            tune: (zone.tune * 100.0).round().clamp(-99.0, 99.0) as i8,
            level: zone.gain.round().clamp(-99.0, 99.0) as i8,
            pan: (denormalize_pan(zone.pan, PAN_RANGE).round() + f64::from(PAN_CENTER)).clamp(0.0, 127.0) as u8,
            cutoff: 0,
            file_name,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiconv_model::{CollectingNotifier, DestinationOptions, MetadataSettings, SampleData};

    fn zone(name: &str, channels: u16, keys: (u8, u8), root: u8) -> SampleZone {
        let samples = (0..200 * channels as i32).map(|i| (i % 50) * 10).collect();
        let pcm = PcmSampleData::new(name, channels, 44100, 16, samples);
        let mut zone = SampleZone::new(name, Arc::new(pcm));
        zone.key_low = keys.0;
        zone.key_high = keys.1;
        zone.key_root = Some(root);
        zone
    }

    fn source(zones: Vec<SampleZone>) -> MultisampleSource {
        let mut source = MultisampleSource::new("Grand Piano", "/tmp/piano.sfz");
        let mut group = Group::new("Main");
        group.zones = zones;
        source.groups.push(group);
        source
    }

    #[test]
    fn test_stereo_is_split_and_combined_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut stereo = zone("Piano", 2, (0, 59), 48);
        stereo.loops.push(SampleLoop::new(LoopType::Forward, 20, 180));
        stereo.gain = -3.0;
        stereo.pan = 1.0;
        let mono = zone("Bright", 1, (60, 127), 72);
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        let kmp_path = KorgCreator.create(dir.path(), &source(vec![stereo, mono]), &ctx).unwrap();
        assert!(notifier.contains(keys::STEREO_SPLIT));
        assert!(kmp_path.with_file_name("PIANO-L.KSF").is_file());
        assert!(kmp_path.with_file_name("PIANO-R.KSF").is_file());

        let settings = MetadataSettings::default();
        let detect = DetectContext::new(&notifier, &settings);
        let sources = KorgDetector.read_file(&kmp_path, &detect).unwrap();
        assert_eq!(sources[0].name, "Grand Piano");
        let zones = &sources[0].groups[0].zones;
        assert_eq!(zones.len(), 2);

        let piano = &zones[0];
        assert_eq!(piano.name, "Piano");
        assert_eq!((piano.key_low, piano.key_high, piano.key_root), (0, 59, Some(48)));
        assert_eq!(piano.loops, vec![SampleLoop::new(LoopType::Forward, 20, 180)]);
        assert_eq!(piano.gain, -3.0);
        assert!((piano.pan - 1.0).abs() < 1e-9);
        let meta = piano.sample.as_ref().unwrap().audio_metadata().unwrap();
        assert_eq!(meta.channels, 2);

        let bright = &zones[1];
        assert_eq!((bright.key_low, bright.key_high), (60, 127));
        assert!(bright.loops.is_empty());
        assert_eq!(bright.stop, Some(200));
    }

    #[test]
    fn test_overlapping_layers_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut soft = zone("Soft", 1, (0, 127), 60);
        soft.velocity_high = 64;
        let mut loud = zone("Loud", 1, (0, 127), 60);
        loud.velocity_low = 65;
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        let kmp_path = KorgCreator.create(dir.path(), &source(vec![soft, loud]), &ctx).unwrap();
        assert!(notifier.contains(keys::LAYER_OVERLAP));
        let kmp = KmpFile::parse(&fs::read(kmp_path).unwrap(), "x").unwrap();
        assert_eq!(kmp.splits.len(), 1);
    }

    #[test]
    fn test_duplicate_names_get_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let zones = vec![zone("Strings", 1, (0, 40), 30), zone("Strings", 1, (41, 80), 60)];
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let ctx = CreateContext::new(&notifier, &options);
        let kmp_path = KorgCreator.create(dir.path(), &source(zones), &ctx).unwrap();
        let kmp = KmpFile::parse(&fs::read(kmp_path).unwrap(), "x").unwrap();
        let names: Vec<&str> = kmp.splits.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["STRINGS.KSF", "STRINGS1.KSF"]);
    }

    fn write_ksf(folder: &Path, file_name: &str, sample_name: &str, loop_start: u32) {
        let pcm = PcmSampleData::new(sample_name, 1, 44100, 16, (0..200).map(|i| i * 10).collect());
        let mut ksf = KsfFile::from_pcm(sample_name, &pcm);
        ksf.attributes &= !ATTRIBUTE_NO_LOOP;
        ksf.loop_start = loop_start;
        ksf.end = 180;
        fs::write(folder.join(file_name), ksf.write()).unwrap();
    }

    fn split(file_name: &str, top_key: u8) -> Split {
        Split {
            original_key: 48,
            top_key,
            pan: PAN_CENTER,
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_pair_keeps_left_loop() {
        let dir = tempfile::tempdir().unwrap();
        write_ksf(dir.path(), "PIANO-L.KSF", "Piano-L", 20);
        write_ksf(dir.path(), "PIANO-R.KSF", "Piano-R", 40);
        let kmp = KmpFile {
            name: "Piano".to_string(),
            splits: vec![split("PIANO-L.KSF", 59), split("PIANO-R.KSF", 59)],
            ..Default::default()
        };
        let path = dir.path().join("PIANO.KMP");
        fs::write(&path, kmp.write()).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KorgDetector.read_file(&path, &ctx).unwrap();
        let zones = &sources[0].groups[0].zones;
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "Piano");
        assert_eq!((zones[0].key_low, zones[0].key_high), (0, 59));
        assert_eq!(zones[0].loops, vec![SampleLoop::new(LoopType::Forward, 20, 180)]);
        let meta = zones[0].sample.as_ref().unwrap().audio_metadata().unwrap();
        assert_eq!(meta.channels, 2);
    }

    #[test]
    fn test_corrupt_ksf_skips_its_split() {
        let dir = tempfile::tempdir().unwrap();
        write_ksf(dir.path(), "GOOD.KSF", "Good", 0);
        fs::write(dir.path().join("BAD.KSF"), b"garbage!").unwrap();
        let kmp = KmpFile {
            name: "Mixed".to_string(),
            splits: vec![split("GOOD.KSF", 59), split("BAD.KSF", 127)],
            ..Default::default()
        };
        let path = dir.path().join("MIXED.KMP");
        fs::write(&path, kmp.write()).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KorgDetector.read_file(&path, &ctx).unwrap();
        assert_eq!(sources[0].zone_count(), 1);
        assert_eq!(sources[0].groups[0].zones[0].name, "Good");
        assert!(notifier.contains(keys::SAMPLE_MISSING));
    }

    #[test]
    fn test_missing_ksf_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let kmp = KmpFile {
            name: "Lost".to_string(),
            splits: vec![Split {
                file_name: "GONE.KSF".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let path = dir.path().join("LOST.KMP");
        fs::write(&path, kmp.write()).unwrap();
        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KorgDetector.read_file(&path, &ctx).unwrap();
        assert_eq!(sources[0].zone_count(), 0);
        assert!(notifier.contains(keys::SAMPLE_MISSING));
    }
}
