//! Kontakt instruments (`.nki`) and multis (`.nkm`).
//!
//! Three generations of the format are told apart by their header, see
//! [`KontaktFormat`]. Kontakt 1 and Kontakt 5+ are read into the same
//! [`Program`] view and mapped to multi-samples from there. Kontakt 2 to 4
//! files are recognized and reported as unsupported.

pub mod k1;
pub mod ni_container;
pub mod preset;
pub mod program;

use std::fs;
use std::path::Path;

use multiconv_model::notifier::keys;
use multiconv_model::{
    ConversionError, DetectContext, Detector, Envelope, Group, LoopType, Metadata, MultisampleSource,
    PerformanceInstrument, PerformanceSource, PlayLogic, Result, SampleLoop, SampleZone, TriggerType,
};

use self::ni_container::{is_container, NiChunkType, NiItem, SoundInfo, DOMAIN_KONTAKT};
use self::preset::{parse_preset_chunks, PresetChunk, PresetChunkId};
use self::program::{Bank, KontaktGroup, KontaktZone, Program};

const K2_MAGICS: [u32; 2] = [0x1290_A87F, 0xAB85_EF01];

/// The generations of the Kontakt file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KontaktFormat {
    /// zlib compressed XML.
    Kontakt1,
    /// Proprietary binary format of Kontakt 2 to 4.
    Kontakt2To4 { magic: u32 },
    /// NI-Container of Kontakt 5 and later.
    Container,
}

impl KontaktFormat {
    pub fn detect(data: &[u8]) -> Option<Self> {
        if is_container(data) {
            return Some(Self::Container);
        }
        let magic = u32::from_le_bytes(data.get(..4)?.try_into().ok()?);
        if magic == k1::MAGIC {
            Some(Self::Kontakt1)
        } else if K2_MAGICS.contains(&magic) {
            Some(Self::Kontakt2To4 { magic })
        } else {
            None
        }
    }
}

/// What a Kontakt file holds after the container has been unpacked.
enum KontaktContent {
    Program(Program, Metadata),
    Bank(Bank, Metadata),
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
}

fn metadata_from(info: &SoundInfo) -> Metadata {
    let non_empty = |text: &str| (!text.trim().is_empty()).then(|| text.trim().to_string());
    Metadata {
        creator: non_empty(&info.author),
        description: non_empty(&info.description),
        keywords: info.tags.clone(),
        ..Default::default()
    }
}

/// The preset chunks of the container, preferring the ones of the Kontakt domain.
fn container_presets(item: &NiItem, file: &str) -> Result<Vec<PresetChunk>> {
    let candidates = item.find_all(NiChunkType::PresetChunk);
    let chunk = candidates
        .iter()
        .find(|c| c.domain == DOMAIN_KONTAKT)
        .or_else(|| candidates.first())
        .and_then(|c| c.data());
    match chunk {
        Some(data) => Ok(parse_preset_chunks(data)?),
        None if item.has_encrypted_subtree() => Err(ConversionError::Encrypted(file.to_string())),
        None => Err(ConversionError::structural(file, "no preset chunk found")),
    }
}

fn find_chunk(chunks: &[PresetChunk], id: PresetChunkId) -> Option<&PresetChunk> {
    chunks.iter().find_map(|c| c.find(id))
}

fn read_content(data: &[u8], file: &str) -> Result<KontaktContent> {
    match KontaktFormat::detect(data) {
        Some(KontaktFormat::Kontakt1) => Ok(KontaktContent::Program(k1::parse_k1(data, file)?, Metadata::default())),
        Some(KontaktFormat::Kontakt2To4 { magic }) => Err(ConversionError::Unsupported(format!(
            "Kontakt 2 to 4 file (header {:08X})",
            magic
        ))),
        Some(KontaktFormat::Container) => {
            let item = NiItem::parse(data)?;
            let metadata = match item.find(NiChunkType::SoundInfo).and_then(|c| c.data()) {
                Some(info) => metadata_from(&SoundInfo::parse(info)?),
                None => Metadata::default(),
            };
            let chunks = container_presets(&item, file)?;
            if let Some(bank) = find_chunk(&chunks, PresetChunkId::Bank) {
                return Ok(KontaktContent::Bank(Bank::from_chunk(bank)?, metadata));
            }
            match find_chunk(&chunks, PresetChunkId::Program) {
                Some(program) => Ok(KontaktContent::Program(Program::from_chunk(program)?, metadata)),
                None => Err(ConversionError::structural(file, "preset holds neither a program nor a bank")),
            }
        }
        None => Err(ConversionError::structural(file, "unknown Kontakt header")),
    }
}

fn trigger(value: u8) -> TriggerType {
    match value {
        program::TRIGGER_RELEASE => TriggerType::Release,
        program::TRIGGER_FIRST => TriggerType::First,
        program::TRIGGER_LEGATO => TriggerType::Legato,
        _ => TriggerType::Attack,
    }
}

fn loop_type(mode: u8) -> Option<LoopType> {
    match mode {
        program::LOOP_FORWARD => Some(LoopType::Forward),
        program::LOOP_ALTERNATING => Some(LoopType::Alternating),
        program::LOOP_BACKWARD => Some(LoopType::Backwards),
        _ => None,
    }
}

fn envelope(group: &KontaktGroup) -> Envelope {
    let Some(env) = group.envelope else {
        return Envelope::default();
    };
    Envelope {
        attack: env.attack.map(f64::from),
        hold: env.hold.map(f64::from),
        decay: env.decay.map(f64::from),
        sustain: env.sustain.map(f64::from),
        release: env.release.map(f64::from),
        ..Default::default()
    }
}

/// Maps a [`Program`] onto the model, resolving sample files relative to `folder`.
struct ProgramMapper<'a> {
    program: &'a Program,
    folder: &'a Path,
    ctx: &'a DetectContext<'a>,
}

impl ProgramMapper<'_> {
    fn map(&self, path: &Path) -> Result<MultisampleSource> {
        let name = if self.program.name.trim().is_empty() {
            file_stem(path)
        } else {
            self.program.name.trim().to_string()
        };
        let mut source = MultisampleSource::new(name, path);

        for group in &self.program.groups {
            let mut mapped = Group::new(group.name.clone());
            mapped.trigger = trigger(group.trigger);
            source.groups.push(mapped);
        }
        if source.groups.is_empty() {
            source.groups.push(Group::new(source.name.clone()));
        }

        let sequence = self.round_robin_positions();
        for zone in &self.program.zones {
            let index = zone.group_index as usize;
            let Some(group) = source.groups.get_mut(index) else {
                return Err(ConversionError::MissingData(format!(
                    "zone references group {} of {}",
                    index,
                    self.program.groups.len()
                )));
            };
            let kontakt_group = self.program.groups.get(index);
            if let Some(mapped) = self.map_zone(zone, kontakt_group, sequence.get(index).copied().flatten()) {
                group.zones.push(mapped);
            }
        }
        Ok(source)
    }

    /// The 1-based round robin position of every group, `None` for groups
    /// that always play.
    fn round_robin_positions(&self) -> Vec<Option<u32>> {
        let mut position = 0;
        self.program
            .groups
            .iter()
            .map(|g| {
                g.round_robin.then(|| {
                    position += 1;
                    position
                })
            })
            .collect()
    }

    fn map_zone(&self, zone: &KontaktZone, group: Option<&KontaktGroup>, sequence: Option<u32>) -> Option<SampleZone> {
        let file = match self.program.filenames.get(zone.filename_index as usize) {
            Some(file) => file,
            None => {
                log::warn!("Zone without sample file at keys {}-{}", zone.low_key, zone.high_key);
                return None;
            }
        };
        let sample_path = self.folder.join(file.replace('\\', "/"));
        let sample = self.ctx.open_sample(&sample_path)?;
        let frames = sample.audio_metadata().map(|m| m.frames).ok();

        let mut mapped = SampleZone::new(file_stem(&sample_path), sample);
        mapped.start = zone.sample_start;
        mapped.stop = (zone.sample_end > zone.sample_start).then_some(zone.sample_end);
        mapped.key_low = zone.low_key.min(127);
        mapped.key_high = zone.high_key.min(127);
        mapped.key_root = Some(zone.root_key.min(127));
        mapped.velocity_low = zone.low_velocity.clamp(1, 127);
        mapped.velocity_high = zone.high_velocity.clamp(1, 127);
        mapped.note_crossfade_low = zone.fade_low_key;
        mapped.note_crossfade_high = zone.fade_high_key;
        mapped.velocity_crossfade_low = zone.fade_low_velocity;
        mapped.velocity_crossfade_high = zone.fade_high_velocity;

        let (group_volume, group_pan, group_tune) = group.map_or((0.0, 0.0, 0.0), |g| (g.volume, g.pan, g.tune));
        mapped.gain = f64::from(self.program.volume + group_volume + zone.volume);
        mapped.pan = f64::from(self.program.pan + group_pan + zone.pan).clamp(-1.0, 1.0);
        mapped.tune = f64::from(self.program.tune + group_tune + zone.tune);
        mapped.reversed = zone.reverse;
        if let Some(position) = sequence {
            mapped.play_logic = PlayLogic::RoundRobin;
            mapped.sequence_position = Some(position);
        }
        if let Some(group) = group {
            mapped.amplitude_envelope = envelope(group);
        }

        for l in &zone.loops {
            let Some(loop_type) = loop_type(l.mode) else {
                continue;
            };
            if l.length == 0 {
                continue;
            }
            let end = l
                .start
                .checked_add(l.length - 1)
                .filter(|end| frames.map_or(true, |frames| *end < frames));
            let Some(end) = end else {
                log::warn!(
                    "Skipping loop at {} of length {} past the end of {}",
                    l.start,
                    l.length,
                    sample_path.display()
                );
                continue;
            };
            let mut sample_loop = SampleLoop::new(loop_type, l.start, end);
            if l.crossfade > 0 {
                sample_loop.crossfade = Some((f64::from(l.crossfade) / f64::from(l.length)).min(1.0));
            }
            mapped.loops.push(sample_loop);
        }
        Some(mapped)
    }
}

fn map_program(program: &Program, path: &Path, metadata: &Metadata, ctx: &DetectContext) -> Result<MultisampleSource> {
    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let mapper = ProgramMapper { program, folder, ctx };
    let mut source = mapper.map(path)?;
    source.metadata = metadata.clone();
    Ok(source)
}

/// Reads Kontakt instruments and multis.
#[derive(Debug, Default, Clone, Copy)]
pub struct KontaktDetector;

impl Detector for KontaktDetector {
    fn name(&self) -> &'static str {
        "Kontakt"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["nki", "nkm"]
    }

    /// Every program of the file becomes a multi-sample; for multis these are
    /// the programs of all slots.
    fn read_file(&self, path: &Path, ctx: &DetectContext) -> Result<Vec<MultisampleSource>> {
        let data = fs::read(path)?;
        let file = path.display().to_string();
        match read_content(&data, &file)? {
            KontaktContent::Program(program, metadata) => Ok(vec![map_program(&program, path, &metadata, ctx)?]),
            KontaktContent::Bank(bank, metadata) => {
                let mut sources = Vec::new();
                for slotted in &bank.slots.programs {
                    match map_program(&slotted.program, path, &metadata, ctx) {
                        Ok(source) => sources.push(source),
                        Err(e) => ctx.notifier.log_error(keys::PRESET_FAILED, &[&slotted.program.name, &e]),
                    }
                }
                Ok(sources)
            }
        }
    }

    fn read_performance(&self, path: &Path, ctx: &DetectContext) -> Result<Option<PerformanceSource>> {
        let data = fs::read(path)?;
        let file = path.display().to_string();
        let KontaktContent::Bank(bank, metadata) = read_content(&data, &file)? else {
            return Ok(None);
        };

        let name = if bank.name.trim().is_empty() {
            file_stem(path)
        } else {
            bank.name.trim().to_string()
        };
        let mut performance = PerformanceSource {
            name,
            instruments: Vec::new(),
        };
        for slotted in &bank.slots.programs {
            let source = match map_program(&slotted.program, path, &metadata, ctx) {
                Ok(source) => source,
                Err(e) => {
                    ctx.notifier.log_error(keys::PRESET_FAILED, &[&slotted.program.name, &e]);
                    continue;
                }
            };
            let mut instrument = PerformanceInstrument::new(source);
            instrument.slot = Some(slotted.slot_index);
            instrument.midi_channel = bank.multi.channel(slotted.slot_index);
            performance.instruments.push(instrument);
        }
        Ok(Some(performance))
    }
}

#[cfg(test)]
mod tests {
    use super::ni_container::{NiDataChunk, NiSubtree, COMPRESSION_FASTLZ};
    use super::preset::write_preset_chunks;
    use super::program::tests::program;
    use super::program::{MultiConfiguration, SlotList, SlottedProgram, OMNI};
    use super::*;
    use multiconv_model::{CollectingNotifier, MetadataSettings, PcmSampleData, SampleData};
    use std::fs::File;

    fn write_sample(folder: &Path) {
        fs::create_dir_all(folder.join("Samples")).unwrap();
        let pcm = PcmSampleData::new("C3", 1, 44100, 16, vec![0; 400]);
        let mut file = File::create(folder.join("Samples/C3.wav")).unwrap();
        pcm.write_sample(&mut file).unwrap();
    }

    fn container(chunk: PresetChunk, info: Option<SoundInfo>) -> Vec<u8> {
        let mut chunks = Vec::new();
        if let Some(info) = info {
            chunks.push(NiDataChunk::raw(NiChunkType::SoundInfo, info.to_bytes()));
        }
        let preset = NiItem::new(vec![
            NiDataChunk::raw(NiChunkType::PresetChunk, write_preset_chunks(&[chunk])).with_domain(DOMAIN_KONTAKT)
        ]);
        NiItem::new(chunks)
            .with_child(NiChunkType::BinaryChunk, preset)
            .to_bytes()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(KontaktFormat::detect(&k1::MAGIC.to_le_bytes()), Some(KontaktFormat::Kontakt1));
        assert_eq!(
            KontaktFormat::detect(&0x1290_A87Fu32.to_le_bytes()),
            Some(KontaktFormat::Kontakt2To4 { magic: 0x1290_A87F })
        );
        assert_eq!(KontaktFormat::detect(b"nope"), None);
        assert_eq!(KontaktFormat::detect(&[]), None);
    }

    #[test]
    fn test_read_container_instrument() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let info = SoundInfo {
            name: "Keys".to_string(),
            author: "Someone".to_string(),
            tags: vec!["Piano".to_string()],
            ..Default::default()
        };
        let path = dir.path().join("Keys.nki");
        fs::write(&path, container(program("Keys").to_chunk(), Some(info))).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KontaktDetector.read_file(&path, &ctx).unwrap();
        assert_eq!(sources.len(), 1);
        let source = &sources[0];
        assert_eq!(source.name, "Keys");
        assert_eq!(source.metadata.creator.as_deref(), Some("Someone"));
        assert_eq!(source.metadata.keywords, vec!["Piano".to_string()]);

        let group = &source.groups[0];
        assert_eq!(group.name, "Sustain");
        let zone = &group.zones[0];
        assert_eq!(zone.name, "C3");
        assert_eq!((zone.key_low, zone.key_high, zone.key_root), (36, 59, Some(48)));
        assert!((zone.gain + 9.0).abs() < 1e-6);
        assert_eq!(zone.note_crossfade_high, 4);
        assert_eq!(zone.play_logic, PlayLogic::RoundRobin);
        assert_eq!(zone.sequence_position, Some(1));
        assert_eq!(zone.loops.len(), 1);
        assert_eq!((zone.loops[0].start, zone.loops[0].end), (100, 149));
        assert!((zone.loops[0].crossfade.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(zone.amplitude_envelope.hold, None);
        assert!((zone.amplitude_envelope.release.unwrap() - 0.5).abs() < 1e-6);
        assert!(!notifier.contains(keys::SAMPLE_MISSING));
    }

    #[test]
    fn test_read_kontakt_1_instrument() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let path = dir.path().join("Old.nki");
        fs::write(&path, k1::write_k1(&program("")).unwrap()).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KontaktDetector.read_file(&path, &ctx).unwrap();
        assert_eq!(sources[0].name, "Old");
        assert_eq!(sources[0].zone_count(), 1);
    }

    #[test]
    fn test_multi_keeps_slot_indices_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let bank = Bank {
            name: "Ensemble".to_string(),
            slots: SlotList {
                programs: [0, 5, 9]
                    .into_iter()
                    .map(|slot_index| SlottedProgram {
                        slot_index,
                        program: program(&format!("Slot {}", slot_index)),
                    })
                    .collect(),
            },
            multi: MultiConfiguration {
                assignments: vec![(0, 0), (5, 4), (9, OMNI)],
            },
        };
        let path = dir.path().join("Ensemble.nkm");
        fs::write(&path, container(bank.to_chunk(), None)).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let performance = KontaktDetector.read_performance(&path, &ctx).unwrap().unwrap();
        assert_eq!(performance.name, "Ensemble");
        let slots: Vec<Option<usize>> = performance.instruments.iter().map(|i| i.slot).collect();
        assert_eq!(slots, vec![Some(0), Some(5), Some(9)]);
        let channels: Vec<Option<u8>> = performance.instruments.iter().map(|i| i.midi_channel).collect();
        assert_eq!(channels, vec![Some(0), Some(4), None]);
        assert_eq!(performance.instruments[1].source.name, "Slot 5");

        assert_eq!(KontaktDetector.read_file(&path, &ctx).unwrap().len(), 3);
    }

    #[test]
    fn test_loop_past_the_sample_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let mut instrument = program("Keys");
        instrument.zones[0].loops[0].start = u32::MAX - 10;
        let mut tail = instrument.zones[0].loops[0];
        tail.start = 390;
        tail.length = 20;
        instrument.zones[0].loops.push(tail);
        let path = dir.path().join("Keys.nki");
        fs::write(&path, container(instrument.to_chunk(), None)).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KontaktDetector.read_file(&path, &ctx).unwrap();
        let zone = &sources[0].groups[0].zones[0];
        assert!(zone.loops.is_empty());
    }

    #[test]
    fn test_failed_slot_is_left_out_of_performance() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path());
        let mut broken = program("Broken");
        broken.zones[0].group_index = 99;
        let bank = Bank {
            name: "Ensemble".to_string(),
            slots: SlotList {
                programs: vec![
                    SlottedProgram {
                        slot_index: 0,
                        program: program("Good"),
                    },
                    SlottedProgram {
                        slot_index: 1,
                        program: broken,
                    },
                    SlottedProgram {
                        slot_index: 2,
                        program: program("Also good"),
                    },
                ],
            },
            multi: MultiConfiguration::default(),
        };
        let path = dir.path().join("Ensemble.nkm");
        fs::write(&path, container(bank.to_chunk(), None)).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let performance = KontaktDetector.read_performance(&path, &ctx).unwrap().unwrap();
        let slots: Vec<Option<usize>> = performance.instruments.iter().map(|i| i.slot).collect();
        assert_eq!(slots, vec![Some(0), Some(2)]);
        assert!(notifier.contains(keys::PRESET_FAILED));
    }

    #[test]
    fn test_encrypted_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut subtree = NiSubtree::compress(&NiItem::default());
        subtree.compression = COMPRESSION_FASTLZ;
        subtree.raw_size = 2048;
        subtree.stored = vec![0xE7; 32];
        let bytes = NiItem::new(vec![NiDataChunk::subtree(subtree)]).to_bytes();
        let path = dir.path().join("Locked.nki");
        fs::write(&path, bytes).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        assert!(matches!(KontaktDetector.read_file(&path, &ctx), Err(ConversionError::Encrypted(_))));
    }

    #[test]
    fn test_kontakt_2_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Old.nki");
        let mut bytes = 0xAB85_EF01u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 64]);
        fs::write(&path, bytes).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        assert!(matches!(KontaktDetector.read_file(&path, &ctx), Err(ConversionError::Unsupported(_))));
    }

    #[test]
    fn test_missing_sample_drops_zone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Empty.nki");
        fs::write(&path, container(program("Empty").to_chunk(), None)).unwrap();

        let notifier = CollectingNotifier::new();
        let settings = MetadataSettings::default();
        let ctx = DetectContext::new(&notifier, &settings);
        let sources = KontaktDetector.read_file(&path, &ctx).unwrap();
        assert_eq!(sources[0].zone_count(), 0);
        assert!(notifier.contains(keys::SAMPLE_MISSING));
    }
}
