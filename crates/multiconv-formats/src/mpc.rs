//! Akai MPC keygroup programs (`.xpm`).
//!
//! Zones sharing a key range form one keygroup; each zone of a keygroup
//! becomes a layer. The program and its samples are written into one folder.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use multiconv_model::destination::{reserve_output, write_sample_file, SampleFileNames};
use multiconv_model::naming::sample_file_name;
use multiconv_model::notifier::keys;
use multiconv_model::units::db_to_mpc_volume;
use multiconv_model::{CreateContext, Creator, MultisampleSource, PlayLogic, Result, SampleData, SampleZone};

use crate::xml::{format_number, write_document, Element};

/// Keygroups of one program.
pub const MAX_KEYGROUPS: usize = 128;

const FILE_VERSION: &str = "2.1";
const APPLICATION_VERSION: &str = "2.10.0";

const ZONE_PLAY_VELOCITY: u8 = 1;
const ZONE_PLAY_CYCLE: u8 = 2;

fn yes_no(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn value(name: &str, value: impl ToString) -> Element {
    Element::new(name).with_text(value.to_string())
}

/// A zone together with the name of its written sample.
struct Layer<'a> {
    zone: &'a SampleZone,
    sample_name: String,
}

/// Layers sharing one key range.
struct Keygroup<'a> {
    low: u8,
    high: u8,
    layers: Vec<Layer<'a>>,
}

/// Writes MPC keygroup programs.
#[derive(Debug, Default, Clone, Copy)]
pub struct MpcCreator;

impl Creator for MpcCreator {
    fn name(&self) -> &'static str {
        "MPC Keygroup"
    }

    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf> {
        let stem = reserve_output(folder, &source.name, |s: &str| vec![PathBuf::from(s)], ctx.options)?;
        let out = folder.join(&stem);
        fs::create_dir_all(&out)?;
        let path = out.join(format!("{}.xpm", stem));
        ctx.notifier.log(keys::CREATING, &[&path.display()]);

        let mut names = SampleFileNames::new();
        let mut keygroups: Vec<Keygroup> = Vec::new();
        for (group_index, group) in source.groups.iter().enumerate() {
            for (zone_index, zone) in group.zones.iter().enumerate() {
                let Some(sample) = &zone.sample else {
                    ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&zone.name]);
                    continue;
                };
                let wanted = sample_file_name(&source.name, &zone.name, group_index, zone_index, None);
                let Some(sample_name) = write_sample(&out, &mut names, sample, &wanted, ctx)? else {
                    continue;
                };
                if zone.loops.len() > 1 {
                    ctx.notifier.log(keys::LOOPS_TRUNCATED, &[&zone.name, &zone.loops.len()]);
                }
                let layer = Layer { zone, sample_name };
                match keygroups.iter_mut().find(|k| k.low == zone.key_low && k.high == zone.key_high) {
                    Some(keygroup) => keygroup.layers.push(layer),
                    None => keygroups.push(Keygroup {
                        low: zone.key_low,
                        high: zone.key_high,
                        layers: vec![layer],
                    }),
                }
            }
        }
        keygroups.sort_by_key(|k| (k.low, k.high));

        if keygroups.len() > MAX_KEYGROUPS {
            ctx.notifier
                .log_error(keys::KEYGROUP_LIMIT, &[&source.name, &keygroups.len(), &MAX_KEYGROUPS]);
            keygroups.truncate(MAX_KEYGROUPS);
        }
        let layer_limit = ctx.options.effective_mpc_layer_limit();
        for keygroup in &mut keygroups {
            if keygroup.layers.len() > layer_limit {
                ctx.notifier.log_error(
                    keys::LAYER_LIMIT,
                    &[&source.name, &keygroup.low, &keygroup.high, &keygroup.layers.len(), &layer_limit],
                );
                keygroup.layers.truncate(layer_limit);
            }
        }

        let document = program_element(&source.name, &keygroups);
        fs::write(&path, write_document(&document)?)?;
        Ok(path)
    }
}

/// Write the WAV file of `sample` once and return its name without extension.
fn write_sample(
    out: &Path,
    names: &mut SampleFileNames,
    sample: &Arc<dyn SampleData>,
    wanted: &str,
    ctx: &CreateContext,
) -> Result<Option<String>> {
    let (name, new) = names.name_for(sample, wanted);
    if new {
        match write_sample_file(sample.as_ref(), &out.join(format!("{}.wav", name))) {
            Ok(()) => {}
            Err(e) if e.is_zone_local() => {
                ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&sample.description(), &e]);
                names.forget(sample);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Some(name))
}

fn program_element(name: &str, keygroups: &[Keygroup]) -> Element {
    let version = Element::new("Version")
        .with_child(value("File_Version", FILE_VERSION))
        .with_child(value("Application", "MPC-V"))
        .with_child(value("Application_Version", APPLICATION_VERSION))
        .with_child(value("Platform", "Linux"));

    let mut instruments = Element::new("Instruments");
    for (index, keygroup) in keygroups.iter().enumerate() {
        instruments.push(instrument_element(index, keygroup));
    }
    let program = Element::new("Program")
        .with_attr("type", "Keygroup")
        .with_child(value("ProgramName", name))
        .with_child(value("KeygroupNumKeygroups", keygroups.len()))
        .with_child(value("KeygroupPitchBendRange", 0.0))
        .with_child(instruments);
    Element::new("MPCVObject").with_child(version).with_child(program)
}

fn instrument_element(index: usize, keygroup: &Keygroup) -> Element {
    let round_robin = keygroup.layers.iter().any(|l| l.zone.play_logic == PlayLogic::RoundRobin);
    let zone_play = if round_robin { ZONE_PLAY_CYCLE } else { ZONE_PLAY_VELOCITY };

    let mut layers = Element::new("Layers");
    for (number, layer) in keygroup.layers.iter().enumerate() {
        layers.push(layer_element(number, layer));
    }
    Element::new("Instrument")
        .with_attr("number", index + 1)
        .with_child(value("LowNote", keygroup.low))
        .with_child(value("HighNote", keygroup.high))
        .with_child(value("IgnoreBaseNote", "False"))
        .with_child(value("ZonePlay", zone_play))
        .with_child(layers)
}

fn layer_element(number: usize, layer: &Layer) -> Element {
    let zone = layer.zone;
    let coarse = zone.tune.trunc();
    let fine = ((zone.tune - coarse) * 100.0).round();
    let mut element = Element::new("Layer")
        .with_attr("number", number + 1)
        .with_child(value("Active", "True"))
        .with_child(value("Volume", format_number(db_to_mpc_volume(zone.gain))))
        .with_child(value("Pan", format_number((zone.pan.clamp(-1.0, 1.0) + 1.0) / 2.0)))
        .with_child(value("Pitch", 0.0))
        .with_child(value("TuneCoarse", coarse as i32))
        .with_child(value("TuneFine", fine as i32))
        .with_child(value("VelStart", zone.velocity_low))
        .with_child(value("VelEnd", zone.velocity_high))
        .with_child(value("SampleName", &layer.sample_name))
        .with_child(value("SampleFile", ""))
        .with_child(value("RootNote", u32::from(zone.root_key()) + 1))
        .with_child(value("KeyTrack", yes_no(zone.key_tracking > 0.0)))
        .with_child(value("Direction", u8::from(zone.reversed)))
        .with_child(value("SampleStart", zone.start));
    if let Some(stop) = zone.stop {
        element.push(value("SampleEnd", stop));
    }
    match zone.loops.first() {
        Some(sample_loop) => {
            element.push(value("Loop", "True"));
            element.push(value("LoopStart", sample_loop.start));
            element.push(value("LoopEnd", sample_loop.end));
            element.push(value("LoopCrossfadeLength", sample_loop.crossfade_frames()));
        }
        None => element.push(value("Loop", "False")),
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;
    use multiconv_model::{CollectingNotifier, DestinationOptions, Group, PcmSampleData};

    fn zone(name: &str, sample: &Arc<dyn SampleData>, keys: (u8, u8), velocities: (u8, u8)) -> SampleZone {
        let mut zone = SampleZone::new(name, sample.clone());
        zone.key_low = keys.0;
        zone.key_high = keys.1;
        zone.velocity_low = velocities.0;
        zone.velocity_high = velocities.1;
        zone
    }

    fn sample(name: &str) -> Arc<dyn SampleData> {
        Arc::new(PcmSampleData::new(name, 1, 44100, 16, vec![0; 64]))
    }

    fn source(zones: Vec<SampleZone>) -> MultisampleSource {
        let mut source = MultisampleSource::new("Drums", "/tmp/drums.sfz");
        let mut group = Group::new("All");
        group.zones = zones;
        source.groups.push(group);
        source
    }

    fn instruments(path: &Path) -> Vec<Element> {
        let text = fs::read_to_string(path).unwrap();
        let root = parse_document(&text, "test.xpm").unwrap();
        root.find("Instruments").unwrap().children.clone()
    }

    #[test]
    fn test_layers_and_volume() {
        let dir = tempfile::tempdir().unwrap();
        let soft = sample("Snare Soft");
        let hard = sample("Snare Hard");
        let mut loud = zone("Snare Hard", &hard, (38, 40), (65, 127));
        loud.gain = 6.0;
        let zones = vec![zone("Snare Soft", &soft, (38, 40), (1, 64)), loud];
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let path = MpcCreator
            .create(dir.path(), &source(zones), &CreateContext::new(&notifier, &options))
            .unwrap();
        assert!(path.with_file_name("Snare Soft.wav").is_file());
        assert!(path.with_file_name("Snare Hard.wav").is_file());

        let instruments = instruments(&path);
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].child_text("LowNote"), Some("38"));
        let layers = instruments[0].child("Layers").unwrap();
        assert_eq!(layers.children.len(), 2);
        assert_eq!(layers.children[1].child_text("Volume"), Some("1"));
        assert_eq!(layers.children[1].child_text("VelStart"), Some("65"));
        assert!(notifier.errors().is_empty());
    }

    #[test]
    fn test_too_many_layers_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let shared = sample("Hit");
        let zones = (0..5)
            .map(|i| zone("Hit", &shared, (36, 36), (i * 25 + 1, i * 25 + 25)))
            .collect();
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let path = MpcCreator
            .create(dir.path(), &source(zones), &CreateContext::new(&notifier, &options))
            .unwrap();
        assert!(notifier.contains(keys::LAYER_LIMIT));
        let instruments = instruments(&path);
        assert_eq!(instruments[0].child("Layers").unwrap().children.len(), 4);
    }

    #[test]
    fn test_eight_layers_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let shared = sample("Hit");
        let zones = (0..5)
            .map(|i| zone("Hit", &shared, (36, 36), (i * 25 + 1, i * 25 + 25)))
            .collect();
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions {
            mpc_layer_limit: 8,
            ..Default::default()
        };
        MpcCreator
            .create(dir.path(), &source(zones), &CreateContext::new(&notifier, &options))
            .unwrap();
        assert!(!notifier.contains(keys::LAYER_LIMIT));
    }

    #[test]
    fn test_keygroup_limit() {
        let dir = tempfile::tempdir().unwrap();
        let shared = sample("Key");
        let mut zones: Vec<SampleZone> = (0..=127u8).map(|k| zone("Key", &shared, (k, k), (1, 127))).collect();
        zones.push(zone("Key", &shared, (0, 1), (1, 127)));
        zones.push(zone("Key", &shared, (0, 2), (1, 127)));
        let notifier = CollectingNotifier::new();
        let options = DestinationOptions::default();
        let path = MpcCreator
            .create(dir.path(), &source(zones), &CreateContext::new(&notifier, &options))
            .unwrap();
        assert!(notifier.contains(keys::KEYGROUP_LIMIT));
        let text = fs::read_to_string(&path).unwrap();
        let root = parse_document(&text, "test.xpm").unwrap();
        assert_eq!(root.find("KeygroupNumKeygroups").map(|e| e.text.as_str()), Some("128"));
    }
}
