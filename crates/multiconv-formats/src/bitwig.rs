//! Bitwig Studio multisamples (`.multisample`).
//!
//! A ZIP archive holding `multisample.xml` and the WAV files it references.
//! Frame positions are stored as decimal numbers; loop `stop` is the first
//! frame after the loop.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use multiconv_model::destination::{reserve_output, single_file, SampleFileNames};
use multiconv_model::naming::sample_file_name;
use multiconv_model::notifier::keys;
use multiconv_model::{
    ConversionError, CreateContext, Creator, DetectContext, Detector, Group, LoopType, Metadata,
    MultisampleSource, PlayLogic, Result, SampleData, SampleLoop, SampleZone, WavBytesSampleData,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::xml::{format_number, parse_document_with_root, write_document, Element};

pub const DESCRIPTION_FILE: &str = "multisample.xml";
const GENERATOR: &str = "multiconv";

fn zip_error(file: &str, error: zip::result::ZipError) -> ConversionError {
    ConversionError::structural(file, format!("ZIP: {}", error))
}

fn loop_mode(mode: &str) -> Option<LoopType> {
    match mode {
        "loop" => Some(LoopType::Forward),
        "ping-pong" => Some(LoopType::Alternating),
        _ => None,
    }
}

fn loop_mode_name(loop_type: LoopType) -> &'static str {
    match loop_type {
        LoopType::Alternating => "ping-pong",
        // no backwards loops, play forward instead
        LoopType::Forward | LoopType::Backwards => "loop",
    }
}

fn frame(element: &Element, name: &str) -> Option<u32> {
    element.attr_parse::<f64>(name).map(|v| v.max(0.0).round() as u32)
}

fn fade(element: &Element, name: &str) -> u8 {
    element.attr_parse::<f64>(name).map_or(0, |v| v.clamp(0.0, 127.0).round() as u8)
}

/// Reads `.multisample` archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitwigDetector;

impl Detector for BitwigDetector {
    fn name(&self) -> &'static str {
        "Bitwig Multisample"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["multisample"]
    }

    fn read_file(&self, path: &Path, ctx: &DetectContext) -> Result<Vec<MultisampleSource>> {
        let file = path.display().to_string();
        let mut archive = ZipArchive::new(File::open(path)?).map_err(|e| zip_error(&file, e))?;
        let text = {
            let mut entry = archive.by_name(DESCRIPTION_FILE).map_err(|e| zip_error(&file, e))?;
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            text
        };
        let root = parse_document_with_root(&text, &file, "multisample")?;
        let mut reader = ArchiveReader {
            archive,
            samples: HashMap::new(),
            ctx,
            file: &file,
        };
        Ok(vec![reader.read_multisample(&root, path)])
    }
}

struct ArchiveReader<'a, R: Read + std::io::Seek> {
    archive: ZipArchive<R>,
    samples: HashMap<String, Option<Arc<dyn SampleData>>>,
    ctx: &'a DetectContext<'a>,
    file: &'a str,
}

impl<R: Read + std::io::Seek> ArchiveReader<'_, R> {
    fn sample(&mut self, name: &str) -> Option<Arc<dyn SampleData>> {
        if let Some(sample) = self.samples.get(name) {
            return sample.clone();
        }
        let sample = match self.read_entry(name) {
            Ok(bytes) => Some(Arc::new(WavBytesSampleData::new(name, bytes)) as Arc<dyn SampleData>),
            Err(e) => {
                self.ctx
                    .notifier
                    .log_error(keys::SAMPLE_MISSING, &[&format!("{}/{}", self.file, name), &e]);
                None
            }
        };
        self.samples.insert(name.to_string(), sample.clone());
        sample
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(name).map_err(|e| zip_error(self.file, e))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn read_multisample(&mut self, root: &Element, path: &Path) -> MultisampleSource {
        let name = match root.attr("name").map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
        };
        let mut source = MultisampleSource::new(name.clone(), path);
        source.metadata = read_metadata(root);

        source.groups = root
            .children_named("group")
            .map(|g| Group::new(g.attr("name").unwrap_or_default()))
            .collect();
        let mut ungrouped = Group::new(name);

        for element in root.children_named("sample") {
            let Some(zone) = self.read_zone(element) else {
                continue;
            };
            let group = element
                .attr_parse::<i64>("group")
                .and_then(|g| usize::try_from(g).ok())
                .and_then(|g| source.groups.get_mut(g));
            match group {
                Some(group) => group.zones.push(zone),
                None => ungrouped.zones.push(zone),
            }
        }
        if !ungrouped.zones.is_empty() {
            source.groups.push(ungrouped);
        }
        source
    }

    fn read_zone(&mut self, element: &Element) -> Option<SampleZone> {
        let file = element.attr("file")?;
        let sample = self.sample(file)?;
        let stem = Path::new(file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut zone = SampleZone::new(stem, sample);

        zone.start = frame(element, "sample-start").unwrap_or(0);
        zone.stop = frame(element, "sample-stop").filter(|stop| *stop > zone.start);
        zone.gain = element.attr_parse("gain").unwrap_or(0.0);
        zone.tune = element.attr_parse("tune").unwrap_or(0.0);
        zone.reversed = element.attr("reverse") == Some("true");
        if element.attr("zone-logic") == Some("round-robin") {
            zone.play_logic = PlayLogic::RoundRobin;
        }

        if let Some(key) = element.child("key") {
            zone.key_low = key.attr_parse::<u8>("low").unwrap_or(0).min(127);
            zone.key_high = key.attr_parse::<u8>("high").unwrap_or(127).min(127);
            zone.key_root = key.attr_parse::<u8>("root").map(|r| r.min(127));
            zone.key_tracking = key.attr_parse("track").unwrap_or(1.0);
            zone.note_crossfade_low = fade(key, "low-fade");
            zone.note_crossfade_high = fade(key, "high-fade");
        }
        if let Some(velocity) = element.child("velocity") {
            zone.velocity_low = velocity.attr_parse::<u8>("low").unwrap_or(1).clamp(1, 127);
            zone.velocity_high = velocity.attr_parse::<u8>("high").unwrap_or(127).clamp(1, 127);
            zone.velocity_crossfade_low = fade(velocity, "low-fade");
            zone.velocity_crossfade_high = fade(velocity, "high-fade");
        }
        if let Some(l) = element.child("loop") {
            let mode = l.attr("mode").and_then(loop_mode);
            if let (Some(loop_type), Some(start), Some(stop)) = (mode, frame(l, "start"), frame(l, "stop")) {
                if stop > start {
                    let mut sample_loop = SampleLoop::new(loop_type, start, stop - 1);
                    sample_loop.crossfade = l.attr_parse::<f64>("fade").filter(|f| *f > 0.0).map(|f| f.min(1.0));
                    zone.loops.push(sample_loop);
                }
            }
        }
        Some(zone)
    }
}

fn read_metadata(root: &Element) -> Metadata {
    let text = |name: &str| root.child_text(name).filter(|t| !t.is_empty()).map(str::to_string);
    Metadata {
        creator: text("creator"),
        category: text("category"),
        description: text("description"),
        keywords: root
            .child("keywords")
            .map(|k| {
                k.children_named("keyword")
                    .map(|w| w.text.trim().to_string())
                    .filter(|w| !w.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        creation_time: None,
    }
}

/// Writes `.multisample` archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitwigCreator;

impl Creator for BitwigCreator {
    fn name(&self) -> &'static str {
        "Bitwig Multisample"
    }

    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf> {
        let stem = reserve_output(folder, &source.name, single_file("multisample"), ctx.options)?;
        let path = folder.join(format!("{}.multisample", stem));
        ctx.notifier.log(keys::CREATING, &[&path.display()]);
        let file = path.display().to_string();

        let mut root = metadata_element(source);
        let mut names = SampleFileNames::new();
        let mut pending: Vec<(String, Arc<dyn SampleData>)> = Vec::new();
        for (group_index, group) in source.groups.iter().enumerate() {
            root.push(Element::new("group").with_attr("name", &group.name));
            for (zone_index, zone) in group.zones.iter().enumerate() {
                let Some(sample) = &zone.sample else {
                    ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&zone.name]);
                    continue;
                };
                let wanted = sample_file_name(&source.name, &zone.name, group_index, zone_index, None);
                let (name, new) = names.name_for(sample, &wanted);
                let file_name = format!("{}.wav", name);
                if new {
                    pending.push((file_name.clone(), sample.clone()));
                }
                if zone.loops.len() > 1 {
                    ctx.notifier.log(keys::LOOPS_TRUNCATED, &[&zone.name, &zone.loops.len()]);
                }
                root.push(zone_element(zone, &file_name, group_index, sample.as_ref()));
            }
        }
        let xml = write_document(&root)?;

        let mut zip = ZipWriter::new(File::create(&path)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(DESCRIPTION_FILE, options).map_err(|e| zip_error(&file, e))?;
        zip.write_all(xml.as_bytes())?;
        for (name, sample) in pending {
            let mut bytes = Vec::new();
            if let Err(e) = sample.write_sample(&mut bytes) {
                if e.is_zone_local() {
                    ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&sample.description(), &e]);
                    continue;
                }
                return Err(e);
            }
            zip.start_file(name, options).map_err(|e| zip_error(&file, e))?;
            zip.write_all(&bytes)?;
        }
        zip.finish().map_err(|e| zip_error(&file, e))?;
        Ok(path)
    }
}

fn metadata_element(source: &MultisampleSource) -> Element {
    let metadata = &source.metadata;
    let mut root = Element::new("multisample")
        .with_attr("name", &source.name)
        .with_child(Element::new("generator").with_text(GENERATOR))
        .with_child(Element::new("category").with_text(metadata.category.clone().unwrap_or_default()))
        .with_child(Element::new("creator").with_text(metadata.creator.clone().unwrap_or_default()))
        .with_child(Element::new("description").with_text(metadata.description.clone().unwrap_or_default()));
    let mut keywords = Element::new("keywords");
    for keyword in &metadata.keywords {
        keywords.push(Element::new("keyword").with_text(keyword.clone()));
    }
    root.push(keywords);
    root
}

fn zone_element(zone: &SampleZone, file_name: &str, group_index: usize, sample: &dyn SampleData) -> Element {
    let stop = match zone.stop {
        Some(stop) => stop,
        None => sample.audio_metadata().map(|m| m.frames).unwrap_or(0),
    };
    let logic = match zone.play_logic {
        PlayLogic::RoundRobin => "round-robin",
        PlayLogic::Always => "always-play",
    };
    let mut key = Element::new("key")
        .with_attr("low", zone.key_low)
        .with_attr("high", zone.key_high)
        .with_attr("low-fade", zone.note_crossfade_low)
        .with_attr("high-fade", zone.note_crossfade_high)
        .with_attr("track", format_number(zone.key_tracking));
    if let Some(root) = zone.key_root {
        key.set_attr("root", root);
    }
    let mut element = Element::new("sample")
        .with_attr("file", file_name)
        .with_attr("gain", format_number(zone.gain))
        .with_attr("group", group_index)
        .with_attr("sample-start", format_number(zone.start.into()))
        .with_attr("sample-stop", format_number(stop.into()))
        .with_attr("tune", format_number(zone.tune))
        .with_attr("reverse", zone.reversed)
        .with_attr("zone-logic", logic)
        .with_child(key)
        .with_child(
            Element::new("velocity")
                .with_attr("low", zone.velocity_low)
                .with_attr("high", zone.velocity_high)
                .with_attr("low-fade", zone.velocity_crossfade_low)
                .with_attr("high-fade", zone.velocity_crossfade_high),
        );
    let mut l = Element::new("loop");
    match zone.loops.first() {
        Some(sample_loop) => {
            l.set_attr("mode", loop_mode_name(sample_loop.loop_type));
            l.set_attr("start", format_number(sample_loop.start.into()));
            l.set_attr("stop", format_number((u64::from(sample_loop.end) + 1) as f64));
            l.set_attr("fade", format_number(sample_loop.crossfade.unwrap_or(0.0)));
        }
        None => l.set_attr("mode", "off"),
    }
    element.push(l);
    element
}
