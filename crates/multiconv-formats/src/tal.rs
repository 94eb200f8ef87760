//! TAL Sampler presets (`.talsmpl`).
//!
//! The sampler plays four layers. Each layer holds a list of multisample
//! entries whose key and velocity ranges should not intersect, so the zones of
//! all groups are redistributed over the layers. Samples are written into a
//! folder next to the preset and referenced by relative URL.

use std::fs;
use std::path::{Path, PathBuf};

use multiconv_model::destination::{file_and_folder, reserve_output, write_sample_file, SampleFileNames};
use multiconv_model::naming::sample_file_name;
use multiconv_model::notifier::keys;
use multiconv_model::{CreateContext, Creator, LoopType, MultisampleSource, Result, SampleData, SampleZone};

use crate::xml::{format_number, write_document, Element};

pub const LAYER_COUNT: usize = 4;

const PRESET_VERSION: &str = "5";

/// Zones distributed over the layers of the sampler.
#[derive(Debug, Default)]
pub struct LayerAssignment<'a> {
    pub layers: [Vec<&'a SampleZone>; LAYER_COUNT],
    /// Zones that had to share a layer with a zone they overlap.
    pub overlapping: Vec<&'a SampleZone>,
}

/// Place every zone into the first layer where it intersects no other zone.
///
/// A zone that fits nowhere goes into the layer holding the fewest zones,
/// the lowest such layer on ties.
pub fn assign_layers<'a>(zones: impl IntoIterator<Item = &'a SampleZone>) -> LayerAssignment<'a> {
    let mut assignment = LayerAssignment::default();
    for zone in zones {
        let free = assignment
            .layers
            .iter()
            .position(|layer| layer.iter().all(|other| !zone.overlaps(other)));
        let index = match free {
            Some(index) => index,
            None => {
                assignment.overlapping.push(zone);
                assignment
                    .layers
                    .iter()
                    .enumerate()
                    .min_by_key(|(index, layer)| (layer.len(), *index))
                    .map_or(0, |(index, _)| index)
            }
        };
        assignment.layers[index].push(zone);
    }
    assignment
}

/// Writes TAL Sampler presets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TalCreator;

impl Creator for TalCreator {
    fn name(&self) -> &'static str {
        "TAL Sampler"
    }

    fn create(&self, folder: &Path, source: &MultisampleSource, ctx: &CreateContext) -> Result<PathBuf> {
        let stem = reserve_output(folder, &source.name, file_and_folder("talsmpl"), ctx.options)?;
        let path = folder.join(format!("{}.talsmpl", stem));
        let sample_folder = folder.join(&stem);
        fs::create_dir_all(&sample_folder)?;
        ctx.notifier.log(keys::CREATING, &[&path.display()]);

        // Write the samples first so that zones without a usable sample drop out.
        let mut names = SampleFileNames::new();
        let mut written: Vec<(&SampleZone, String)> = Vec::new();
        for (group_index, group) in source.groups.iter().enumerate() {
            for (zone_index, zone) in group.zones.iter().enumerate() {
                let Some(sample) = &zone.sample else {
                    ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&zone.name]);
                    continue;
                };
                let wanted = sample_file_name(&source.name, &zone.name, group_index, zone_index, None);
                let (name, new) = names.name_for(sample, &wanted);
                let file_name = format!("{}.wav", name);
                if new {
                    match write_sample_file(sample.as_ref(), &sample_folder.join(&file_name)) {
                        Ok(()) => {}
                        Err(e) if e.is_zone_local() => {
                            ctx.notifier.log_error(keys::SAMPLE_MISSING, &[&sample.description(), &e]);
                            names.forget(sample);
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
                if zone.loops.len() > 1 {
                    ctx.notifier.log(keys::LOOPS_TRUNCATED, &[&zone.name, &zone.loops.len()]);
                }
                written.push((zone, format!("{}/{}", stem, file_name)));
            }
        }

        let assignment = assign_layers(written.iter().map(|(zone, _)| *zone));
        for zone in &assignment.overlapping {
            ctx.notifier.log(keys::LAYER_OVERLAP, &[&zone.name, &zone.key_low, &zone.key_high]);
        }
        let url_of = |zone: &SampleZone| {
            written
                .iter()
                .find(|(z, _)| std::ptr::eq(*z, zone))
                .map(|(_, url)| url.as_str())
                .unwrap_or_default()
        };

        let mut program = Element::new("program")
            .with_attr("programname", &source.name)
            .with_attr("volume", format_number(0.5));
        for (index, layer) in assignment.layers.iter().enumerate() {
            let mut multisamples = Element::new("multisamples");
            for zone in layer {
                multisamples.push(multisample_element(zone, url_of(zone)));
            }
            program.push(
                Element::new(format!("samplelayer{}", index))
                    .with_attr("layeron", if layer.is_empty() { 0 } else { 1 })
                    .with_child(multisamples),
            );
        }
        let root = Element::new("tal")
            .with_attr("curprogram", 0)
            .with_attr("version", PRESET_VERSION)
            .with_child(Element::new("programs").with_child(program));
        fs::write(&path, write_document(&root)?)?;
        Ok(path)
    }
}

fn multisample_element(zone: &SampleZone, url: &str) -> Element {
    let mut element = Element::new("multisample")
        .with_attr("url", url)
        .with_attr("rootkey", zone.root_key())
        .with_attr("lowkey", zone.key_low)
        .with_attr("highkey", zone.key_high)
        .with_attr("lowvelocity", zone.velocity_low)
        .with_attr("highvelocity", zone.velocity_high)
        .with_attr("volume", format_number(zone.gain))
        .with_attr("pan", format_number(zone.pan.clamp(-1.0, 1.0)))
        .with_attr("tune", format_number(zone.tune))
        .with_attr("reverse", u8::from(zone.reversed))
        .with_attr("samplestart", zone.start);
    if let Some(stop) = zone.stop {
        element.set_attr("sampleend", stop);
    }
    match zone.loops.first() {
        Some(sample_loop) => {
            element.set_attr("loopenabled", 1);
            element.set_attr("loopalternate", u8::from(sample_loop.loop_type == LoopType::Alternating));
            element.set_attr("loopstart", sample_loop.start);
            element.set_attr("loopend", sample_loop.end);
        }
        None => element.set_attr("loopenabled", 0),
    }
    let envelope = &zone.amplitude_envelope;
    for (name, value) in [
        ("attack", envelope.attack),
        ("hold", envelope.hold),
        ("decay", envelope.decay),
        ("sustain", envelope.sustain),
        ("release", envelope.release),
    ] {
        if let Some(value) = value {
            element.set_attr(name, format_number(value));
        }
    }
    element
}
