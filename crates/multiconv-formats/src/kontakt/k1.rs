//! Kontakt 1 instruments: a short header followed by a zlib compressed XML
//! document describing one program.
//!
//! ```text
//! u32 magic 0x5EE56EB3 | u32 version | u32 compressed size | zlib(XML)
//! ```

use multiconv_binary::compression::{zlib_compress, zlib_decompress};
use multiconv_binary::{ByteReader, ByteWriter, Endian};
use multiconv_model::{ConversionError, Result};

use super::program::{KontaktEnvelope, KontaktGroup, KontaktLoop, KontaktZone, Program};
use crate::xml::{format_number, parse_document_with_root, write_document, Element};

pub const MAGIC: u32 = 0x5EE5_6EB3;
const VERSION: u32 = 0x0110;

fn number<T: std::str::FromStr + Default>(element: &Element, name: &str) -> T {
    element.attr_parse(name).unwrap_or_default()
}

fn optional(element: &Element, name: &str) -> Option<f32> {
    element.attr_parse::<f32>(name).filter(|v| *v >= 0.0)
}

fn read_group(element: &Element) -> KontaktGroup {
    let envelope = KontaktEnvelope {
        attack: optional(element, "attack"),
        hold: optional(element, "hold"),
        decay: optional(element, "decay"),
        sustain: optional(element, "sustain"),
        release: optional(element, "release"),
    };
    KontaktGroup {
        name: element.attr("name").unwrap_or_default().to_string(),
        volume: number(element, "volume"),
        pan: number(element, "pan"),
        tune: number(element, "tune"),
        trigger: number(element, "trigger"),
        round_robin: element.attr("roundRobin") == Some("true"),
        envelope: (envelope != KontaktEnvelope::default()).then_some(envelope),
    }
}

fn read_zone(element: &Element, filenames: &mut Vec<String>) -> KontaktZone {
    let mut zone = KontaktZone {
        group_index: number(element, "group"),
        sample_start: number(element, "sampleStart"),
        sample_end: number(element, "sampleEnd"),
        low_key: number(element, "lowKey"),
        high_key: element.attr_parse("highKey").unwrap_or(127),
        low_velocity: element.attr_parse("lowVelocity").unwrap_or(1),
        high_velocity: element.attr_parse("highVelocity").unwrap_or(127),
        root_key: number(element, "rootKey"),
        fade_low_key: number(element, "fadeLowKey"),
        fade_high_key: number(element, "fadeHighKey"),
        fade_low_velocity: number(element, "fadeLowVelocity"),
        fade_high_velocity: number(element, "fadeHighVelocity"),
        volume: number(element, "volume"),
        pan: number(element, "pan"),
        tune: number(element, "tune"),
        reverse: element.attr("reverse") == Some("true"),
        ..Default::default()
    };
    if let Some(file) = element.child("sample").and_then(|s| s.attr("file")) {
        let file = file.replace('\\', "/");
        zone.filename_index = match filenames.iter().position(|f| *f == file) {
            Some(index) => index as u32,
            None => {
                filenames.push(file);
                (filenames.len() - 1) as u32
            }
        };
    } else {
        zone.filename_index = u32::MAX;
    }
    zone.loops = element
        .children_named("loop")
        .map(|l| KontaktLoop {
            mode: number(l, "mode"),
            start: number(l, "start"),
            length: number(l, "length"),
            crossfade: number(l, "xfade"),
        })
        .collect();
    zone
}

/// Read a Kontakt 1 file.
pub fn parse_k1(data: &[u8], file: &str) -> Result<Program> {
    let mut reader = ByteReader::new(data, Endian::Little);
    let magic = reader.read_u32()?;
    if magic != MAGIC {
        return Err(ConversionError::structural(file, format!("not a Kontakt 1 file (magic {:08X})", magic)));
    }
    let version = reader.read_u32()?;
    log::debug!("Kontakt 1 file version {:04X}", version);
    let size = reader.read_u32()? as usize;
    let compressed = reader.take(size)?;
    let xml = zlib_decompress(compressed)?;
    let text = String::from_utf8_lossy(&xml);
    let root = parse_document_with_root(&text, file, "program")?;

    let mut program = Program {
        name: root.attr("name").unwrap_or_default().to_string(),
        volume: number(&root, "volume"),
        pan: number(&root, "pan"),
        tune: number(&root, "tune"),
        ..Default::default()
    };
    if let Some(groups) = root.child("groups") {
        program.groups = groups.children_named("group").map(read_group).collect();
    }
    if let Some(zones) = root.child("zones") {
        let mut filenames = Vec::new();
        program.zones = zones.children_named("zone").map(|z| read_zone(z, &mut filenames)).collect();
        program.filenames = filenames;
    }
    Ok(program)
}

fn group_element(group: &KontaktGroup) -> Element {
    let mut element = Element::new("group")
        .with_attr("name", &group.name)
        .with_attr("volume", format_number(group.volume.into()))
        .with_attr("pan", format_number(group.pan.into()))
        .with_attr("tune", format_number(group.tune.into()))
        .with_attr("trigger", group.trigger)
        .with_attr("roundRobin", group.round_robin);
    if let Some(envelope) = &group.envelope {
        let stages = [
            ("attack", envelope.attack),
            ("hold", envelope.hold),
            ("decay", envelope.decay),
            ("sustain", envelope.sustain),
            ("release", envelope.release),
        ];
        for (name, value) in stages {
            if let Some(value) = value {
                element.set_attr(name, format_number(value.into()));
            }
        }
    }
    element
}

fn zone_element(zone: &KontaktZone, filenames: &[String]) -> Element {
    let mut element = Element::new("zone")
        .with_attr("group", zone.group_index)
        .with_attr("sampleStart", zone.sample_start)
        .with_attr("sampleEnd", zone.sample_end)
        .with_attr("lowKey", zone.low_key)
        .with_attr("highKey", zone.high_key)
        .with_attr("lowVelocity", zone.low_velocity)
        .with_attr("highVelocity", zone.high_velocity)
        .with_attr("rootKey", zone.root_key)
        .with_attr("fadeLowKey", zone.fade_low_key)
        .with_attr("fadeHighKey", zone.fade_high_key)
        .with_attr("fadeLowVelocity", zone.fade_low_velocity)
        .with_attr("fadeHighVelocity", zone.fade_high_velocity)
        .with_attr("volume", format_number(zone.volume.into()))
        .with_attr("pan", format_number(zone.pan.into()))
        .with_attr("tune", format_number(zone.tune.into()))
        .with_attr("reverse", zone.reverse);
    if let Some(file) = filenames.get(zone.filename_index as usize) {
        element.push(Element::new("sample").with_attr("file", file));
    }
    for l in &zone.loops {
        element.push(
            Element::new("loop")
                .with_attr("mode", l.mode)
                .with_attr("start", l.start)
                .with_attr("length", l.length)
                .with_attr("xfade", l.crossfade),
        );
    }
    element
}

/// Write `program` as Kontakt 1 file.
pub fn write_k1(program: &Program) -> Result<Vec<u8>> {
    let mut groups = Element::new("groups");
    for group in &program.groups {
        groups.push(group_element(group));
    }
    let mut zones = Element::new("zones");
    for zone in &program.zones {
        zones.push(zone_element(zone, &program.filenames));
    }
    let root = Element::new("program")
        .with_attr("name", &program.name)
        .with_attr("volume", format_number(program.volume.into()))
        .with_attr("pan", format_number(program.pan.into()))
        .with_attr("tune", format_number(program.tune.into()))
        .with_child(groups)
        .with_child(zones);
    let compressed = zlib_compress(write_document(&root)?.as_bytes())?;

    let mut writer = ByteWriter::new(Endian::Little);
    writer.write_u32(MAGIC);
    writer.write_u32(VERSION);
    writer.write_u32(compressed.len() as u32);
    writer.write_bytes(&compressed);
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::super::program::tests::program;
    use super::*;

    #[test]
    fn test_k1_write_and_parse() {
        let program = program("Kontakt One");
        let bytes = write_k1(&program).unwrap();
        let parsed = parse_k1(&bytes, "one.nki").unwrap();
        assert_eq!(parsed, program);
    }

    #[test]
    fn test_shared_sample_files() {
        let mut program = program("Shared");
        let second = KontaktZone {
            low_key: 60,
            high_key: 72,
            ..program.zones[0].clone()
        };
        program.zones.push(second);
        let parsed = parse_k1(&write_k1(&program).unwrap(), "shared.nki").unwrap();
        assert_eq!(parsed.filenames, vec!["Samples/C3.wav".to_string()]);
        assert_eq!(parsed.zones[1].filename_index, 0);
    }

    #[test]
    fn test_wrong_magic() {
        let mut bytes = write_k1(&program("X")).unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(parse_k1(&bytes, "x.nki"), Err(ConversionError::Structural { .. })));
    }
}
