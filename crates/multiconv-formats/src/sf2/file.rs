//! The SoundFont 2 RIFF structure.
//!
//! A SoundFont is a `RIFF sfbk` file with three lists:
//!
//! - `INFO`: version, target engine, name and optional descriptive strings
//! - `sdta`: the 16-bit sample pool (`smpl`)
//! - `pdta`: the "hydra", nine arrays of fixed-size records linking presets
//!   to instruments to samples
//!
//! Every hydra array ends with a terminal record. Zones are addressed by bag
//! index ranges: the zones of preset `i` are the bags from `presets[i].bag_index`
//! up to (excluding) `presets[i + 1].bag_index`, the same for instruments and
//! their generator lists.

use multiconv_binary::reader::printable;
use multiconv_binary::riff::{find_chunk, parse_riff, write_riff, ChunkNode, RiffFile};
use multiconv_binary::{ByteReader, ByteWriter, Endian};
use multiconv_model::{ConversionError, Result};

pub const SFBK_FORM: [u8; 4] = *b"sfbk";
pub const INFO_LIST: [u8; 4] = *b"INFO";
pub const SDTA_LIST: [u8; 4] = *b"sdta";
pub const PDTA_LIST: [u8; 4] = *b"pdta";

pub const IFIL: [u8; 4] = *b"ifil";
pub const ISNG: [u8; 4] = *b"isng";
pub const INAM: [u8; 4] = *b"INAM";
pub const ICRD: [u8; 4] = *b"ICRD";
pub const IENG: [u8; 4] = *b"IENG";
pub const ICMT: [u8; 4] = *b"ICMT";
pub const ICOP: [u8; 4] = *b"ICOP";
pub const ISFT: [u8; 4] = *b"ISFT";
pub const SMPL: [u8; 4] = *b"smpl";
pub const PHDR: [u8; 4] = *b"phdr";
pub const PBAG: [u8; 4] = *b"pbag";
pub const PMOD: [u8; 4] = *b"pmod";
pub const PGEN: [u8; 4] = *b"pgen";
pub const INST: [u8; 4] = *b"inst";
pub const IBAG: [u8; 4] = *b"ibag";
pub const IMOD: [u8; 4] = *b"imod";
pub const IGEN: [u8; 4] = *b"igen";
pub const SHDR: [u8; 4] = *b"shdr";

pub const PHDR_SIZE: usize = 38;
pub const PBAG_SIZE: usize = 4;
pub const PMOD_SIZE: usize = 10;
pub const PGEN_SIZE: usize = 4;
pub const INST_SIZE: usize = 22;
pub const IBAG_SIZE: usize = 4;
pub const IMOD_SIZE: usize = 10;
pub const IGEN_SIZE: usize = 4;
pub const SHDR_SIZE: usize = 46;

/// Length of the name fields of presets, instruments and samples.
pub const NAME_LENGTH: usize = 20;

pub const SAMPLE_TYPE_MONO: u16 = 1;
pub const SAMPLE_TYPE_RIGHT: u16 = 2;
pub const SAMPLE_TYPE_LEFT: u16 = 4;
pub const SAMPLE_TYPE_LINKED: u16 = 8;
pub const SAMPLE_TYPE_ROM: u16 = 0x8000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetHeader {
    pub name: String,
    pub preset: u16,
    pub bank: u16,
    pub bag_index: u16,
    pub library: u32,
    pub genre: u32,
    pub morphology: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentHeader {
    pub name: String,
    pub bag_index: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bag {
    pub generator_index: u16,
    pub modulator_index: u16,
}

/// Modulators are kept so that a file can be re-written, they are not mapped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModulatorRecord {
    pub source: u16,
    pub destination: u16,
    pub amount: i16,
    pub amount_source: u16,
    pub transform: u16,
}

/// A generator with its raw amount.
///
/// The amount is a signed word, an unsigned word or a low/high byte range
/// depending on the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorRecord {
    pub operator: u16,
    pub amount: u16,
}

impl GeneratorRecord {
    pub fn signed(operator: u16, amount: i16) -> Self {
        Self {
            operator,
            amount: amount as u16,
        }
    }

    pub fn unsigned(operator: u16, amount: u16) -> Self {
        Self { operator, amount }
    }

    pub fn range(operator: u16, low: u8, high: u8) -> Self {
        Self {
            operator,
            amount: u16::from_le_bytes([low, high]),
        }
    }

    pub fn as_signed(&self) -> i16 {
        self.amount as i16
    }

    pub fn as_range(&self) -> (u8, u8) {
        let [low, high] = self.amount.to_le_bytes();
        (low, high)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleHeader {
    pub name: String,
    pub start: u32,
    /// First frame after the sample.
    pub end: u32,
    pub start_loop: u32,
    /// First frame after the loop.
    pub end_loop: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
    /// Pitch correction in cents.
    pub pitch_correction: i8,
    pub sample_link: u16,
    pub sample_type: u16,
}

impl SampleHeader {
    pub fn is_left(&self) -> bool {
        self.sample_type & SAMPLE_TYPE_LEFT != 0
    }

    pub fn is_right(&self) -> bool {
        self.sample_type & SAMPLE_TYPE_RIGHT != 0
    }

    pub fn is_rom(&self) -> bool {
        self.sample_type & SAMPLE_TYPE_ROM != 0
    }
}

/// The `INFO` list.
#[derive(Debug, Clone, PartialEq)]
pub struct Sf2Info {
    pub version: (u16, u16),
    pub sound_engine: String,
    pub name: String,
    pub creation_date: Option<String>,
    pub engineer: Option<String>,
    pub comment: Option<String>,
    pub copyright: Option<String>,
    pub software: Option<String>,
}

impl Default for Sf2Info {
    fn default() -> Self {
        Self {
            version: (2, 1),
            sound_engine: "EMU8000".to_string(),
            name: String::new(),
            creation_date: None,
            engineer: None,
            comment: None,
            copyright: None,
            software: None,
        }
    }
}

/// A parsed SoundFont including the terminal records of every hydra array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundFont {
    pub info: Sf2Info,
    /// The complete 16-bit sample pool.
    pub sample_pool: Vec<i16>,
    pub presets: Vec<PresetHeader>,
    pub preset_bags: Vec<Bag>,
    pub preset_modulators: Vec<ModulatorRecord>,
    pub preset_generators: Vec<GeneratorRecord>,
    pub instruments: Vec<InstrumentHeader>,
    pub instrument_bags: Vec<Bag>,
    pub instrument_modulators: Vec<ModulatorRecord>,
    pub instrument_generators: Vec<GeneratorRecord>,
    pub samples: Vec<SampleHeader>,
}

fn read_records<T>(
    chunk: &[u8],
    id: &[u8; 4],
    record_size: usize,
    file: &str,
    read: impl Fn(&mut ByteReader) -> multiconv_binary::Result<T>,
) -> Result<Vec<T>> {
    if chunk.len() % record_size != 0 {
        return Err(ConversionError::structural(
            file,
            format!(
                "{} chunk length {} is not a multiple of the record size {}",
                printable(id),
                chunk.len(),
                record_size
            ),
        ));
    }
    let mut reader = ByteReader::new(chunk, Endian::Little);
    let mut records = Vec::with_capacity(chunk.len() / record_size);
    for _ in 0..chunk.len() / record_size {
        records.push(read(&mut reader)?);
    }
    Ok(records)
}

fn mandatory<'a>(nodes: &'a [ChunkNode], id: &[u8; 4], file: &str) -> Result<&'a [u8]> {
    find_chunk(nodes, id)
        .ok_or_else(|| ConversionError::structural(file, format!("missing {} chunk", printable(id))))
}

fn read_bag(reader: &mut ByteReader) -> multiconv_binary::Result<Bag> {
    Ok(Bag {
        generator_index: reader.read_u16()?,
        modulator_index: reader.read_u16()?,
    })
}

fn read_modulator(reader: &mut ByteReader) -> multiconv_binary::Result<ModulatorRecord> {
    Ok(ModulatorRecord {
        source: reader.read_u16()?,
        destination: reader.read_u16()?,
        amount: reader.read_i16()?,
        amount_source: reader.read_u16()?,
        transform: reader.read_u16()?,
    })
}

fn read_generator(reader: &mut ByteReader) -> multiconv_binary::Result<GeneratorRecord> {
    Ok(GeneratorRecord {
        operator: reader.read_u16()?,
        amount: reader.read_u16()?,
    })
}

fn read_preset(reader: &mut ByteReader) -> multiconv_binary::Result<PresetHeader> {
    Ok(PresetHeader {
        name: reader.read_fixed_ascii(NAME_LENGTH)?,
        preset: reader.read_u16()?,
        bank: reader.read_u16()?,
        bag_index: reader.read_u16()?,
        library: reader.read_u32()?,
        genre: reader.read_u32()?,
        morphology: reader.read_u32()?,
    })
}

fn read_instrument(reader: &mut ByteReader) -> multiconv_binary::Result<InstrumentHeader> {
    Ok(InstrumentHeader {
        name: reader.read_fixed_ascii(NAME_LENGTH)?,
        bag_index: reader.read_u16()?,
    })
}

fn read_sample(reader: &mut ByteReader) -> multiconv_binary::Result<SampleHeader> {
    Ok(SampleHeader {
        name: reader.read_fixed_ascii(NAME_LENGTH)?,
        start: reader.read_u32()?,
        end: reader.read_u32()?,
        start_loop: reader.read_u32()?,
        end_loop: reader.read_u32()?,
        sample_rate: reader.read_u32()?,
        original_pitch: reader.read_u8()?,
        pitch_correction: reader.read_i8()?,
        sample_link: reader.read_u16()?,
        sample_type: reader.read_u16()?,
    })
}

fn info_text(nodes: &[ChunkNode], id: &[u8; 4]) -> Option<String> {
    find_chunk(nodes, id)
        .map(multiconv_binary::reader::ascii_field)
        .filter(|text| !text.is_empty())
}

fn parse_info(nodes: &[ChunkNode], file: &str) -> Result<Sf2Info> {
    let version_chunk = mandatory(nodes, &IFIL, file)?;
    let mut reader = ByteReader::new(version_chunk, Endian::Little);
    let version = (reader.read_u16()?, reader.read_u16()?);
    if version.0 != 2 {
        log::warn!("{}: SoundFont version {}.{}, reading as 2.x", file, version.0, version.1);
    }
    Ok(Sf2Info {
        version,
        sound_engine: info_text(nodes, &ISNG).unwrap_or_else(|| "EMU8000".to_string()),
        name: info_text(nodes, &INAM).unwrap_or_default(),
        creation_date: info_text(nodes, &ICRD),
        engineer: info_text(nodes, &IENG),
        comment: info_text(nodes, &ICMT),
        copyright: info_text(nodes, &ICOP),
        software: info_text(nodes, &ISFT),
    })
}

/// Zones of a preset or instrument as generator slices.
///
/// `first..next` is the bag index range. Bags pointing outside the generator
/// list are skipped with a warning.
fn zone_generators<'a>(
    bags: &[Bag],
    generators: &'a [GeneratorRecord],
    first: u16,
    next: u16,
) -> Vec<&'a [GeneratorRecord]> {
    let last_bag = bags.len().saturating_sub(1);
    (first as usize..(next as usize).min(last_bag))
        .filter_map(|b| {
            let start = bags[b].generator_index as usize;
            let end = bags[b + 1].generator_index as usize;
            if start <= end && end <= generators.len() {
                Some(&generators[start..end])
            } else {
                log::warn!("Ignoring zone {} with generator range {}..{}", b, start, end);
                None
            }
        })
        .collect()
}

impl SoundFont {
    /// Parse a complete `.sf2` image. `file` names the source in errors.
    pub fn parse(data: &[u8], file: &str) -> Result<Self> {
        let riff = parse_riff(data, &SFBK_FORM)?;

        let info = riff
            .find_list(&INFO_LIST)
            .ok_or_else(|| ConversionError::structural(file, "missing INFO list"))?;
        let sdta = riff
            .find_list(&SDTA_LIST)
            .ok_or_else(|| ConversionError::structural(file, "missing sdta list"))?;
        let pdta = riff
            .find_list(&PDTA_LIST)
            .ok_or_else(|| ConversionError::structural(file, "missing pdta list"))?;

        let info = parse_info(info, file)?;
        let sample_pool = match find_chunk(sdta, &SMPL) {
            Some(bytes) => bytes
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
            None => {
                log::warn!("{}: no sample data", file);
                Vec::new()
            }
        };

        let sf = SoundFont {
            info,
            sample_pool,
            presets: read_records(mandatory(pdta, &PHDR, file)?, &PHDR, PHDR_SIZE, file, read_preset)?,
            preset_bags: read_records(mandatory(pdta, &PBAG, file)?, &PBAG, PBAG_SIZE, file, read_bag)?,
            preset_modulators: read_records(mandatory(pdta, &PMOD, file)?, &PMOD, PMOD_SIZE, file, read_modulator)?,
            preset_generators: read_records(mandatory(pdta, &PGEN, file)?, &PGEN, PGEN_SIZE, file, read_generator)?,
            instruments: read_records(mandatory(pdta, &INST, file)?, &INST, INST_SIZE, file, read_instrument)?,
            instrument_bags: read_records(mandatory(pdta, &IBAG, file)?, &IBAG, IBAG_SIZE, file, read_bag)?,
            instrument_modulators: read_records(mandatory(pdta, &IMOD, file)?, &IMOD, IMOD_SIZE, file, read_modulator)?,
            instrument_generators: read_records(mandatory(pdta, &IGEN, file)?, &IGEN, IGEN_SIZE, file, read_generator)?,
            samples: read_records(mandatory(pdta, &SHDR, file)?, &SHDR, SHDR_SIZE, file, read_sample)?,
        };

        if sf.presets.is_empty() || sf.instruments.is_empty() || sf.samples.is_empty() {
            return Err(ConversionError::structural(file, "hydra arrays without terminal record"));
        }
        Ok(sf)
    }

    /// Number of presets without the terminal record.
    pub fn preset_count(&self) -> usize {
        self.presets.len().saturating_sub(1)
    }

    /// Number of instruments without the terminal record.
    pub fn instrument_count(&self) -> usize {
        self.instruments.len().saturating_sub(1)
    }

    /// Number of sample headers without the terminal record.
    pub fn sample_count(&self) -> usize {
        self.samples.len().saturating_sub(1)
    }

    pub fn preset_zones(&self, index: usize) -> Vec<&[GeneratorRecord]> {
        match (self.presets.get(index), self.presets.get(index + 1)) {
            (Some(this), Some(next)) => {
                zone_generators(&self.preset_bags, &self.preset_generators, this.bag_index, next.bag_index)
            }
            _ => Vec::new(),
        }
    }

    pub fn instrument_zones(&self, index: usize) -> Vec<&[GeneratorRecord]> {
        match (self.instruments.get(index), self.instruments.get(index + 1)) {
            (Some(this), Some(next)) => zone_generators(
                &self.instrument_bags,
                &self.instrument_generators,
                this.bag_index,
                next.bag_index,
            ),
            _ => Vec::new(),
        }
    }

    /// Frames `start..end` of the sample pool, empty if out of range.
    pub fn sample_frames(&self, start: u32, end: u32) -> &[i16] {
        let start = start as usize;
        let end = (end as usize).min(self.sample_pool.len());
        if start >= end {
            &[]
        } else {
            &self.sample_pool[start..end]
        }
    }

    /// Serialize into a complete `.sf2` image.
    ///
    /// The hydra arrays are written as they are; callers must include the
    /// terminal records.
    pub fn write(&self) -> Vec<u8> {
        let mut info = vec![
            ChunkNode::chunk(&IFIL, {
                let mut w = ByteWriter::new(Endian::Little);
                w.write_u16(self.info.version.0);
                w.write_u16(self.info.version.1);
                w.into_inner()
            }),
            ChunkNode::chunk(&ISNG, info_string(&self.info.sound_engine)),
            ChunkNode::chunk(&INAM, info_string(&self.info.name)),
        ];
        let optional = [
            (&ICRD, &self.info.creation_date),
            (&IENG, &self.info.engineer),
            (&ICMT, &self.info.comment),
            (&ICOP, &self.info.copyright),
            (&ISFT, &self.info.software),
        ];
        for (id, value) in optional {
            if let Some(text) = value {
                info.push(ChunkNode::chunk(id, info_string(text)));
            }
        }

        let mut pool = ByteWriter::new(Endian::Little);
        for &sample in &self.sample_pool {
            pool.write_i16(sample);
        }

        let pdta = vec![
            ChunkNode::chunk(&PHDR, write_records(&self.presets, write_preset)),
            ChunkNode::chunk(&PBAG, write_records(&self.preset_bags, write_bag)),
            ChunkNode::chunk(&PMOD, write_records(&self.preset_modulators, write_modulator)),
            ChunkNode::chunk(&PGEN, write_records(&self.preset_generators, write_generator)),
            ChunkNode::chunk(&INST, write_records(&self.instruments, write_instrument)),
            ChunkNode::chunk(&IBAG, write_records(&self.instrument_bags, write_bag)),
            ChunkNode::chunk(&IMOD, write_records(&self.instrument_modulators, write_modulator)),
            ChunkNode::chunk(&IGEN, write_records(&self.instrument_generators, write_generator)),
            ChunkNode::chunk(&SHDR, write_records(&self.samples, write_sample)),
        ];

        let mut riff = RiffFile::new(&SFBK_FORM);
        riff.chunks = vec![
            ChunkNode::list(&INFO_LIST, info),
            ChunkNode::list(&SDTA_LIST, vec![ChunkNode::chunk(&SMPL, pool.into_inner())]),
            ChunkNode::list(&PDTA_LIST, pdta),
        ];
        write_riff(&riff)
    }
}

/// INFO strings are NUL terminated and padded to an even length.
fn info_string(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'_' }).collect();
    bytes.push(0);
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

fn write_records<T>(records: &[T], write: impl Fn(&mut ByteWriter, &T)) -> Vec<u8> {
    let mut writer = ByteWriter::new(Endian::Little);
    for record in records {
        write(&mut writer, record);
    }
    writer.into_inner()
}

/// Names keep one NUL inside their 20 bytes.
fn write_name(writer: &mut ByteWriter, name: &str) {
    let cut: String = name.chars().take(NAME_LENGTH - 1).collect();
    writer.write_fixed_ascii(&cut, NAME_LENGTH);
}

fn write_preset(writer: &mut ByteWriter, preset: &PresetHeader) {
    write_name(writer, &preset.name);
    writer.write_u16(preset.preset);
    writer.write_u16(preset.bank);
    writer.write_u16(preset.bag_index);
    writer.write_u32(preset.library);
    writer.write_u32(preset.genre);
    writer.write_u32(preset.morphology);
}

fn write_bag(writer: &mut ByteWriter, bag: &Bag) {
    writer.write_u16(bag.generator_index);
    writer.write_u16(bag.modulator_index);
}

fn write_modulator(writer: &mut ByteWriter, modulator: &ModulatorRecord) {
    writer.write_u16(modulator.source);
    writer.write_u16(modulator.destination);
    writer.write_i16(modulator.amount);
    writer.write_u16(modulator.amount_source);
    writer.write_u16(modulator.transform);
}

fn write_generator(writer: &mut ByteWriter, generator: &GeneratorRecord) {
    writer.write_u16(generator.operator);
    writer.write_u16(generator.amount);
}

fn write_instrument(writer: &mut ByteWriter, instrument: &InstrumentHeader) {
    write_name(writer, &instrument.name);
    writer.write_u16(instrument.bag_index);
}

fn write_sample(writer: &mut ByteWriter, sample: &SampleHeader) {
    write_name(writer, &sample.name);
    writer.write_u32(sample.start);
    writer.write_u32(sample.end);
    writer.write_u32(sample.start_loop);
    writer.write_u32(sample.end_loop);
    writer.write_u32(sample.sample_rate);
    writer.write_u8(sample.original_pitch);
    writer.write_i8(sample.pitch_correction);
    writer.write_u16(sample.sample_link);
    writer.write_u16(sample.sample_type);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sf2::generators::{INSTRUMENT, KEY_RANGE, SAMPLE_ID};

    /// One preset, one instrument with one zone, one sample of 8 frames.
    pub(crate) fn minimal() -> SoundFont {
        SoundFont {
            info: Sf2Info {
                name: "Test".to_string(),
                ..Default::default()
            },
            sample_pool: (0..8).chain(std::iter::repeat(0).take(46)).collect(),
            presets: vec![
                PresetHeader {
                    name: "Lead".to_string(),
                    ..Default::default()
                },
                PresetHeader {
                    name: "EOP".to_string(),
                    bag_index: 1,
                    ..Default::default()
                },
            ],
            preset_bags: vec![
                Bag::default(),
                Bag {
                    generator_index: 1,
                    modulator_index: 0,
                },
            ],
            preset_modulators: vec![ModulatorRecord::default()],
            preset_generators: vec![GeneratorRecord::unsigned(INSTRUMENT, 0), GeneratorRecord::default()],
            instruments: vec![
                InstrumentHeader {
                    name: "Lead".to_string(),
                    bag_index: 0,
                },
                InstrumentHeader {
                    name: "EOI".to_string(),
                    bag_index: 1,
                },
            ],
            instrument_bags: vec![
                Bag::default(),
                Bag {
                    generator_index: 2,
                    modulator_index: 0,
                },
            ],
            instrument_modulators: vec![ModulatorRecord::default()],
            instrument_generators: vec![
                GeneratorRecord::range(KEY_RANGE, 40, 60),
                GeneratorRecord::unsigned(SAMPLE_ID, 0),
                GeneratorRecord::default(),
            ],
            samples: vec![
                SampleHeader {
                    name: "Saw".to_string(),
                    start: 0,
                    end: 8,
                    start_loop: 2,
                    end_loop: 6,
                    sample_rate: 44100,
                    original_pitch: 60,
                    sample_type: SAMPLE_TYPE_MONO,
                    ..Default::default()
                },
                SampleHeader {
                    name: "EOS".to_string(),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_write_and_parse() {
        let sf = minimal();
        let parsed = SoundFont::parse(&sf.write(), "test.sf2").unwrap();
        assert_eq!(parsed, sf);
        assert_eq!(parsed.preset_count(), 1);
        assert_eq!(parsed.preset_zones(0).len(), 1);
        assert_eq!(parsed.instrument_zones(0)[0][0].as_range(), (40, 60));
        assert_eq!(parsed.sample_frames(2, 6), &[2, 3, 4, 5]);
    }

    #[test]
    fn test_record_size_mismatch_is_structural() {
        let riff = parse_riff(&minimal().write(), &SFBK_FORM).unwrap();
        let mut chunks = riff.chunks;
        if let ChunkNode::List { children, .. } = &mut chunks[2] {
            for child in children.iter_mut() {
                if let ChunkNode::Chunk { id, data } = child {
                    if id == &PGEN {
                        *data = vec![0; 6];
                    }
                }
            }
        }
        let mut broken = RiffFile::new(&SFBK_FORM);
        broken.chunks = chunks;
        let err = SoundFont::parse(&write_riff(&broken), "broken.sf2").unwrap_err();
        match err {
            ConversionError::Structural { file, message } => {
                assert_eq!(file, "broken.sf2");
                assert!(message.contains("pgen"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_hydra_chunk() {
        let mut riff = RiffFile::new(&SFBK_FORM);
        riff.chunks = vec![
            ChunkNode::list(&INFO_LIST, vec![ChunkNode::chunk(&IFIL, vec![2, 0, 1, 0])]),
            ChunkNode::list(&SDTA_LIST, vec![]),
            ChunkNode::list(&PDTA_LIST, vec![ChunkNode::chunk(&PHDR, vec![0; PHDR_SIZE])]),
        ];
        let err = SoundFont::parse(&write_riff(&riff), "x.sf2").unwrap_err();
        assert!(err.to_string().contains("pbag"));
    }

    #[test]
    fn test_long_names_keep_terminator() {
        let mut writer = ByteWriter::new(Endian::Little);
        write_name(&mut writer, "A very long instrument name");
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), NAME_LENGTH);
        assert_eq!(bytes[NAME_LENGTH - 1], 0);
    }
}
