//! Typed views of the preset chunks Kontakt programs and banks are made of.
//!
//! All public data is little-endian. Volumes are in dB, pans in -1..1 and
//! tunes in semitones.

use multiconv_binary::{BinaryError, ByteWriter, Endian, Result};

use super::preset::{PresetChunk, PresetChunkId};

pub const TRIGGER_ATTACK: u8 = 0;
pub const TRIGGER_RELEASE: u8 = 1;
pub const TRIGGER_FIRST: u8 = 2;
pub const TRIGGER_LEGATO: u8 = 3;

pub const LOOP_OFF: u8 = 0;
pub const LOOP_FORWARD: u8 = 1;
pub const LOOP_ALTERNATING: u8 = 2;
pub const LOOP_BACKWARD: u8 = 3;

/// Number of program slots of a bank.
pub const SLOT_COUNT: usize = 64;

/// MIDI channel value that means "all channels".
pub const OMNI: u8 = 16;

fn missing(what: &str, parent: &PresetChunk) -> BinaryError {
    BinaryError::parse(parent.offset, format!("{:?} chunk with a {}", parent.id, what), "none")
}

fn expect_id(chunk: &PresetChunk, id: PresetChunkId) -> Result<()> {
    if chunk.id == id {
        Ok(())
    } else {
        Err(BinaryError::parse(chunk.offset, format!("{:?} chunk", id), format!("{:?}", chunk.id)))
    }
}

fn public_writer() -> ByteWriter {
    ByteWriter::new(Endian::Little)
}

/// Amplitude envelope stored in a parameter array. Times in seconds,
/// sustain as 0..1; negative values mean "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KontaktEnvelope {
    pub attack: Option<f32>,
    pub hold: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

impl KontaktEnvelope {
    fn stages(&self) -> [Option<f32>; 5] {
        [self.attack, self.hold, self.decay, self.sustain, self.release]
    }

    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::ParameterArray8)?;
        let mut reader = chunk.public_reader();
        let count = reader.read_u8()? as usize;
        let mut values = [None; 5];
        for index in 0..count {
            let value = reader.read_f32()?;
            if index < values.len() && value >= 0.0 {
                values[index] = Some(value);
            }
        }
        let [attack, hold, decay, sustain, release] = values;
        Ok(Self {
            attack,
            hold,
            decay,
            sustain,
            release,
        })
    }

    pub fn to_chunk(&self) -> PresetChunk {
        let stages = self.stages();
        let mut writer = public_writer();
        writer.write_u8(stages.len() as u8);
        for stage in stages {
            writer.write_f32(stage.unwrap_or(-1.0));
        }
        PresetChunk::new(PresetChunkId::ParameterArray8, writer.into_inner())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KontaktGroup {
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    pub tune: f32,
    pub trigger: u8,
    pub round_robin: bool,
    pub envelope: Option<KontaktEnvelope>,
}

impl KontaktGroup {
    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::Group)?;
        let mut reader = chunk.public_reader();
        let name = reader.read_utf16()?;
        let volume = reader.read_f32()?;
        let pan = reader.read_f32()?;
        let tune = reader.read_f32()?;
        let trigger = reader.read_u8()?;
        let round_robin = reader.read_u8()? != 0;
        let envelope = chunk
            .child(PresetChunkId::ParameterArray8)
            .map(KontaktEnvelope::from_chunk)
            .transpose()?;
        Ok(Self {
            name,
            volume,
            pan,
            tune,
            trigger,
            round_robin,
            envelope,
        })
    }

    pub fn to_chunk(&self) -> PresetChunk {
        let mut writer = public_writer();
        writer.write_utf16(&self.name);
        writer.write_f32(self.volume);
        writer.write_f32(self.pan);
        writer.write_f32(self.tune);
        writer.write_u8(self.trigger);
        writer.write_u8(u8::from(self.round_robin));
        let children = self.envelope.iter().map(KontaktEnvelope::to_chunk).collect();
        PresetChunk::new(PresetChunkId::Group, writer.into_inner()).with_children(children)
    }
}

/// A loop, `length` frames long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KontaktLoop {
    pub mode: u8,
    pub start: u32,
    pub length: u32,
    pub crossfade: u32,
}

fn read_loops(chunk: &PresetChunk) -> Result<Vec<KontaktLoop>> {
    expect_id(chunk, PresetChunkId::LoopArray)?;
    let mut reader = chunk.public_reader();
    let count = reader.read_u8()?;
    let mut loops = Vec::with_capacity(count as usize);
    for _ in 0..count {
        loops.push(KontaktLoop {
            mode: reader.read_u8()?,
            start: reader.read_u32()?,
            length: reader.read_u32()?,
            crossfade: reader.read_u32()?,
        });
    }
    Ok(loops)
}

fn loops_chunk(loops: &[KontaktLoop]) -> PresetChunk {
    let mut writer = public_writer();
    writer.write_u8(loops.len() as u8);
    for l in loops {
        writer.write_u8(l.mode);
        writer.write_u32(l.start);
        writer.write_u32(l.length);
        writer.write_u32(l.crossfade);
    }
    PresetChunk::new(PresetChunkId::LoopArray, writer.into_inner())
}

/// A zone. `sample_end` of 0 plays to the end of the sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KontaktZone {
    pub group_index: u32,
    pub filename_index: u32,
    pub sample_start: u32,
    pub sample_end: u32,
    pub low_key: u8,
    pub high_key: u8,
    pub low_velocity: u8,
    pub high_velocity: u8,
    pub root_key: u8,
    pub fade_low_key: u8,
    pub fade_high_key: u8,
    pub fade_low_velocity: u8,
    pub fade_high_velocity: u8,
    pub volume: f32,
    pub pan: f32,
    pub tune: f32,
    pub reverse: bool,
    pub loops: Vec<KontaktLoop>,
}

impl KontaktZone {
    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::Zone)?;
        let mut reader = chunk.public_reader();
        let mut zone = Self {
            group_index: reader.read_u32()?,
            filename_index: reader.read_u32()?,
            sample_start: reader.read_u32()?,
            sample_end: reader.read_u32()?,
            low_key: reader.read_u8()?,
            high_key: reader.read_u8()?,
            low_velocity: reader.read_u8()?,
            high_velocity: reader.read_u8()?,
            root_key: reader.read_u8()?,
            fade_low_key: reader.read_u8()?,
            fade_high_key: reader.read_u8()?,
            fade_low_velocity: reader.read_u8()?,
            fade_high_velocity: reader.read_u8()?,
            volume: reader.read_f32()?,
            pan: reader.read_f32()?,
            tune: reader.read_f32()?,
            reverse: reader.read_u8()? != 0,
            loops: Vec::new(),
        };
        if let Some(loops) = chunk.child(PresetChunkId::LoopArray) {
            zone.loops = read_loops(loops)?;
        }
        Ok(zone)
    }

    pub fn to_chunk(&self) -> PresetChunk {
        let mut writer = public_writer();
        writer.write_u32(self.group_index);
        writer.write_u32(self.filename_index);
        writer.write_u32(self.sample_start);
        writer.write_u32(self.sample_end);
        for value in [
            self.low_key,
            self.high_key,
            self.low_velocity,
            self.high_velocity,
            self.root_key,
            self.fade_low_key,
            self.fade_high_key,
            self.fade_low_velocity,
            self.fade_high_velocity,
        ] {
            writer.write_u8(value);
        }
        writer.write_f32(self.volume);
        writer.write_f32(self.pan);
        writer.write_f32(self.tune);
        writer.write_u8(u8::from(self.reverse));
        let mut chunk = PresetChunk::new(PresetChunkId::Zone, writer.into_inner());
        if !self.loops.is_empty() {
            chunk.children.push(loops_chunk(&self.loops));
        }
        chunk
    }
}

fn read_filenames(chunk: &PresetChunk) -> Result<Vec<String>> {
    let mut reader = chunk.public_reader();
    let count = reader.read_u32()?;
    (0..count).map(|_| reader.read_utf16()).collect()
}

fn filenames_chunk(filenames: &[String]) -> PresetChunk {
    let mut writer = public_writer();
    writer.write_u32(filenames.len() as u32);
    for name in filenames {
        writer.write_utf16(name);
    }
    PresetChunk::new(PresetChunkId::FilenameList, writer.into_inner())
}

/// One instrument: groups, zones and the sample files they reference.
///
/// File names are relative to the preset and use `/` as separator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    pub tune: f32,
    pub groups: Vec<KontaktGroup>,
    pub zones: Vec<KontaktZone>,
    pub filenames: Vec<String>,
}

impl Program {
    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::Program)?;
        let mut reader = chunk.public_reader();
        let name = reader.read_utf16()?;
        let volume = reader.read_f32()?;
        let pan = reader.read_f32()?;
        let tune = reader.read_f32()?;

        let groups = chunk
            .child(PresetChunkId::GroupList)
            .ok_or_else(|| missing("group list", chunk))?
            .children_with(PresetChunkId::Group)
            .map(KontaktGroup::from_chunk)
            .collect::<Result<Vec<_>>>()?;
        let zones = chunk
            .child(PresetChunkId::ZoneList)
            .ok_or_else(|| missing("zone list", chunk))?
            .children_with(PresetChunkId::Zone)
            .map(KontaktZone::from_chunk)
            .collect::<Result<Vec<_>>>()?;
        let filenames = match chunk.child(PresetChunkId::FilenameList) {
            Some(list) => read_filenames(list)?,
            None => Vec::new(),
        };
        Ok(Self {
            name,
            volume,
            pan,
            tune,
            groups,
            zones,
            filenames,
        })
    }

    pub fn to_chunk(&self) -> PresetChunk {
        let mut writer = public_writer();
        writer.write_utf16(&self.name);
        writer.write_f32(self.volume);
        writer.write_f32(self.pan);
        writer.write_f32(self.tune);
        let groups = PresetChunk::new(PresetChunkId::GroupList, Vec::new())
            .with_children(self.groups.iter().map(KontaktGroup::to_chunk).collect());
        let zones = PresetChunk::new(PresetChunkId::ZoneList, Vec::new())
            .with_children(self.zones.iter().map(KontaktZone::to_chunk).collect());
        PresetChunk::new(PresetChunkId::Program, writer.into_inner()).with_children(vec![
            groups,
            zones,
            filenames_chunk(&self.filenames),
        ])
    }
}

/// A program together with the bank slot it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct SlottedProgram {
    pub slot_index: usize,
    pub program: Program,
}

/// The programs of a bank. Slots are not contiguous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotList {
    pub programs: Vec<SlottedProgram>,
}

impl SlotList {
    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::SlotList)?;
        let bits = chunk.public_reader().read_u64()?;
        let slots: Vec<usize> = (0..SLOT_COUNT).filter(|bit| bits & (1u64 << bit) != 0).collect();
        let containers: Vec<&PresetChunk> = chunk.children_with(PresetChunkId::ProgramContainer).collect();
        if containers.len() != slots.len() {
            return Err(BinaryError::parse(
                chunk.offset,
                format!("{} programs for the marked slots", slots.len()),
                containers.len().to_string(),
            ));
        }

        let mut programs = Vec::with_capacity(slots.len());
        for (slot_index, container) in slots.into_iter().zip(containers) {
            let program = container
                .child(PresetChunkId::Program)
                .ok_or_else(|| missing("program", container))?;
            programs.push(SlottedProgram {
                slot_index,
                program: Program::from_chunk(program)?,
            });
        }
        Ok(Self { programs })
    }

    /// Programs are written in slot order; slots beyond the bank are dropped.
    pub fn to_chunk(&self) -> PresetChunk {
        let mut slotted: Vec<&SlottedProgram> = self.programs.iter().filter(|p| p.slot_index < SLOT_COUNT).collect();
        slotted.sort_by_key(|p| p.slot_index);
        slotted.dedup_by_key(|p| p.slot_index);
        let bits = slotted.iter().fold(0u64, |bits, p| bits | (1u64 << p.slot_index));

        let mut writer = public_writer();
        writer.write_u64(bits);
        let children = slotted
            .iter()
            .map(|p| {
                PresetChunk::new(PresetChunkId::ProgramContainer, Vec::new()).with_children(vec![p.program.to_chunk()])
            })
            .collect();
        PresetChunk::new(PresetChunkId::SlotList, writer.into_inner()).with_children(children)
    }
}

/// MIDI channel assignment per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiConfiguration {
    /// `(slot, channel)` pairs; channel [`OMNI`] listens to all channels.
    pub assignments: Vec<(u8, u8)>,
}

impl MultiConfiguration {
    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::MultiConfiguration)?;
        let mut reader = chunk.public_reader();
        let count = reader.read_u16()?;
        let assignments = (0..count)
            .map(|_| Ok((reader.read_u8()?, reader.read_u8()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { assignments })
    }

    pub fn to_chunk(&self) -> PresetChunk {
        let mut writer = public_writer();
        writer.write_u16(self.assignments.len() as u16);
        for (slot, channel) in &self.assignments {
            writer.write_u8(*slot);
            writer.write_u8(*channel);
        }
        PresetChunk::new(PresetChunkId::MultiConfiguration, writer.into_inner())
    }

    /// The zero based MIDI channel of `slot`; `None` for omni or unassigned.
    pub fn channel(&self, slot: usize) -> Option<u8> {
        self.assignments
            .iter()
            .find(|(s, _)| *s as usize == slot)
            .map(|(_, channel)| *channel)
            .filter(|channel| *channel < OMNI)
    }
}

/// The root of an NKM multi.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bank {
    pub name: String,
    pub slots: SlotList,
    pub multi: MultiConfiguration,
}

impl Bank {
    pub fn from_chunk(chunk: &PresetChunk) -> Result<Self> {
        expect_id(chunk, PresetChunkId::Bank)?;
        let name = chunk.public_reader().read_utf16()?;
        let slots = SlotList::from_chunk(
            chunk
                .child(PresetChunkId::SlotList)
                .ok_or_else(|| missing("slot list", chunk))?,
        )?;
        let multi = match chunk.child(PresetChunkId::MultiConfiguration) {
            Some(config) => MultiConfiguration::from_chunk(config)?,
            None => MultiConfiguration::default(),
        };
        Ok(Self { name, slots, multi })
    }

    pub fn to_chunk(&self) -> PresetChunk {
        let mut writer = public_writer();
        writer.write_utf16(&self.name);
        PresetChunk::new(PresetChunkId::Bank, writer.into_inner())
            .with_children(vec![self.slots.to_chunk(), self.multi.to_chunk()])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::kontakt::preset::{parse_preset_chunks, write_preset_chunks};

    pub(crate) fn program(name: &str) -> Program {
        Program {
            name: name.to_string(),
            volume: -6.0,
            pan: 0.0,
            tune: 0.0,
            groups: vec![KontaktGroup {
                name: "Sustain".to_string(),
                round_robin: true,
                envelope: Some(KontaktEnvelope {
                    attack: Some(0.01),
                    release: Some(0.5),
                    sustain: Some(1.0),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            zones: vec![KontaktZone {
                low_key: 36,
                high_key: 59,
                low_velocity: 1,
                high_velocity: 127,
                root_key: 48,
                fade_high_key: 4,
                volume: -3.0,
                pan: 0.25,
                tune: 0.5,
                loops: vec![KontaktLoop {
                    mode: LOOP_FORWARD,
                    start: 100,
                    length: 50,
                    crossfade: 10,
                }],
                ..Default::default()
            }],
            filenames: vec!["Samples/C3.wav".to_string()],
        }
    }

    #[test]
    fn test_program_chunk_tree() {
        let program = program("Keys");
        let chunk = program.to_chunk();
        assert!(chunk.find(PresetChunkId::LoopArray).is_some());
        assert_eq!(Program::from_chunk(&chunk).unwrap(), program);
    }

    #[test]
    fn test_slot_indices_follow_the_bitset() {
        let slots = SlotList {
            programs: [0, 5, 9]
                .into_iter()
                .map(|slot_index| SlottedProgram {
                    slot_index,
                    program: program(&format!("Slot {}", slot_index)),
                })
                .collect(),
        };
        let chunk = slots.to_chunk();
        assert_eq!(chunk.public_data, (1u64 | 1 << 5 | 1 << 9).to_le_bytes().to_vec());

        let parsed = SlotList::from_chunk(&chunk).unwrap();
        let indices: Vec<usize> = parsed.programs.iter().map(|p| p.slot_index).collect();
        assert_eq!(indices, vec![0, 5, 9]);
        assert_eq!(parsed.programs[2].program.name, "Slot 9");
    }

    #[test]
    fn test_slot_count_mismatch() {
        let mut chunk = SlotList {
            programs: vec![SlottedProgram {
                slot_index: 3,
                program: program("A"),
            }],
        }
        .to_chunk();
        chunk.public_data = 0b11u64.to_le_bytes().to_vec();
        assert!(matches!(SlotList::from_chunk(&chunk), Err(BinaryError::Parse { .. })));
    }

    #[test]
    fn test_multi_configuration_channels() {
        let multi = MultiConfiguration {
            assignments: vec![(0, 0), (5, OMNI), (9, 3)],
        };
        let parsed = MultiConfiguration::from_chunk(&multi.to_chunk()).unwrap();
        assert_eq!(parsed.channel(0), Some(0));
        assert_eq!(parsed.channel(5), None);
        assert_eq!(parsed.channel(9), Some(3));
        assert_eq!(parsed.channel(1), None);
    }

    #[test]
    fn test_program_without_zone_list() {
        let mut chunk = program("Broken").to_chunk();
        chunk.children.retain(|c| c.id != PresetChunkId::ZoneList);
        let leading = PresetChunk::new(PresetChunkId::FilenameList, vec![]);
        let parsed = parse_preset_chunks(&write_preset_chunks(&[leading, chunk])).unwrap();
        let err = Program::from_chunk(&parsed[1]).unwrap_err();
        assert!(matches!(err, BinaryError::Parse { offset: 15, .. }), "{}", err);
    }

    #[test]
    fn test_wrong_chunk_id_is_parse_error() {
        let chunk = PresetChunk::new(PresetChunkId::ZoneList, vec![]);
        assert!(matches!(Program::from_chunk(&chunk), Err(BinaryError::Parse { offset: 0, .. })));
    }
}
