//! Kontakt preset chunks.
//!
//! A preset is a tree of chunks framed as
//!
//! ```text
//! u8 id | u32 body size | u16 version | u32 private size | private | u32 public size | public | children
//! ```
//!
//! Only container ids carry children; they fill the rest of the body.

use multiconv_binary::{BinaryError, ByteReader, ByteWriter, Endian, Result};

/// Chunk ids of the preset tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetChunkId {
    Bank,
    Program,
    ProgramContainer,
    SlotList,
    GroupList,
    Group,
    ZoneList,
    Zone,
    LoopArray,
    FilenameList,
    ParameterArray8,
    ParameterArray16,
    ParameterArray32,
    MultiConfiguration,
    Unknown(u8),
}

impl PresetChunkId {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x03 => Self::Bank,
            0x28 => Self::Program,
            0x2C => Self::Zone,
            0x32 => Self::Group,
            0x33 => Self::GroupList,
            0x34 => Self::ZoneList,
            0x36 => Self::SlotList,
            0x37 => Self::ProgramContainer,
            0x39 => Self::LoopArray,
            0x3A => Self::ParameterArray8,
            0x3B => Self::ParameterArray16,
            0x3C => Self::ParameterArray32,
            0x3D => Self::FilenameList,
            0x48 => Self::MultiConfiguration,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Bank => 0x03,
            Self::Program => 0x28,
            Self::Zone => 0x2C,
            Self::Group => 0x32,
            Self::GroupList => 0x33,
            Self::ZoneList => 0x34,
            Self::SlotList => 0x36,
            Self::ProgramContainer => 0x37,
            Self::LoopArray => 0x39,
            Self::ParameterArray8 => 0x3A,
            Self::ParameterArray16 => 0x3B,
            Self::ParameterArray32 => 0x3C,
            Self::FilenameList => 0x3D,
            Self::MultiConfiguration => 0x48,
            Self::Unknown(other) => other,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Bank
                | Self::Program
                | Self::ProgramContainer
                | Self::SlotList
                | Self::GroupList
                | Self::Group
                | Self::ZoneList
                | Self::Zone
        )
    }
}

#[derive(Debug, Clone)]
pub struct PresetChunk {
    pub id: PresetChunkId,
    pub version: u16,
    pub private_data: Vec<u8>,
    pub public_data: Vec<u8>,
    pub children: Vec<PresetChunk>,
    /// Offset of the id byte in the parsed data, 0 for built chunks.
    pub offset: usize,
}

// Equality ignores `offset`.
impl PartialEq for PresetChunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.version == other.version
            && self.private_data == other.private_data
            && self.public_data == other.public_data
            && self.children == other.children
    }
}

impl PresetChunk {
    pub fn new(id: PresetChunkId, public_data: Vec<u8>) -> Self {
        Self {
            id,
            version: 1,
            private_data: Vec::new(),
            public_data,
            children: Vec::new(),
            offset: 0,
        }
    }

    pub fn with_children(mut self, children: Vec<PresetChunk>) -> Self {
        self.children = children;
        self
    }

    /// Reader over the public data.
    pub fn public_reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.public_data, Endian::Little)
    }

    pub fn child(&self, id: PresetChunkId) -> Option<&PresetChunk> {
        self.children.iter().find(|c| c.id == id)
    }

    pub fn children_with(&self, id: PresetChunkId) -> impl Iterator<Item = &PresetChunk> {
        self.children.iter().filter(move |c| c.id == id)
    }

    /// Depth-first search including `self`.
    pub fn find(&self, id: PresetChunkId) -> Option<&PresetChunk> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn read(reader: &mut ByteReader) -> Result<Self> {
        let offset = reader.offset();
        let id = PresetChunkId::from_u8(reader.read_u8()?);
        let size_offset = reader.offset();
        let size = reader.read_u32()? as usize;
        if size > reader.remaining() {
            return Err(BinaryError::parse(
                size_offset,
                format!("preset chunk size of at most {}", reader.remaining()),
                size.to_string(),
            ));
        }
        let base = reader.offset();
        let body = reader.take(size)?;
        let mut body = ByteReader::with_base_offset(body, Endian::Little, base);
        let version = body.read_u16()?;
        let private_size = body.read_u32()? as usize;
        let private_data = body.read_bytes(private_size)?;
        let public_size = body.read_u32()? as usize;
        let public_data = body.read_bytes(public_size)?;

        let mut children = Vec::new();
        if id.is_container() {
            while !body.is_exhausted() {
                children.push(Self::read(&mut body)?);
            }
        } else if !body.is_exhausted() {
            log::debug!("Ignoring {} bytes after chunk {:?}", body.remaining(), id);
        }
        Ok(Self {
            id,
            version,
            private_data,
            public_data,
            children,
            offset,
        })
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.id.as_u8());
        let size_offset = writer.len();
        writer.write_u32(0);
        let body_start = writer.len();
        writer.write_u16(self.version);
        writer.write_u32(self.private_data.len() as u32);
        writer.write_bytes(&self.private_data);
        writer.write_u32(self.public_data.len() as u32);
        writer.write_bytes(&self.public_data);
        for child in &self.children {
            child.write(writer);
        }
        let size = (writer.len() - body_start) as u32;
        // the placeholder was written above
        let _ = writer.patch_u32(size_offset, size);
    }
}

/// Parse all chunks in `data`.
pub fn parse_preset_chunks(data: &[u8]) -> Result<Vec<PresetChunk>> {
    let mut reader = ByteReader::new(data, Endian::Little);
    let mut chunks = Vec::new();
    while !reader.is_exhausted() {
        chunks.push(PresetChunk::read(&mut reader)?);
    }
    Ok(chunks)
}

pub fn write_preset_chunks(chunks: &[PresetChunk]) -> Vec<u8> {
    let mut writer = ByteWriter::new(Endian::Little);
    for chunk in chunks {
        chunk.write(&mut writer);
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_write_and_parse() {
        let mut zone = PresetChunk::new(PresetChunkId::Zone, vec![1, 2, 3])
            .with_children(vec![PresetChunk::new(PresetChunkId::LoopArray, vec![0])]);
        zone.private_data = vec![9, 9];
        let program = PresetChunk::new(PresetChunkId::Program, vec![])
            .with_children(vec![PresetChunk::new(PresetChunkId::ZoneList, vec![]).with_children(vec![zone])]);
        let bytes = write_preset_chunks(&[program.clone()]);
        let parsed = parse_preset_chunks(&bytes).unwrap();
        assert_eq!(parsed, vec![program]);
        assert_eq!(parsed[0].children[0].offset, 15);
        assert_eq!(
            parsed[0].find(PresetChunkId::LoopArray).map(|c| c.public_data.clone()),
            Some(vec![0])
        );
    }

    #[test]
    fn test_leaf_chunks_have_no_children() {
        let leaf = PresetChunk::new(PresetChunkId::FilenameList, vec![7]);
        let mut bytes = write_preset_chunks(&[leaf]);
        // trailing garbage inside the body of a leaf is ignored
        bytes[1] += 2;
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let parsed = parse_preset_chunks(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].children.is_empty());
    }

    #[test]
    fn test_oversized_chunk_fails() {
        let mut bytes = write_preset_chunks(&[PresetChunk::new(PresetChunkId::Bank, vec![])]);
        bytes[1] = 0xF0;
        assert!(matches!(parse_preset_chunks(&bytes), Err(BinaryError::Parse { .. })));
    }

    #[test]
    fn test_id_mapping() {
        for id in [PresetChunkId::SlotList, PresetChunkId::MultiConfiguration, PresetChunkId::Unknown(0x99)] {
            assert_eq!(PresetChunkId::from_u8(id.as_u8()), id);
        }
        assert!(!PresetChunkId::LoopArray.is_container());
    }
}
